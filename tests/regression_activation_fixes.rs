use std::cell::RefCell;
use std::rc::Rc;

use headless_page::{
    Document, Error, EventState, ListenerFn, ListenerOutcome, NodeId, Result, Session,
};

fn page_with_body() -> (Session, NodeId) {
    let mut document = Document::new();
    let body = document.ensure_body();
    let session = Session::with_page("https://app.local/start", document);
    (session, body)
}

fn event_log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &str) -> ListenerFn {
    let log = Rc::clone(log);
    let tag = tag.to_string();
    Rc::new(move |_: &mut Session, event: &mut EventState| {
        log.borrow_mut().push(format!("{tag}:{}", event.event_type()));
        ListenerOutcome::Continue
    })
}

#[test]
fn a_listener_removing_itself_mid_dispatch_still_runs_the_rest_of_the_node() -> Result<()> {
    let (mut session, body) = page_with_body();
    let div = session.document_mut().create_element(body, "div", &[]);
    let log = event_log();

    // The callback needs a handle to itself to unregister.
    let slot: Rc<RefCell<Option<ListenerFn>>> = Rc::new(RefCell::new(None));
    let one_shot: ListenerFn = {
        let log = Rc::clone(&log);
        let slot = Rc::clone(&slot);
        Rc::new(move |session: &mut Session, event: &mut EventState| {
            log.borrow_mut().push("one-shot".to_string());
            if let Some(me) = slot.borrow().clone() {
                session.remove_listener(event.current_target(), "click", false, &me);
            }
            ListenerOutcome::Continue
        })
    };
    *slot.borrow_mut() = Some(Rc::clone(&one_shot));
    session.add_listener(div, "click", false, one_shot);
    session.add_listener(div, "click", false, recorder(&log, "second"));

    session.click(div)?;
    assert_eq!(*log.borrow(), ["one-shot", "second:click"]);

    session.click(div)?;
    assert_eq!(*log.borrow(), ["one-shot", "second:click", "second:click"]);
    Ok(())
}

#[test]
fn a_click_listener_clicking_another_control_nests_the_full_sequence() -> Result<()> {
    let (mut session, body) = page_with_body();
    let doc = session.document_mut();
    let button = doc.create_element(body, "button", &[("type", "button")]);
    let flag = doc.create_element(body, "input", &[("type", "checkbox"), ("id", "flag")]);

    let log = event_log();
    session.add_listener(flag, "change", false, recorder(&log, "flag"));
    let chained: ListenerFn = {
        let log = Rc::clone(&log);
        Rc::new(move |session: &mut Session, _: &mut EventState| {
            log.borrow_mut().push("button:click".to_string());
            let flag = session.document().element_by_id("flag").expect("flag exists");
            session.click(flag).expect("nested click");
            ListenerOutcome::Continue
        })
    };
    session.add_listener(button, "click", false, chained);

    session.click(button)?;
    assert_eq!(*log.borrow(), ["button:click", "flag:change"]);
    session.assert_checked(flag, true)?;
    Ok(())
}

#[test]
fn stopping_propagation_does_not_cancel_the_default_action() -> Result<()> {
    let (mut session, body) = page_with_body();
    let flag = session
        .document_mut()
        .create_element(body, "input", &[("type", "checkbox")]);

    let log = event_log();
    session.add_listener(flag, "click", false, recorder(&log, "flag"));
    let blocker: ListenerFn = Rc::new(|_: &mut Session, event: &mut EventState| {
        event.stop_propagation();
        ListenerOutcome::Continue
    });
    session.add_listener(body, "click", true, blocker);

    session.click(flag)?;
    // The target listener never saw the event, yet the checkbox still toggled.
    assert!(log.borrow().is_empty());
    session.assert_checked(flag, true)?;
    Ok(())
}

#[test]
fn focus_settles_before_mouseup_and_click() -> Result<()> {
    let (mut session, body) = page_with_body();
    let field = session
        .document_mut()
        .create_element(body, "input", &[("type", "text")]);

    let log = event_log();
    for event_type in ["mousedown", "focusin", "focus", "mouseup", "click"] {
        session.add_listener(field, event_type, false, recorder(&log, "field"));
    }

    session.click(field)?;
    assert_eq!(
        *log.borrow(),
        [
            "field:mousedown",
            "field:focusin",
            "field:focus",
            "field:mouseup",
            "field:click",
        ]
    );
    Ok(())
}

#[test]
fn a_label_click_drives_the_form_through_its_button() -> Result<()> {
    let (mut session, body) = page_with_body();
    let doc = session.document_mut();
    let form = doc.create_element(body, "form", &[("action", "/save"), ("method", "post")]);
    doc.create_element(
        form,
        "input",
        &[("type", "text"), ("name", "user"), ("value", "ada")],
    );
    doc.create_element(form, "button", &[("id", "go"), ("name", "go"), ("value", "now")]);
    let label = doc.create_element(body, "label", &[("for", "go")]);
    doc.create_text(label, "Save");

    session.click(label)?;

    let requests = session.take_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://app.local/save");
    assert_eq!(requests[0].body_text(), Some("user=ada&go=now"));
    Ok(())
}

#[test]
fn a_failed_transport_leaves_the_page_in_place() -> Result<()> {
    let (mut session, body) = page_with_body();
    let doc = session.document_mut();
    doc.create_text(body, "still here");
    let anchor = doc.create_element(body, "a", &[("href", "/next")]);
    doc.create_text(anchor, "go");
    session.set_transport_failure("https://app.local/next", "boom");

    match session.click(anchor) {
        Err(Error::Transport(message)) => assert_eq!(message, "boom"),
        other => panic!("expected a transport error, got {other:?}"),
    }

    assert_eq!(session.take_requests().len(), 1);
    session.assert_url("https://app.local/start")?;
    assert_eq!(session.body_text(), "still herego");
    Ok(())
}

#[test]
fn manual_dispatch_runs_listeners_without_native_behavior() -> Result<()> {
    let (mut session, body) = page_with_body();
    let doc = session.document_mut();
    let form = doc.create_element(body, "form", &[("action", "/save")]);
    let flag = doc.create_element(form, "input", &[("type", "checkbox")]);

    let log = event_log();
    session.add_listener(form, "submit", false, recorder(&log, "form"));
    session.add_listener(flag, "click", false, recorder(&log, "flag"));

    let submit_event = session.dispatch(form, "submit");
    assert!(!submit_event.is_trusted());
    let click_event = session.dispatch(flag, "click");
    assert!(!click_event.is_trusted());

    assert_eq!(*log.borrow(), ["form:submit", "flag:click"]);
    assert!(session.take_requests().is_empty());
    session.assert_checked(flag, false)?;
    session.assert_url("https://app.local/start")?;
    Ok(())
}

#[test]
fn a_prevented_click_does_not_poison_the_next_one() -> Result<()> {
    let (mut session, body) = page_with_body();
    let flag = session
        .document_mut()
        .create_element(body, "input", &[("type", "checkbox")]);

    let veto: ListenerFn = Rc::new(|_: &mut Session, event: &mut EventState| {
        event.prevent_default();
        ListenerOutcome::Continue
    });
    session.add_listener(flag, "click", false, Rc::clone(&veto));

    session.click(flag)?;
    session.assert_checked(flag, false)?;

    session.remove_listener(flag, "click", false, &veto);
    session.click(flag)?;
    session.assert_checked(flag, true)?;
    Ok(())
}

#[test]
fn a_submit_listener_submitting_another_form_cancels_the_outer_send() -> Result<()> {
    let (mut session, body) = page_with_body();
    let doc = session.document_mut();
    let outer = doc.create_element(body, "form", &[("action", "/outer")]);
    let inner = doc.create_element(body, "form", &[("action", "/inner")]);

    let hijack: ListenerFn = Rc::new(move |session: &mut Session, _: &mut EventState| {
        session.submit(inner).expect("nested submit");
        ListenerOutcome::Continue
    });
    session.add_listener(outer, "submit", false, hijack);

    session.submit(outer)?;

    let requests = session.take_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://app.local/inner");
    session.assert_url("https://app.local/inner")?;
    Ok(())
}
