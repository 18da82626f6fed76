use std::cell::RefCell;
use std::rc::Rc;

use crate::{
    ContextId, Document, Error, EventState, ListenerFn, ListenerOutcome, Method, NodeId,
    RequestBody, Result, SelectedFile, Session,
};

use super::{cancelling_listener, event_log, recording_listener};

fn form_page(method: &str, action: &str) -> (Session, NodeId, NodeId) {
    let mut document = Document::new();
    let body = document.ensure_body();
    let form = document.create_element(body, "form", &[("action", action), ("method", method)]);
    let session = Session::with_page("https://app.local/start", document);
    (session, body, form)
}

fn urlencoded_body(request: &crate::WebRequest) -> String {
    match &request.body {
        RequestBody::UrlEncoded(text) => text.clone(),
        other => panic!("expected urlencoded body, got {other:?}"),
    }
}

#[test]
fn a_cancelled_submit_event_sends_nothing() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "ada")]);
    let button = doc.create_element(form, "input", &[("type", "submit")]);

    session.add_listener(form, "submit", false, cancelling_listener());

    session.click(button)?;
    assert!(session.take_requests().is_empty());
    session.assert_url("https://app.local/start")?;

    session.submit(form)?;
    assert!(session.take_requests().is_empty());
    session.assert_url("https://app.local/start")?;
    Ok(())
}

#[test]
fn a_button_with_no_type_submits_the_form() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/go");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "ada")]);
    let button = doc.create_element(form, "button", &[]);
    doc.create_text(button, "Go");

    session.click(button)?;
    let requests = session.take_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(requests[0].url, "https://app.local/go?user=ada");
    Ok(())
}

#[test]
fn invalid_controls_block_submission_and_take_focus() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    let doc = session.document_mut();
    let code = doc.create_element(
        form,
        "input",
        &[("type", "text"), ("name", "code"), ("pattern", "[0-9a-zA-Z]{10,40}"), ("value", "0987654321!")],
    );
    let button = doc.create_element(form, "input", &[("type", "submit")]);

    let events = event_log();
    session.add_listener(code, "invalid", false, recording_listener(&events, "code"));

    session.click(button)?;
    assert_eq!(*events.borrow(), ["code:invalid"]);
    assert_eq!(session.document().active_element, Some(code));
    assert!(session.take_requests().is_empty());
    session.assert_url("https://app.local/start")?;
    Ok(())
}

#[test]
fn novalidate_skips_the_validity_gate() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/go");
    let doc = session.document_mut();
    doc.set_attr(form, "novalidate", "");
    doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("required", "")]);

    session.submit(form)?;
    let requests = session.take_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://app.local/go?user=");
    Ok(())
}

#[test]
fn formnovalidate_on_the_submitter_skips_the_validity_gate() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/go");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("required", "")]);
    let bypass = doc.create_element(
        form,
        "input",
        &[("type", "submit"), ("formnovalidate", "")],
    );

    session.click(bypass)?;
    assert_eq!(session.take_requests().len(), 1);
    Ok(())
}

#[test]
fn submitter_attributes_override_the_form() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/a");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "ada")]);
    let button = doc.create_element(
        form,
        "button",
        &[("type", "submit"), ("formaction", "/b"), ("formmethod", "post"), ("formenctype", "multipart/form-data")],
    );

    session.click(button)?;
    let requests = session.take_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].url, "https://app.local/b");
    let content_type = requests[0].header("content-type").unwrap_or_default();
    assert!(content_type.starts_with("multipart/form-data; boundary=----HeadlessPageBoundary"));
    assert!(matches!(requests[0].body, RequestBody::Multipart { .. }));
    Ok(())
}

#[test]
fn formtarget_steers_the_response_into_another_context() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/result");
    let button = session.document_mut().create_element(
        form,
        "input",
        &[("type", "submit"), ("formtarget", "_blank")],
    );

    let origin = session.current_context();
    let landed = session.click(button)?;
    assert_ne!(landed, origin);
    assert_eq!(session.current_context(), landed);
    assert_eq!(session.page_url(), "https://app.local/result");
    assert_eq!(session.context_url(origin), "https://app.local/start");
    Ok(())
}

#[test]
fn a_window_opened_by_a_click_handler_captures_the_submission() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    let doc = session.document_mut();
    let button = doc.create_element(form, "button", &[]);
    doc.create_text(button, "Save");

    let popup_slot = Rc::new(RefCell::new(None));
    let opener: ListenerFn = {
        let popup_slot = Rc::clone(&popup_slot);
        Rc::new(move |session: &mut Session, _event: &mut EventState| {
            *popup_slot.borrow_mut() = Some(session.open_window("popup"));
            ListenerOutcome::Continue
        })
    };
    session.add_listener(button, "click", false, opener);

    let origin = session.current_context();
    let landed = session.click(button)?;
    let popup = popup_slot.borrow().unwrap();
    // The handler's window takes the response; the origin page stays put.
    assert_eq!(landed, popup);
    assert_eq!(session.current_context(), popup);
    assert_eq!(session.context_url(popup), "https://app.local/save");
    assert_eq!(session.context_url(origin), "https://app.local/start");
    Ok(())
}

#[test]
fn only_the_submitter_contributes_its_button_pair() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "ada")]);
    let go = doc.create_element(
        form,
        "input",
        &[("type", "submit"), ("name", "go"), ("value", "first")],
    );
    doc.create_element(
        form,
        "input",
        &[("type", "submit"), ("name", "stop"), ("value", "second")],
    );

    session.click(go)?;
    let requests = session.take_requests();
    assert_eq!(urlencoded_body(&requests[0]), "user=ada&go=first");
    Ok(())
}

#[test]
fn submitting_without_a_button_leaves_button_pairs_out() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "ada")]);
    doc.create_element(
        form,
        "input",
        &[("type", "submit"), ("name", "go"), ("value", "first")],
    );

    session.submit(form)?;
    let requests = session.take_requests();
    assert_eq!(urlencoded_body(&requests[0]), "user=ada");
    Ok(())
}

#[test]
fn image_submitters_send_their_click_coordinates() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/go");
    let map = session
        .document_mut()
        .create_element(form, "input", &[("type", "image"), ("name", "map")]);

    session.click(map)?;
    let requests = session.take_requests();
    assert_eq!(requests[0].url, "https://app.local/go?map.x=0&map.y=0");

    let (mut session, _body, form) = form_page("get", "/go");
    let bare = session
        .document_mut()
        .create_element(form, "input", &[("type", "image")]);
    session.click(bare)?;
    let requests = session.take_requests();
    assert_eq!(requests[0].url, "https://app.local/go?x=0&y=0");

    // Not the submitter, no coordinates.
    let (mut session, _body, form) = form_page("get", "/go");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "image"), ("name", "map")]);
    doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "ada")]);
    session.submit(form)?;
    let requests = session.take_requests();
    assert_eq!(requests[0].url, "https://app.local/go?user=ada");
    Ok(())
}

#[test]
fn checkboxes_radios_and_selects_contribute_when_set() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/go");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "checkbox"), ("name", "opt"), ("checked", "")]);
    doc.create_element(form, "input", &[("type", "checkbox"), ("name", "skip")]);
    doc.create_element(
        form,
        "input",
        &[("type", "radio"), ("name", "plan"), ("value", "basic"), ("checked", "")],
    );
    let pet = doc.create_element(form, "select", &[("name", "pet")]);
    let dog = doc.create_element(pet, "option", &[("value", "dog")]);
    doc.create_text(dog, "Dog");
    let cat = doc.create_element(pet, "option", &[("value", "cat")]);
    doc.create_text(cat, "Cat");
    let tags = doc.create_element(form, "select", &[("name", "tags"), ("multiple", "")]);
    doc.create_element(tags, "option", &[("value", "a"), ("selected", "")]);
    doc.create_element(tags, "option", &[("value", "b"), ("selected", "")]);
    doc.create_element(tags, "option", &[("value", "c")]);
    let broken = doc.create_element(form, "select", &[("name", "broken")]);
    doc.create_element(broken, "option", &[("value", "bad"), ("selected", ""), ("disabled", "")]);

    session.submit(form)?;
    let requests = session.take_requests();
    assert_eq!(
        requests[0].url,
        "https://app.local/go?opt=on&plan=basic&pet=dog&tags=a&tags=b"
    );
    Ok(())
}

#[test]
fn the_form_attribute_reassigns_ownership() -> Result<()> {
    let (mut session, body, form) = form_page("get", "/go");
    let doc = session.document_mut();
    doc.set_attr(form, "id", "f1");
    // Outside the form element, tied in by reference.
    doc.create_element(body, "input", &[("type", "text"), ("name", "outer"), ("value", "in"), ("form", "f1")]);
    // Inside the form element, pointed elsewhere or nowhere.
    doc.create_element(body, "form", &[("id", "f2"), ("action", "/other")]);
    doc.create_element(form, "input", &[("type", "text"), ("name", "stolen"), ("value", "x"), ("form", "f2")]);
    doc.create_element(form, "input", &[("type", "text"), ("name", "dangling"), ("value", "x"), ("form", "nope")]);
    doc.create_element(form, "input", &[("type", "text"), ("name", "dead"), ("value", "x"), ("disabled", "")]);
    let pen = doc.create_element(form, "fieldset", &[("disabled", "")]);
    doc.create_element(pen, "input", &[("type", "text"), ("name", "fenced"), ("value", "x")]);

    session.submit(form)?;
    let requests = session.take_requests();
    assert_eq!(requests[0].url, "https://app.local/go?outer=in");
    Ok(())
}

#[test]
fn get_submissions_rewrite_the_query_and_drop_the_fragment() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/search?old=1#frag");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "text"), ("name", "q"), ("value", "cats")]);
    let pic = doc.create_element(form, "input", &[("type", "file"), ("name", "pic")]);

    session.set_files(pic, vec![SelectedFile::new("dog.png", None, vec![1, 2, 3])])?;
    session.submit(form)?;
    let requests = session.take_requests();
    assert_eq!(requests[0].method, Method::Get);
    // Files never travel in a query string.
    assert_eq!(requests[0].url, "https://app.local/search?q=cats");
    assert_eq!(requests[0].body, RequestBody::None);
    session.assert_url("https://app.local/search?q=cats")?;
    Ok(())
}

#[test]
fn post_urlencoded_sets_the_content_type_header() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    let doc = session.document_mut();
    doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "ada")]);
    doc.create_element(form, "input", &[("type", "text"), ("name", "note"), ("value", "a b+c")]);

    session.submit(form)?;
    let requests = session.take_requests();
    assert_eq!(
        requests[0].header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(urlencoded_body(&requests[0]), "user=ada&note=a+b%2Bc");
    Ok(())
}

#[test]
fn reset_restores_defaults_with_one_reset_event_and_no_change_events() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    let doc = session.document_mut();
    let user = doc.create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "x")]);
    let opt = doc.create_element(form, "input", &[("type", "checkbox"), ("checked", "")]);
    let pet = doc.create_element(form, "select", &[("name", "pet")]);
    let dog = doc.create_element(pet, "option", &[("value", "dog"), ("selected", "")]);
    doc.create_text(dog, "Dog");
    let cat = doc.create_element(pet, "option", &[("value", "cat")]);
    doc.create_text(cat, "Cat");
    let cv = doc.create_element(form, "input", &[("type", "file"), ("name", "cv")]);
    let notes = doc.create_element(form, "textarea", &[("name", "notes")]);
    doc.create_text(notes, "orig");
    let reset_btn = doc.create_element(form, "button", &[("type", "reset")]);

    session.set_value(user, "y")?;
    session.set_checked(opt, false)?;
    session.select_option(pet, cat)?;
    session.set_files(cv, vec![SelectedFile::new("cv.txt", None, b"hi".to_vec())])?;
    session.set_value(notes, "edited")?;

    let events = event_log();
    session.add_listener(form, "reset", false, recording_listener(&events, "form"));
    for control in [user, opt, pet, cv, notes] {
        session.add_listener(control, "change", false, recording_listener(&events, "ctl"));
    }

    session.click(reset_btn)?;
    assert_eq!(*events.borrow(), ["form:reset"]);
    session.assert_value(user, "x")?;
    session.assert_checked(opt, true)?;
    session.assert_value(pet, "dog")?;
    session.assert_value(cv, "")?;
    session.assert_value(notes, "orig")?;
    Ok(())
}

#[test]
fn a_cancelled_reset_changes_nothing() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    let user = session
        .document_mut()
        .create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "x")]);

    session.set_value(user, "y")?;
    session.add_listener(form, "reset", false, cancelling_listener());
    session.reset(form);
    session.assert_value(user, "y")?;
    Ok(())
}

#[test]
fn request_submit_rejects_a_submitter_that_is_not_one() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    let doc = session.document_mut();
    let text = doc.create_element(form, "input", &[("type", "text"), ("name", "user")]);
    let reset_btn = doc.create_element(form, "button", &[("type", "reset")]);

    for wrong in [text, reset_btn] {
        match session.request_submit(form, Some(wrong)) {
            Err(Error::TypeMismatch { .. }) => {}
            other => panic!("expected a type mismatch, got {other:?}"),
        }
    }
    assert!(session.take_requests().is_empty());
    Ok(())
}

#[test]
fn request_submit_rejects_a_foreign_submitter() -> Result<()> {
    let (mut session, body, form) = form_page("post", "/save");
    let doc = session.document_mut();
    let other_form = doc.create_element(body, "form", &[("action", "/other")]);
    let foreign = doc.create_element(other_form, "input", &[("type", "submit")]);

    match session.request_submit(form, Some(foreign)) {
        Err(Error::TypeMismatch { .. }) => {}
        other => panic!("expected a type mismatch, got {other:?}"),
    }
    assert!(session.take_requests().is_empty());
    Ok(())
}

#[test]
fn request_submit_honors_the_submitter_overrides() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/a");
    let button = session.document_mut().create_element(
        form,
        "input",
        &[("type", "submit"), ("name", "go"), ("value", "now"), ("formaction", "/b")],
    );

    session.request_submit(form, Some(button))?;
    let requests = session.take_requests();
    assert_eq!(requests[0].url, "https://app.local/b?go=now");
    Ok(())
}

#[test]
fn a_named_form_target_is_created_once_and_reused() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/result");
    session.document_mut().set_attr(form, "target", "news");

    let origin = session.current_context();
    let landed = session.submit(form)?;
    assert_ne!(landed, origin);
    assert_eq!(session.context_name(landed), "news");
    assert_eq!(session.contexts().len(), 2);

    // The origin page is untouched; submitting again reuses the window.
    session.set_current_context(origin);
    session.assert_url("https://app.local/start")?;
    let again = session.submit(form)?;
    assert_eq!(again, landed);
    assert_eq!(session.contexts().len(), 2);
    Ok(())
}

#[test]
fn submitting_a_non_form_node_is_a_no_op() -> Result<()> {
    let (mut session, body, _form) = form_page("post", "/save");
    let before = session.current_context();
    let landed = session.submit(body)?;
    assert_eq!(landed, before);
    assert!(session.take_requests().is_empty());
    session.reset(body);
    Ok(())
}

#[test]
fn a_submit_handler_replacing_the_page_aborts_the_pipeline() -> Result<()> {
    let (mut session, _body, form) = form_page("post", "/save");
    session
        .document_mut()
        .create_element(form, "input", &[("type", "text"), ("name", "user"), ("value", "ada")]);

    let hijack: ListenerFn = Rc::new(|session: &mut Session, _event: &mut EventState| {
        let ctx = session.current_context();
        session.install_page(ctx, "https://app.local/hijacked", Document::with_body_text("taken"));
        ListenerOutcome::Continue
    });
    session.add_listener(form, "submit", false, hijack);

    session.submit(form)?;
    assert!(session.take_requests().is_empty());
    session.assert_url("https://app.local/hijacked")?;
    Ok(())
}

#[test]
fn submit_responses_can_come_from_a_mocked_page() -> Result<()> {
    let (mut session, _body, form) = form_page("get", "/result");
    let mut landing = Document::new();
    landing.set_title("Results");
    let landing_body = landing.ensure_body();
    landing.create_text(landing_body, "ten hits");
    session.mock_page("https://app.local/result", landing);

    let landed = session.submit(form)?;
    assert_eq!(landed, ContextId(0));
    assert_eq!(session.page_title(), "Results");
    assert_eq!(session.body_text(), "ten hits");
    Ok(())
}
