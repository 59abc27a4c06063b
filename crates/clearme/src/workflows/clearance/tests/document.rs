use chrono::NaiveDate;

use super::common::*;

use crate::workflows::clearance::document::escape_html;
use crate::workflows::clearance::{
    ClearanceItemId, ClearanceServices, ClearanceStatus, DecisionAction, DecisionRequest,
    StudentId,
};

fn issued() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid date")
}

fn decide(services: &ClearanceServices, department_id: &str, request: DecisionRequest) {
    let item = ClearanceItemId::for_pair(
        &StudentId("2021-0001".to_string()),
        &department(department_id),
    );
    services
        .engine
        .decide(&item, request, at(10))
        .expect("decided");
}

#[test]
fn pending_clearance_renders_empty_slots() {
    let services = services();
    submitted(&services, "2021-0001");

    let document = services
        .document(&StudentId("2021-0001".to_string()), issued())
        .expect("document");

    assert_eq!(document.total_slots, 5);
    assert_eq!(document.filled_slots, 0);
    assert_eq!(document.clearance_id, "CLR-2025-2021-0001");
    assert!(document.slots.iter().all(|slot| !slot.filled));
    assert_eq!(document.slots[0].number, 1);
    assert_eq!(document.slots[0].department_full_name, "Cashier's Office");
    assert!(document.html.contains("STUDENT&#39;S CLEARANCE"));
    assert!(document.html.contains("<strong>Date:</strong> March 14, 2025"));
    assert!(document.html.contains("Status: PENDING"));
    assert!(!document.html.contains("<img"));
    assert!(document.html.contains("F-CRO-18"));
}

#[test]
fn approved_slots_carry_the_signature_image() {
    let services = services();
    sign_every_department(&services);
    submitted(&services, "2021-0001");
    for department_id in STANDARD_DEPARTMENTS {
        decide(&services, department_id, DecisionRequest::new(DecisionAction::Approve));
    }

    let document = services
        .document(&StudentId("2021-0001".to_string()), issued())
        .expect("document");

    assert_eq!(document.filled_slots, 5);
    assert!(document
        .slots
        .iter()
        .all(|slot| slot.status == ClearanceStatus::Approved && slot.signature_id.is_some()));
    assert_eq!(document.html.matches("<img src=\"data:image/png;base64,").count(), 5);
    assert!(document.html.contains("Signed: 2025-03-10"));
}

#[test]
fn rendering_is_deterministic_for_the_same_inputs() {
    let services = services();
    bind_signature(&services, "library");
    submitted(&services, "2021-0001");
    decide(&services, "library", DecisionRequest::new(DecisionAction::Approve));

    let student = StudentId("2021-0001".to_string());
    let first = services.document(&student, issued()).expect("document");
    let second = services.document(&student, issued()).expect("document");
    assert_eq!(first, second);
    assert_eq!(first.filled_slots, 1);
}

#[test]
fn remarks_are_escaped_and_rejected_slots_stay_empty() {
    let services = services();
    submitted(&services, "2021-0001");
    let mut reject = DecisionRequest::new(DecisionAction::Reject);
    reject.remarks = Some("Return <Calculus> book & pay fine".to_string());
    decide(&services, "library", reject);

    let document = services
        .document(&StudentId("2021-0001".to_string()), issued())
        .expect("document");

    let library = &document.slots[1];
    assert_eq!(library.status, ClearanceStatus::Rejected);
    assert!(!library.filled);
    assert!(document
        .html
        .contains("Remarks: Return &lt;Calculus&gt; book &amp; pay fine"));
    assert!(document.html.contains("Status: REJECTED"));
}

#[test]
fn bundle_lists_manual_signatures_only_for_signed_items() {
    let services = services();
    sign_every_department(&services);
    submitted(&services, "2021-0001");
    decide(&services, "cashier", DecisionRequest::new(DecisionAction::Approve));
    decide(&services, "registrar", DecisionRequest::new(DecisionAction::Approve));

    let bundle = services
        .document_bundle(&StudentId("2021-0001".to_string()), at(12))
        .expect("bundle");
    assert_eq!(bundle.signature_count, 2);
    assert_eq!(bundle.manual_signatures, 2);
    assert_eq!(bundle.external_signatures, 0);
    assert_eq!(bundle.signatures[0].department, "Cashier");
    assert_eq!(
        bundle.download_url,
        "http://localhost:3000/api/v1/students/2021-0001/clearance/document"
    );
}

#[test]
fn escape_handles_markup_characters() {
    assert_eq!(
        escape_html(r#"<a href="x">O'Neil & co</a>"#),
        "&lt;a href=&quot;x&quot;&gt;O&#39;Neil &amp; co&lt;/a&gt;"
    );
}
