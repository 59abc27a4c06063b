use chrono::{DateTime, TimeZone, Utc};
use clearme::config::PortalConfig;
use clearme::workflows::clearance::{
    BulkDecision, BulkItemOutcome, ClearanceAggregate, ClearanceError, ClearanceItemId, ClearanceServices,
    ClearanceStatus, DecisionAction, DecisionRequest, DepartmentId, InlineUpload, OverallStatus,
    PaymentStatus, StudentId, StudentProfile,
};

const PIXEL_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn graduating_student(id: &str, payment_status: PaymentStatus) -> StudentProfile {
    StudentProfile {
        id: StudentId(id.to_string()),
        first_name: "Maria".to_string(),
        last_name: "Garcia".to_string(),
        full_name: None,
        program: "BSED".to_string(),
        section: "4B".to_string(),
        year_level: "4th Year".to_string(),
        email: format!("{id}@students.smcl.edu.ph"),
        contact_number: String::new(),
        address: String::new(),
        enrollment_date: None,
        expected_graduation: None,
        payment_status,
    }
}

fn overall(aggregate: &ClearanceAggregate, now: DateTime<Utc>) -> OverallStatus {
    let statuses: Vec<ClearanceStatus> = aggregate
        .items
        .iter()
        .map(|entry| entry.item.status)
        .collect();
    OverallStatus::derive(
        &aggregate.progress,
        &statuses,
        &aggregate.student.access,
        now,
    )
}

fn item(student: &str, department: &str) -> ClearanceItemId {
    ClearanceItemId::for_pair(
        &StudentId(student.to_string()),
        &DepartmentId(department.to_string()),
    )
}

fn sign(services: &ClearanceServices, department: &str, officer: &str) {
    services
        .bind_inline(
            InlineUpload {
                department_id: department.to_string(),
                image_data: PIXEL_PNG.to_string(),
                officer_name: officer.to_string(),
                ..InlineUpload::default()
            },
            at(3, 7),
        )
        .expect("signature bound");
}

fn sign_all(services: &ClearanceServices) {
    for (department, officer) in [
        ("cashier", "Ms. Ana Reyes"),
        ("library", "Mr. Jose Dela Cruz"),
        ("guidance", "Dr. Carmen Lopez"),
        ("clinic", "Nurse Patricia Gomez"),
        ("registrar", "Mr. Roberto Fernandez"),
    ] {
        sign(services, department, officer);
    }
}

#[test]
fn graduating_student_clears_every_department() {
    let services = ClearanceServices::standalone(&PortalConfig::default());
    sign_all(&services);

    let submitted = services
        .submit(graduating_student("2021-0042", PaymentStatus::Cleared), at(3, 8))
        .expect("submission accepted");
    assert_eq!(submitted.items.len(), 5);
    assert_eq!(submitted.progress.approved_count, 0);
    assert_eq!(submitted.student.clearance_id, "CLR-2025-2021-0042");

    for (hour, department) in (9..).zip(["cashier", "library", "guidance", "clinic"]) {
        services
            .engine
            .decide(
                &item("2021-0042", department),
                DecisionRequest::new(DecisionAction::Approve),
                at(3, hour),
            )
            .expect("approved");
    }
    let midway = services
        .engine
        .aggregate(&StudentId("2021-0042".to_string()))
        .expect("aggregate");
    assert_eq!(midway.progress.approved_count, 4);
    assert!(!midway.progress.is_complete);
    assert_eq!(
        overall(&midway, at(3, 13)),
        OverallStatus::InProgress
    );

    let last = services
        .engine
        .decide(
            &item("2021-0042", "registrar"),
            DecisionRequest::new(DecisionAction::Approve),
            at(3, 14),
        )
        .expect("approved");
    assert_eq!(last.item.status, ClearanceStatus::Approved);
    assert_eq!(
        last.item.officer_name, "Mr. Roberto Fernandez",
        "officer defaults to the signature owner"
    );

    let done = services
        .engine
        .aggregate(&StudentId("2021-0042".to_string()))
        .expect("aggregate");
    assert_eq!(done.progress.percent(), 100);
    assert_eq!(overall(&done, at(3, 15)), OverallStatus::Completed);

    let document = services
        .document(&StudentId("2021-0042".to_string()), at(3, 15).date_naive())
        .expect("document");
    assert_eq!(document.filled_slots, 5);
}

#[test]
fn outstanding_balance_blocks_the_cashier_until_cleared() {
    let services = ClearanceServices::standalone(&PortalConfig::default());
    sign_all(&services);
    services
        .submit(graduating_student("2021-0042", PaymentStatus::Pending), at(3, 8))
        .expect("submission accepted");

    let held = services
        .engine
        .decide(
            &item("2021-0042", "cashier"),
            DecisionRequest::new(DecisionAction::RequirePayment { amount: 2500 }),
            at(3, 9),
        )
        .expect("payment required");
    assert_eq!(held.item.status, ClearanceStatus::RequiresPayment);
    assert_eq!(held.item.payment_amount, Some(2500));

    let err = services
        .engine
        .decide(
            &item("2021-0042", "cashier"),
            DecisionRequest::new(DecisionAction::Approve),
            at(3, 10),
        )
        .expect_err("held items cannot be approved");
    assert!(matches!(err, ClearanceError::InvalidState { .. }));

    services
        .engine
        .clear_payment(&StudentId("2021-0042".to_string()), at(4, 9))
        .expect("payment cleared");
    let approved = services
        .engine
        .decide(
            &item("2021-0042", "cashier"),
            DecisionRequest::new(DecisionAction::Approve),
            at(4, 10),
        )
        .expect("approved after payment");
    assert_eq!(approved.item.status, ClearanceStatus::Approved);
}

#[test]
fn rejection_is_final_and_resubmission_is_refused() {
    let services = ClearanceServices::standalone(&PortalConfig::default());
    services
        .submit(graduating_student("2021-0042", PaymentStatus::Cleared), at(3, 8))
        .expect("submission accepted");

    let mut reject = DecisionRequest::new(DecisionAction::Reject);
    reject.remarks = Some("Unreturned laboratory equipment".to_string());
    services
        .engine
        .decide(&item("2021-0042", "clinic"), reject, at(3, 9))
        .expect("rejected");

    sign(&services, "clinic", "Nurse Patricia Gomez");
    let err = services
        .engine
        .decide(
            &item("2021-0042", "clinic"),
            DecisionRequest::new(DecisionAction::Approve),
            at(3, 10),
        )
        .expect_err("rejected items are terminal");
    assert!(matches!(
        err,
        ClearanceError::InvalidState {
            status: ClearanceStatus::Rejected,
            ..
        }
    ));

    let err = services
        .submit(graduating_student("2021-0042", PaymentStatus::Cleared), at(3, 11))
        .expect_err("already submitted");
    assert!(matches!(err, ClearanceError::AlreadySubmitted(_)));
}

#[test]
fn library_officer_bulk_approves_the_pending_queue() {
    let services = ClearanceServices::standalone(&PortalConfig::default());
    sign(&services, "library", "Mr. Jose Dela Cruz");
    for id in ["2021-0001", "2021-0002", "2021-0003"] {
        services
            .submit(graduating_student(id, PaymentStatus::Cleared), at(3, 8))
            .expect("submission accepted");
    }
    services
        .engine
        .decide(
            &item("2021-0003", "library"),
            DecisionRequest::new(DecisionAction::Reject),
            at(3, 9),
        )
        .expect("rejected");

    let outcome = services
        .engine
        .bulk_decide(
            &DepartmentId("library".to_string()),
            BulkDecision {
                student_ids: vec![
                    StudentId("2021-0001".to_string()),
                    StudentId("2021-0002".to_string()),
                    StudentId("2021-0003".to_string()),
                ],
                action: DecisionAction::Approve,
                officer_name: None,
                signature_id: None,
                remarks: None,
            },
            at(3, 10),
        )
        .expect("bulk decision");

    assert_eq!(outcome.decided_count, 2);
    assert_eq!(outcome.skipped_count, 1);
    assert_eq!(outcome.failed_count, 0);
    assert!(matches!(
        outcome.results[2].outcome,
        BulkItemOutcome::Skipped { .. }
    ));
}
