use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::domain::{
    ClearanceAggregate, ClearanceProgress, ClearanceStatus, DepartmentClearance, DepartmentId,
    OverallStatus, SignatureId, Student, StudentId, StudentProfile,
};
use super::engine::{summarize, BulkDecision, ClearanceQuery, DecisionAction, DecisionRequest};
use super::registry::{Department, DepartmentUpdate};
use super::response::{created, ok, ApiError};
use super::services::ClearanceServices;
use super::signature::{InlineUpload, Signature};
use super::stats;

/// Router builder exposing the clearance workflow under `/api/v1`.
pub fn clearance_router(services: ClearanceServices) -> Router {
    Router::new()
        .route(
            "/api/v1/clearance",
            post(submit_handler).get(list_handler),
        )
        .route("/api/v1/clearance/access/:token", get(access_handler))
        .route(
            "/api/v1/students/:student_id/clearance",
            get(student_clearance_handler).put(decision_handler),
        )
        .route(
            "/api/v1/students/:student_id/payment-cleared",
            post(payment_cleared_handler),
        )
        .route(
            "/api/v1/students/:student_id/clearance/document",
            get(document_handler),
        )
        .route("/api/v1/clearances/bulk-approve", post(bulk_approve_handler))
        .route(
            "/api/v1/departments",
            get(departments_handler).post(add_department_handler),
        )
        .route(
            "/api/v1/departments/:department_id",
            put(update_department_handler).delete(delete_department_handler),
        )
        .route(
            "/api/v1/departments/:department_id/queue",
            get(queue_handler),
        )
        .route("/api/v1/signatures/upload", post(upload_signature_handler))
        .route("/api/v1/signatures", get(signatures_handler))
        .route("/api/v1/admin/generate-links", post(generate_links_handler))
        .route("/api/v1/admin/statistics", get(statistics_handler))
        .route("/api/v1/admin/export.csv", get(export_handler))
        .route("/api/v1/pdf/generate", post(pdf_generate_handler))
        .with_state(services)
}

pub(crate) fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body)
        .map_err(|error| ApiError::validation(format!("invalid request body: {error}")))
}

/// Aggregate as returned to the portal and the admin views.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClearanceView {
    student: Student,
    clearance_items: Vec<DepartmentClearance>,
    progress: ClearanceProgress,
    progress_percent: u8,
    overall_status: OverallStatus,
    unique_link: String,
}

impl ClearanceView {
    pub(crate) fn build(services: &ClearanceServices, aggregate: ClearanceAggregate) -> Self {
        let summary = summarize(&aggregate, Utc::now());
        let unique_link = services.access.link_for(&aggregate.student.access.token);
        Self {
            progress_percent: aggregate.progress.percent(),
            progress: aggregate.progress,
            overall_status: summary.status,
            student: aggregate.student,
            clearance_items: aggregate.items,
            unique_link,
        }
    }
}

pub(crate) async fn submit_handler(
    State(services): State<ClearanceServices>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let profile: StudentProfile = parse_body(body)?;
    let aggregate = services.submit(profile, Utc::now())?;
    Ok(created(
        "Clearance request submitted successfully",
        ClearanceView::build(&services, aggregate),
    ))
}

pub(crate) async fn list_handler(
    State(services): State<ClearanceServices>,
    Query(query): Query<ClearanceQuery>,
) -> Result<Response, ApiError> {
    let rows = services.engine.list(&query, Utc::now())?;
    Ok(ok(format!("{} clearance request(s)", rows.len()), rows))
}

pub(crate) async fn access_handler(
    State(services): State<ClearanceServices>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let student = services.access.resolve(&token, Utc::now())?;
    let aggregate = services.engine.aggregate(&student.id)?;
    Ok(ok(
        "Clearance found",
        ClearanceView::build(&services, aggregate),
    ))
}

pub(crate) async fn student_clearance_handler(
    State(services): State<ClearanceServices>,
    Path(student_id): Path<String>,
) -> Result<Response, ApiError> {
    let aggregate = services.engine.aggregate(&StudentId(student_id))?;
    Ok(ok(
        "Clearance found",
        ClearanceView::build(&services, aggregate),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionBody {
    #[serde(default)]
    department_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    officer_name: Option<String>,
    #[serde(default)]
    signature_id: Option<String>,
    #[serde(default)]
    remarks: Option<String>,
    #[serde(default)]
    payment_amount: Option<u64>,
    #[serde(default)]
    expected_version: Option<u64>,
}

fn decision_action(status: &str, payment_amount: Option<u64>) -> Result<DecisionAction, ApiError> {
    match ClearanceStatus::parse(status) {
        Some(ClearanceStatus::Approved) => Ok(DecisionAction::Approve),
        Some(ClearanceStatus::Rejected) => Ok(DecisionAction::Reject),
        Some(ClearanceStatus::RequiresPayment) => Ok(DecisionAction::RequirePayment {
            amount: payment_amount.unwrap_or(0),
        }),
        _ => Err(ApiError::validation(
            "status must be one of approved, rejected, requires_payment",
        )),
    }
}

pub(crate) async fn decision_handler(
    State(services): State<ClearanceServices>,
    Path(student_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let body: DecisionBody = parse_body(body)?;
    if body.department_id.trim().is_empty() {
        return Err(ApiError::validation("departmentId is required"));
    }
    let request = DecisionRequest {
        action: decision_action(&body.status, body.payment_amount)?,
        officer_name: body.officer_name,
        signature_id: body
            .signature_id
            .filter(|id| !id.trim().is_empty())
            .map(SignatureId),
        remarks: body.remarks,
        expected_version: body.expected_version,
    };

    let entry = services.engine.decide_for(
        &StudentId(student_id),
        &DepartmentId(body.department_id.trim().to_string()),
        request,
        Utc::now(),
    )?;
    Ok(ok("Clearance updated successfully", entry))
}

pub(crate) async fn payment_cleared_handler(
    State(services): State<ClearanceServices>,
    Path(student_id): Path<String>,
) -> Result<Response, ApiError> {
    let aggregate = services
        .engine
        .clear_payment(&StudentId(student_id), Utc::now())?;
    Ok(ok(
        "Payment cleared",
        ClearanceView::build(&services, aggregate),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct DocumentQuery {
    #[serde(default)]
    format: Option<String>,
}

pub(crate) async fn document_handler(
    State(services): State<ClearanceServices>,
    Path(student_id): Path<String>,
    Query(query): Query<DocumentQuery>,
) -> Result<Response, ApiError> {
    let document = services.document(&StudentId(student_id), Utc::now().date_naive())?;
    if query.format.as_deref() == Some("json") {
        return Ok(ok("Clearance document rendered", document));
    }
    Ok((
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        document.html,
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkApproveBody {
    #[serde(default)]
    department_id: Option<String>,
    #[serde(default)]
    student_ids: Option<Vec<String>>,
    #[serde(default)]
    officer_name: Option<String>,
    #[serde(default)]
    remarks: Option<String>,
    #[serde(default)]
    signature_id: Option<String>,
}

pub(crate) async fn bulk_approve_handler(
    State(services): State<ClearanceServices>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let body: BulkApproveBody = parse_body(body)?;
    let department = body
        .department_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("departmentId is required"))?;
    let student_ids: Vec<StudentId> = body
        .student_ids
        .unwrap_or_default()
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(StudentId)
        .collect();
    if student_ids.is_empty() {
        return Err(ApiError::validation(
            "studentIds must contain at least one student",
        ));
    }

    let decision = BulkDecision {
        student_ids,
        action: DecisionAction::Approve,
        officer_name: body.officer_name,
        signature_id: body
            .signature_id
            .filter(|id| !id.trim().is_empty())
            .map(SignatureId),
        remarks: body.remarks,
    };
    let outcome = services
        .engine
        .bulk_decide(&DepartmentId(department), decision, Utc::now())?;

    let message = format!(
        "Approved {} student clearance(s); {} skipped, {} failed",
        outcome.decided_count, outcome.skipped_count, outcome.failed_count
    );
    Ok(ok(
        message,
        json!({
            "departmentId": outcome.department_id,
            "approvedCount": outcome.decided_count,
            "skippedCount": outcome.skipped_count,
            "failedCount": outcome.failed_count,
            "approvalRecords": outcome.results,
        }),
    ))
}

pub(crate) async fn departments_handler(
    State(services): State<ClearanceServices>,
) -> Result<Response, ApiError> {
    let departments = services.engine.departments()?;
    Ok(ok(format!("{} department(s)", departments.len()), departments))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewDepartment {
    #[serde(default)]
    id: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    officer_name: String,
    #[serde(default)]
    officer_email: String,
    #[serde(default)]
    display_order: Option<u16>,
    #[serde(default)]
    is_active: Option<bool>,
}

pub(crate) async fn add_department_handler(
    State(services): State<ClearanceServices>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let body: NewDepartment = parse_body(body)?;
    let next_order = services
        .engine
        .departments()?
        .iter()
        .map(|d| d.display_order)
        .max()
        .unwrap_or(0)
        + 1;
    let id = body.id.trim().to_string();
    let department = Department {
        code: body.code.unwrap_or_else(|| id.to_ascii_uppercase()),
        full_name: body.full_name.unwrap_or_else(|| body.name.clone()),
        id: DepartmentId(id),
        name: body.name,
        description: body.description,
        officer_name: body.officer_name,
        officer_email: body.officer_email,
        display_order: body.display_order.unwrap_or(next_order),
        is_active: body.is_active.unwrap_or(true),
    };
    let added = services.engine.add_department(department, Utc::now())?;
    Ok(created("Department added", added))
}

pub(crate) async fn update_department_handler(
    State(services): State<ClearanceServices>,
    Path(department_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let update: DepartmentUpdate = parse_body(body)?;
    let updated =
        services
            .engine
            .update_department(&DepartmentId(department_id), update, Utc::now())?;
    Ok(ok("Department updated", updated))
}

pub(crate) async fn delete_department_handler(
    State(services): State<ClearanceServices>,
    Path(department_id): Path<String>,
) -> Result<Response, ApiError> {
    let removed = services
        .engine
        .delete_department(&DepartmentId(department_id))?;
    Ok(ok("Department deleted", removed))
}

#[derive(Debug, Default, Deserialize)]
struct QueueQuery {
    #[serde(default)]
    status: Option<String>,
}

pub(crate) async fn queue_handler(
    State(services): State<ClearanceServices>,
    Path(department_id): Path<String>,
    Query(query): Query<QueueQuery>,
) -> Result<Response, ApiError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            ClearanceStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status '{raw}'")))?,
        ),
    };
    let queue = services
        .engine
        .department_queue(&DepartmentId(department_id), status)?;
    Ok(ok(format!("{} student(s) in queue", queue.len()), queue))
}

pub(crate) async fn upload_signature_handler(
    State(services): State<ClearanceServices>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let upload: InlineUpload = parse_body(body)?;
    let signature = services.bind_inline(upload, Utc::now())?;
    let Signature::Inline(inline) = &signature else {
        return Err(ApiError::validation("uploaded signature is not an image"));
    };
    Ok(created(
        "E-signature uploaded successfully",
        json!({
            "signatureId": inline.id,
            "departmentId": inline.department_id,
            "officerName": inline.officer_name,
            "version": inline.version,
            "uploadedAt": inline.uploaded_at,
            "coordinates": inline.placement,
            "styling": inline.styling,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureQuery {
    #[serde(default)]
    department_id: Option<String>,
}

pub(crate) async fn signatures_handler(
    State(services): State<ClearanceServices>,
    Query(query): Query<SignatureQuery>,
) -> Result<Response, ApiError> {
    let department = query
        .department_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(DepartmentId)
        .ok_or_else(|| ApiError::validation("departmentId is required"))?;
    services.engine.department(&department)?;

    let current = services.signatures.current_for(&department)?;
    let history = services.signatures.history(&department)?;
    Ok(ok(
        "Signatures found",
        json!({
            "departmentId": department,
            "current": current,
            "history": history,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateLinksBody {
    #[serde(default)]
    student_ids: Vec<String>,
    #[serde(default)]
    send_email: bool,
}

pub(crate) async fn generate_links_handler(
    State(services): State<ClearanceServices>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let body: GenerateLinksBody = parse_body(body)?;
    if body.student_ids.is_empty() {
        return Err(ApiError::validation(
            "studentIds must contain at least one student",
        ));
    }
    let ids: Vec<StudentId> = body.student_ids.into_iter().map(StudentId).collect();
    let batch = services
        .access
        .regenerate(&ids, body.send_email, Utc::now())?;
    Ok(ok(
        format!("Generated {} clearance links", batch.generated.len()),
        batch,
    ))
}

pub(crate) async fn statistics_handler(
    State(services): State<ClearanceServices>,
) -> Result<Response, ApiError> {
    let statistics = services.statistics(Utc::now())?;
    Ok(ok("Statistics computed", statistics))
}

pub(crate) async fn export_handler(
    State(services): State<ClearanceServices>,
    Query(query): Query<ClearanceQuery>,
) -> Result<Response, ApiError> {
    let now = Utc::now();
    let rows = services.engine.list(&query, now)?;
    let csv = stats::export_csv(&rows)?;
    let disposition = format!(
        "attachment; filename=\"clearance-export-{}.csv\"",
        now.format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PdfRequest {
    #[serde(default)]
    student_id: String,
}

pub(crate) async fn pdf_generate_handler(
    State(services): State<ClearanceServices>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let request: PdfRequest = parse_body(body)?;
    if request.student_id.trim().is_empty() {
        return Err(ApiError::validation("studentId is required"));
    }
    let bundle =
        services.document_bundle(&StudentId(request.student_id.trim().to_string()), Utc::now())?;
    Ok(ok(
        format!("Collected {} signature(s)", bundle.signature_count),
        bundle,
    ))
}
