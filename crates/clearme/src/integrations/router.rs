use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::external::mapping::sync_log_to_external;
use super::external::{apply_inbound, SyncError, SyncService, SyncWebhook};
use super::sync_log::{
    record_quietly, SyncDirection, SyncLogEntry, SyncLogFilter, SyncLogStore, SyncStatus, SyncType,
};
use super::webhook::WebhookVerifier;
use crate::workflows::clearance::response::{created, ok, ApiError, Envelope};
use crate::workflows::clearance::router::parse_body;
use crate::workflows::clearance::signature::BundleEvent;
use crate::workflows::clearance::{ClearanceServices, DepartmentId, StudentId};

const SYNC_WEBHOOK_HEADER: &str = "x-webhook-signature";
const SIGNING_WEBHOOK_HEADER: &str = "x-blueink-signature";
const DEFAULT_SYNC_LOG_LIMIT: usize = 50;

/// Router builder for the signing provider and student-records endpoints.
pub fn integration_router(services: ClearanceServices) -> Router {
    Router::new()
        .route(
            "/api/v1/external-signing/create-bundle",
            post(create_bundle_handler),
        )
        .route("/api/v1/external-signing/get-bundle", get(get_bundle_handler))
        .route("/api/v1/external-signing/webhook", post(signing_webhook_handler))
        .route("/api/v1/sync/student/:student_id", post(sync_student_handler))
        .route(
            "/api/v1/sync/clearance/:student_id",
            post(sync_clearance_handler),
        )
        .route("/api/v1/sync/all", post(sync_all_handler))
        .route("/api/v1/sync/test", post(sync_test_handler))
        .route("/api/v1/sync/webhook", post(sync_webhook_handler))
        .route("/api/v1/sync/sync-logs", get(sync_logs_handler))
        .with_state(services)
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::Workflow(inner) => inner.into(),
            SyncError::Mapping(inner) => ApiError::validation(inner.to_string()),
            SyncError::UnsupportedEvent(event) => {
                ApiError::validation(format!("unsupported sync event '{event}'"))
            }
            SyncError::Gateway(inner) => ApiError::new(StatusCode::BAD_GATEWAY, inner.to_string()),
        }
    }
}

fn sync_service(services: &ClearanceServices) -> Result<&SyncService, ApiError> {
    services
        .sync
        .as_deref()
        .ok_or_else(|| ApiError::not_configured("student records sync"))
}

/// Check the shared-secret signature; rejections land in the sync log as inbound failures.
fn verify(
    verifier: Option<&WebhookVerifier>,
    log: &dyn SyncLogStore,
    sync_type: SyncType,
    feature: &str,
    headers: &HeaderMap,
    header: &str,
    body: &[u8],
) -> Result<(), ApiError> {
    let verifier = verifier.ok_or_else(|| ApiError::not_configured(feature))?;
    let provided = headers.get(header).and_then(|value| value.to_str().ok());
    verifier.verify(body, provided).map_err(|error| {
        warn!(%error, header, "webhook signature rejected");
        record_quietly(
            log,
            SyncLogEntry::new(
                sync_type,
                SyncDirection::FromExternal,
                SyncStatus::Failed,
                feature,
                Utc::now(),
            )
            .with_error(format!("WebhookSignatureError: {error}")),
        );
        ApiError::unauthorized("Invalid signature")
    })
}

/// Sync failures are reported in the body, never as an error status.
fn sync_failure(message: &str, error: SyncError) -> Response {
    warn!(%error, "{}", message);
    Envelope::<Value>::failed(format!("{message}: {error}"), None).into_response_with(StatusCode::OK)
}

// ----- external signing ---------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBundleBody {
    #[serde(default)]
    student_id: String,
    #[serde(default, alias = "department")]
    department_id: String,
}

pub(crate) async fn create_bundle_handler(
    State(services): State<ClearanceServices>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    if !services.signatures.external_signing_enabled() {
        return Err(ApiError::not_configured("external signing"));
    }
    let body: CreateBundleBody = parse_body(body)?;
    if body.student_id.trim().is_empty() || body.department_id.trim().is_empty() {
        return Err(ApiError::validation("studentId and departmentId are required"));
    }

    let request = services.signing_request(
        &StudentId(body.student_id.trim().to_string()),
        &DepartmentId(body.department_id.trim().to_string()),
    )?;
    let signature = services.signatures.bind_external(request, Utc::now()).await?;
    let status = services.signatures.status(&signature.id().0)?;
    Ok(created("Signature bundle created", status))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleQuery {
    #[serde(default)]
    bundle_id: Option<String>,
}

pub(crate) async fn get_bundle_handler(
    State(services): State<ClearanceServices>,
    Query(query): Query<BundleQuery>,
) -> Result<Response, ApiError> {
    let bundle_id = query
        .bundle_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("bundleId is required"))?;
    if !services.signatures.external_signing_enabled() {
        return Err(ApiError::not_configured("external signing"));
    }

    services.signatures.refresh_bundle(&bundle_id).await?;
    let status = services.signatures.status(&bundle_id)?;
    Ok(ok("Bundle status refreshed", status))
}

pub(crate) async fn signing_webhook_handler(
    State(services): State<ClearanceServices>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    verify(
        services.signing_webhook.as_deref(),
        services.sync_log.as_ref(),
        SyncType::Signature,
        "signing webhook",
        &headers,
        SIGNING_WEBHOOK_HEADER,
        &body,
    )?;
    let event: BundleEvent = serde_json::from_slice(&body)
        .map_err(|error| ApiError::validation(format!("invalid webhook payload: {error}")))?;

    let signature = services.signatures.record_bundle_event(event, Utc::now())?;
    let status = services.signatures.status(&signature.id().0)?;
    Ok(ok("Webhook processed successfully", status))
}

// ----- student records sync -----------------------------------------------------------

pub(crate) async fn sync_student_handler(
    State(services): State<ClearanceServices>,
    Path(student_id): Path<String>,
) -> Result<Response, ApiError> {
    let sync = sync_service(&services)?;
    let student = services.engine.student(&StudentId(student_id))?;
    match sync.push_student(&student).await {
        Ok(external_id) => Ok(ok(
            "Student synchronized to the records system",
            json!({ "studentId": student.id, "externalId": external_id }),
        )),
        Err(error) => Ok(sync_failure("Failed to synchronize student", error)),
    }
}

pub(crate) async fn sync_clearance_handler(
    State(services): State<ClearanceServices>,
    Path(student_id): Path<String>,
) -> Result<Response, ApiError> {
    let sync = sync_service(&services)?;
    let aggregate = services.engine.aggregate(&StudentId(student_id))?;
    match sync
        .push_clearances(&aggregate.student.id, &aggregate.items)
        .await
    {
        Ok(pushed) => Ok(ok(
            "Clearance status synchronized to the records system",
            json!({ "studentId": aggregate.student.id, "synced": pushed }),
        )),
        Err(error) => Ok(sync_failure("Failed to synchronize clearance", error)),
    }
}

pub(crate) async fn sync_all_handler(
    State(services): State<ClearanceServices>,
) -> Result<Response, ApiError> {
    let sync = sync_service(&services)?;
    match sync.sync_all(&services.engine).await {
        Ok(summary) => Ok(ok(
            "Full sync completed",
            json!({
                "synced": summary.synced(),
                "results": summary,
                "timestamp": Utc::now(),
            }),
        )),
        Err(error) => Ok(sync_failure("Failed to complete sync", error)),
    }
}

pub(crate) async fn sync_test_handler(
    State(services): State<ClearanceServices>,
) -> Result<Response, ApiError> {
    let sync = sync_service(&services)?;
    match sync.test_connection().await {
        Ok(()) => Ok(ok(
            "Connection successful",
            json!({ "connected": true, "timestamp": Utc::now() }),
        )),
        Err(error) => Ok(sync_failure("Connection failed", error)),
    }
}

pub(crate) async fn sync_webhook_handler(
    State(services): State<ClearanceServices>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    verify(
        services.sync_webhook.as_deref(),
        services.sync_log.as_ref(),
        SyncType::Student,
        "student records webhook",
        &headers,
        SYNC_WEBHOOK_HEADER,
        &body,
    )?;
    let webhook: SyncWebhook = serde_json::from_slice(&body)
        .map_err(|error| ApiError::validation(format!("invalid webhook payload: {error}")))?;

    let now = Utc::now();
    match apply_inbound(
        &services.engine,
        &services.access,
        services.sync_log.as_ref(),
        webhook,
        now,
    ) {
        Ok(outcome) => Ok(ok(
            "Webhook processed successfully",
            json!({ "outcome": outcome, "processedAt": now }),
        )),
        Err(SyncError::UnsupportedEvent(event)) => {
            warn!(event = %event, "unknown student records webhook event");
            Ok(ok(
                "Webhook ignored",
                json!({ "event": event, "processedAt": now }),
            ))
        }
        Err(error) => Err(error.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncLogQuery {
    #[serde(default)]
    sync_type: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    format: Option<String>,
}

pub(crate) async fn sync_logs_handler(
    State(services): State<ClearanceServices>,
    Query(query): Query<SyncLogQuery>,
) -> Result<Response, ApiError> {
    let sync_type = match query.sync_type.as_deref().filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            SyncType::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown syncType '{raw}'")))?,
        ),
        None => None,
    };
    let status = match query.status.as_deref().filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            SyncStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status '{raw}'")))?,
        ),
        None => None,
    };
    let filter = SyncLogFilter {
        sync_type,
        status,
        limit: Some(query.limit.unwrap_or(DEFAULT_SYNC_LOG_LIMIT)),
    };

    let entries = services.sync_log.query(&filter)?;
    let message = format!("{} sync log entries", entries.len());
    if query.format.as_deref() == Some("external") {
        let records: Vec<_> = entries.iter().map(sync_log_to_external).collect();
        return Ok(ok(message, records));
    }
    Ok(ok(message, entries))
}
