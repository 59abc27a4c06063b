use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::{
    AppConfig, AppEnvironment, LogFormat, PortalConfig, ServerConfig, TelemetryConfig,
    WebhookConfig,
};
use crate::integrations::signing::{
    BundleRequest, BundleSnapshot, SigningError, SigningProvider, SnapshotSigner,
};
use crate::workflows::clearance::signature::InlineUpload;
use crate::workflows::clearance::{
    ClearanceAggregate, ClearanceServices, DepartmentId, DepartmentRegistry, Integrations,
    PaymentStatus, Signature, StudentId, StudentProfile,
};

pub(super) const PIXEL_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub(super) const STANDARD_DEPARTMENTS: [&str; 5] =
    ["cashier", "library", "guidance", "clinic", "registrar"];

pub(super) fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn profile(id: &str) -> StudentProfile {
    StudentProfile {
        id: StudentId(id.to_string()),
        first_name: "Juan".to_string(),
        last_name: "Santos".to_string(),
        full_name: None,
        program: "BSIT".to_string(),
        section: "4A".to_string(),
        year_level: "4th Year".to_string(),
        email: format!("{id}@students.smcl.edu.ph"),
        contact_number: "09171234567".to_string(),
        address: "Biñan, Laguna".to_string(),
        enrollment_date: None,
        expected_graduation: None,
        payment_status: PaymentStatus::Cleared,
    }
}

pub(super) fn services() -> ClearanceServices {
    ClearanceServices::standalone(&PortalConfig::default())
}

pub(super) fn app_config(webhooks: WebhookConfig) -> AppConfig {
    AppConfig {
        environment: AppEnvironment::Test,
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        telemetry: TelemetryConfig {
            log_level: "debug".to_string(),
            format: LogFormat::Compact,
        },
        portal: PortalConfig::default(),
        sync: None,
        signing: None,
        webhooks,
    }
}

pub(super) fn services_with_signing(provider: ScriptedSigning) -> ClearanceServices {
    ClearanceServices::new(
        &app_config(WebhookConfig {
            external_system_secret: None,
            signing_secret: Some("signing-secret".to_string()),
        }),
        DepartmentRegistry::standard(),
        Integrations {
            signing: Some(Arc::new(provider)),
            ..Integrations::default()
        },
    )
}

pub(super) fn submitted(services: &ClearanceServices, id: &str) -> ClearanceAggregate {
    services
        .submit(profile(id), at(8))
        .expect("submission accepted")
}

pub(super) fn upload(department: &str, officer: &str) -> InlineUpload {
    InlineUpload {
        department_id: department.to_string(),
        image_data: PIXEL_PNG.to_string(),
        officer_name: officer.to_string(),
        ..InlineUpload::default()
    }
}

pub(super) fn bind_signature(services: &ClearanceServices, department: &str) -> Signature {
    services
        .bind_inline(upload(department, "Officer On Duty"), at(7))
        .expect("signature bound")
}

pub(super) fn sign_every_department(services: &ClearanceServices) {
    for department in STANDARD_DEPARTMENTS {
        bind_signature(services, department);
    }
}

pub(super) fn department(id: &str) -> DepartmentId {
    DepartmentId(id.to_string())
}

pub(super) fn json_request(
    method: &str,
    uri: &str,
    body: &Value,
) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub(super) fn get_request(uri: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::get(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

pub(super) async fn read_body(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = read_body(response).await;
    serde_json::from_str(&body).expect("json body")
}

/// Signing provider double: records created bundles and serves a scripted status.
#[derive(Clone, Default)]
pub(super) struct ScriptedSigning {
    pub created: Arc<Mutex<Vec<BundleRequest>>>,
    pub status: Arc<Mutex<String>>,
}

impl ScriptedSigning {
    pub(super) fn complete(&self) {
        *self.status.lock().expect("signing mutex poisoned") = "co".to_string();
    }

    fn snapshot(&self, bundle_id: &str) -> BundleSnapshot {
        let status = self.status.lock().expect("signing mutex poisoned").clone();
        let signed_at = (status == "co").then(|| at(12));
        BundleSnapshot {
            bundle_id: bundle_id.to_string(),
            status,
            signers: vec![
                SnapshotSigner {
                    name: "Juan Santos".to_string(),
                    email: "student@example.test".to_string(),
                    signing_order: 1,
                    signed_at,
                },
                SnapshotSigner {
                    name: "Mr. Jose Dela Cruz".to_string(),
                    email: "jose.delacruz@smcl.edu.ph".to_string(),
                    signing_order: 2,
                    signed_at,
                },
            ],
            download_url: None,
            completed_at: signed_at,
        }
    }
}

#[async_trait]
impl SigningProvider for ScriptedSigning {
    async fn create_bundle(&self, request: BundleRequest) -> Result<BundleSnapshot, SigningError> {
        let mut created = self.created.lock().expect("signing mutex poisoned");
        created.push(request);
        let bundle_id = format!("bundle-{}", created.len());
        drop(created);
        Ok(self.snapshot(&bundle_id))
    }

    async fn get_bundle(&self, bundle_id: &str) -> Result<BundleSnapshot, SigningError> {
        Ok(self.snapshot(bundle_id))
    }
}
