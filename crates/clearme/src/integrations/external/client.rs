use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::mapping::{PhpClearanceRecord, PhpStudentRecord};
use crate::config::ExternalSyncConfig;

const SYNC_SOURCE: &str = "clearme";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("student records http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("student records system returned {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },
    #[error("student records system rejected the request: {0}")]
    Rejected(String),
}

/// Acknowledgement for a pushed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushAck {
    pub external_id: String,
}

/// Outbound and inbound calls against the student-records backend.
#[async_trait]
pub trait ExternalSystem: Send + Sync {
    async fn push_student(&self, record: &PhpStudentRecord) -> Result<PushAck, GatewayError>;
    async fn push_clearance(
        &self,
        student_id: &str,
        record: &PhpClearanceRecord,
    ) -> Result<PushAck, GatewayError>;
    async fn update_clearance_status(
        &self,
        clearance_id: &str,
        status: &str,
        remarks: Option<&str>,
    ) -> Result<(), GatewayError>;
    async fn fetch_students(&self) -> Result<Vec<PhpStudentRecord>, GatewayError>;
    async fn fetch_clearances(
        &self,
        student_id: &str,
    ) -> Result<Vec<PhpClearanceRecord>, GatewayError>;
    async fn health(&self) -> Result<(), GatewayError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct StudentAck {
    #[serde(default)]
    php_student_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClearanceAck {
    #[serde(default)]
    php_clearance_id: Option<String>,
}

/// `reqwest` implementation authenticated with the key/secret header pair.
#[derive(Debug, Clone)]
pub struct HttpExternalSystem {
    config: ExternalSyncConfig,
    http: Client,
}

impl HttpExternalSystem {
    pub fn new(config: ExternalSyncConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent("clearme-system/1.0")
            .build()?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-API-Key", &self.config.api_key)
            .header("X-API-Secret", &self.config.api_secret)
    }

    async fn read<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, GatewayError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::UnexpectedResponse { status, body });
        }
        let envelope: Envelope<T> = response.json().await?;
        if !envelope.success {
            return Err(GatewayError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| "request was not accepted".to_string()),
            ));
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl ExternalSystem for HttpExternalSystem {
    async fn push_student(&self, record: &PhpStudentRecord) -> Result<PushAck, GatewayError> {
        let response = self
            .authorized(self.http.post(self.url("/api/students")))
            .json(&json!({
                "student": record,
                "sync_source": SYNC_SOURCE,
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .send()
            .await?;
        let ack: Option<StudentAck> = Self::read(response).await?;
        Ok(PushAck {
            external_id: ack
                .and_then(|ack| ack.php_student_id)
                .unwrap_or_else(|| record.student_id.clone()),
        })
    }

    async fn push_clearance(
        &self,
        student_id: &str,
        record: &PhpClearanceRecord,
    ) -> Result<PushAck, GatewayError> {
        let response = self
            .authorized(self.http.post(self.url("/api/clearances")))
            .json(&json!({
                "student_id": student_id,
                "clearance": record,
                "sync_source": SYNC_SOURCE,
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .send()
            .await?;
        let ack: Option<ClearanceAck> = Self::read(response).await?;
        Ok(PushAck {
            external_id: ack
                .and_then(|ack| ack.php_clearance_id)
                .unwrap_or_else(|| record.clearance_id.clone()),
        })
    }

    async fn update_clearance_status(
        &self,
        clearance_id: &str,
        status: &str,
        remarks: Option<&str>,
    ) -> Result<(), GatewayError> {
        let response = self
            .authorized(
                self.http
                    .put(self.url(&format!("/api/clearances/{clearance_id}"))),
            )
            .json(&json!({
                "status": status,
                "remarks": remarks,
                "sync_source": SYNC_SOURCE,
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .send()
            .await?;
        Self::read::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn fetch_students(&self) -> Result<Vec<PhpStudentRecord>, GatewayError> {
        let response = self
            .authorized(self.http.get(self.url("/api/students")))
            .send()
            .await?;
        Ok(Self::read(response).await?.unwrap_or_default())
    }

    async fn fetch_clearances(
        &self,
        student_id: &str,
    ) -> Result<Vec<PhpClearanceRecord>, GatewayError> {
        let response = self
            .authorized(self.http.get(self.url("/api/clearances")))
            .query(&[("student_id", student_id)])
            .send()
            .await?;
        Ok(Self::read(response).await?.unwrap_or_default())
    }

    async fn health(&self) -> Result<(), GatewayError> {
        let response = self
            .authorized(self.http.get(self.url("/api/health")))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(GatewayError::UnexpectedResponse { status, body })
        }
    }
}
