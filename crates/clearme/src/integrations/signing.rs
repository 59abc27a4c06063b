//! Multi-party signing provider (BlueInk) client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::SigningConfig;
use crate::workflows::clearance::signature::BundleSigner;

const BUNDLE_EXPIRY_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleParty {
    pub name: String,
    pub email: String,
    pub signing_order: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    pub label: String,
    pub document_name: String,
    pub document_url: String,
    pub student_id: String,
    pub department_id: String,
    pub clearance_item_id: String,
    pub parties: Vec<BundleParty>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotSigner {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "order")]
    pub signing_order: u8,
    #[serde(default, alias = "completed_at")]
    pub signed_at: Option<DateTime<Utc>>,
}

/// Provider view of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BundleSnapshot {
    #[serde(alias = "id")]
    pub bundle_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "packets")]
    pub signers: Vec<SnapshotSigner>,
    #[serde(default, alias = "signer_download_link")]
    pub download_url: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BundleSnapshot {
    pub fn signers_as_bundle(&self) -> Vec<BundleSigner> {
        self.signers
            .iter()
            .enumerate()
            .map(|(index, signer)| BundleSigner {
                name: signer.name.clone(),
                email: signer.email.clone(),
                signing_order: if signer.signing_order == 0 {
                    index as u8 + 1
                } else {
                    signer.signing_order
                },
                signed_at: signer.signed_at,
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("signing provider http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("signing provider returned {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },
}

#[async_trait]
pub trait SigningProvider: Send + Sync {
    async fn create_bundle(&self, request: BundleRequest) -> Result<BundleSnapshot, SigningError>;
    async fn get_bundle(&self, bundle_id: &str) -> Result<BundleSnapshot, SigningError>;
}

/// REST client for the BlueInk v2 bundles API.
#[derive(Debug, Clone)]
pub struct BlueinkClient {
    config: SigningConfig,
    http: Client,
}

impl BlueinkClient {
    pub fn new(config: SigningConfig, timeout: Duration) -> Result<Self, SigningError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("clearme-system/1.0")
            .build()?;
        Ok(Self { config, http })
    }

    fn bundle_body(&self, request: &BundleRequest) -> serde_json::Value {
        let packets: Vec<serde_json::Value> = request
            .parties
            .iter()
            .map(|party| {
                json!({
                    "name": party.name,
                    "email": party.email,
                    "key": format!("signer-{}", party.signing_order),
                    "order": party.signing_order,
                    "auth_sms": false,
                    "auth_selfie": false,
                    "auth_id": false,
                    "deliver_via": "email",
                })
            })
            .collect();

        json!({
            "label": request.label,
            "email_subject": request.label,
            "email_message": "Please review and sign the student clearance form.",
            "is_test": false,
            "expires_in_days": BUNDLE_EXPIRY_DAYS,
            "packets": packets,
            "documents": [{
                "key": "clearance-form",
                "file_url": request.document_url,
                "file_name": request.document_name,
            }],
            "custom_key": request.clearance_item_id,
            "tags": ["clearance", request.department_id, request.student_id],
            "webhook_url": self.config.webhook_url,
        })
    }

    async fn read_snapshot(response: reqwest::Response) -> Result<BundleSnapshot, SigningError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SigningError::UnexpectedResponse { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SigningProvider for BlueinkClient {
    async fn create_bundle(&self, request: BundleRequest) -> Result<BundleSnapshot, SigningError> {
        let url = format!("{}/bundles/", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Token {}", self.config.api_key))
            .json(&self.bundle_body(&request))
            .send()
            .await?;
        Self::read_snapshot(response).await
    }

    async fn get_bundle(&self, bundle_id: &str) -> Result<BundleSnapshot, SigningError> {
        let url = format!("{}/bundles/{}/", self.config.base_url, bundle_id);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Token {}", self.config.api_key))
            .send()
            .await?;
        Self::read_snapshot(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BlueinkClient {
        BlueinkClient::new(
            SigningConfig {
                base_url: "https://signing.test/api/v2".to_string(),
                api_key: "key".to_string(),
                webhook_url: "http://localhost:3000/api/v1/external-signing/webhook".to_string(),
            },
            Duration::from_secs(5),
        )
        .expect("client builds")
    }

    #[test]
    fn bundle_body_orders_student_before_officer() {
        let request = BundleRequest {
            label: "Juan Dela Cruz Clearance - Library".to_string(),
            document_name: "Juan_Dela_Cruz_Clearance_Library.pdf".to_string(),
            document_url: "http://localhost:3000/doc".to_string(),
            student_id: "2024-001".to_string(),
            department_id: "library".to_string(),
            clearance_item_id: "clr-2024-001-library".to_string(),
            parties: vec![
                BundleParty {
                    name: "Juan Dela Cruz".to_string(),
                    email: "juan@student.test".to_string(),
                    signing_order: 1,
                },
                BundleParty {
                    name: "Mr. Jose Dela Cruz".to_string(),
                    email: "jose@school.test".to_string(),
                    signing_order: 2,
                },
            ],
        };

        let body = client().bundle_body(&request);
        assert_eq!(body["packets"][0]["email"], "juan@student.test");
        assert_eq!(body["packets"][1]["order"], 2);
        assert_eq!(body["expires_in_days"], 30);
        assert_eq!(body["custom_key"], "clr-2024-001-library");
    }

    #[test]
    fn snapshot_fills_missing_signing_order() {
        let snapshot: BundleSnapshot = serde_json::from_value(json!({
            "id": "bndl-1",
            "status": "se",
            "packets": [
                {"name": "A", "email": "a@test"},
                {"name": "B", "email": "b@test", "completed_at": "2025-01-15T10:00:00Z"}
            ]
        }))
        .expect("snapshot parses");

        let signers = snapshot.signers_as_bundle();
        assert_eq!(signers[0].signing_order, 1);
        assert_eq!(signers[1].signing_order, 2);
        assert!(signers[1].signed_at.is_some());
    }
}
