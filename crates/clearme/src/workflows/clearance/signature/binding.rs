use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::upload::{decode_data_uri, UploadError};
use super::{
    BundleSignature, BundleSigner, BundleStatus, InlineSignature, Placement, Signature,
    SignatureImage, SignatureStore, Styling,
};
use crate::integrations::signing::{BundleParty, BundleRequest, SigningError, SigningProvider};
use crate::workflows::clearance::domain::{
    ClearanceItem, DepartmentId, SignatureId, SignatureKind, Student,
};
use crate::workflows::clearance::registry::Department;
use crate::workflows::clearance::repository::RepositoryError;

static SIGNATURE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_signature_id() -> SignatureId {
    let id = SIGNATURE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SignatureId(format!("sig-{id:06}"))
}

/// Body of `POST /signatures/upload`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineUpload {
    #[serde(default)]
    pub department_id: String,
    #[serde(default)]
    pub image_data: String,
    #[serde(default)]
    pub officer_name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "coordinates")]
    pub placement: Option<Placement>,
    #[serde(default)]
    pub styling: Option<Styling>,
}

/// Request to collect signatures for one item through the external provider.
#[derive(Debug, Clone)]
pub struct ExternalBundleRequest {
    pub item: ClearanceItem,
    pub student: Student,
    pub department: Department,
    pub document_url: String,
}

#[derive(Debug, Clone)]
pub enum SignatureSource {
    Inline(InlineUpload),
    ExternalBundle(ExternalBundleRequest),
}

/// Provider callback payload, already authenticated by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEvent {
    pub bundle_id: String,
    #[serde(default, alias = "event")]
    pub event_type: String,
    #[serde(default)]
    pub signer_email: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerStatus {
    pub name: String,
    pub email: String,
    pub signing_order: u8,
    pub signed: bool,
    pub signed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub signature_id: SignatureId,
    pub department_id: DepartmentId,
    pub kind: SignatureKind,
    pub bundle_id: Option<String>,
    pub is_complete: bool,
    pub signers: Vec<SignerStatus>,
    pub download_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("signature or bundle '{0}' not found")]
    NotFound(String),
    #[error("department '{0}' not found")]
    UnknownDepartment(DepartmentId),
    #[error("external signing is not configured")]
    NotConfigured,
    #[error(transparent)]
    Provider(#[from] SigningError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Binds officer signatures to departments and tracks external bundle progress.
pub struct SignatureBinding {
    store: Arc<dyn SignatureStore>,
    provider: Option<Arc<dyn SigningProvider>>,
}

impl SignatureBinding {
    pub fn new(
        store: Arc<dyn SignatureStore>,
        provider: Option<Arc<dyn SigningProvider>>,
    ) -> Self {
        Self { store, provider }
    }

    pub fn store(&self) -> &Arc<dyn SignatureStore> {
        &self.store
    }

    pub fn external_signing_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn bind(
        &self,
        source: SignatureSource,
        now: DateTime<Utc>,
    ) -> Result<Signature, SignatureError> {
        match source {
            SignatureSource::Inline(upload) => self.bind_inline(upload, now),
            SignatureSource::ExternalBundle(request) => self.bind_external(request, now).await,
        }
    }

    /// Store a new image signature. It becomes the department's current signature for
    /// future approvals; already signed items keep their earlier reference.
    pub fn bind_inline(
        &self,
        upload: InlineUpload,
        now: DateTime<Utc>,
    ) -> Result<Signature, SignatureError> {
        if upload.department_id.trim().is_empty()
            || upload.image_data.trim().is_empty()
            || upload.officer_name.trim().is_empty()
        {
            return Err(SignatureError::Validation(
                "departmentId, imageData and officerName are required".to_string(),
            ));
        }

        let decoded = decode_data_uri(&upload.image_data)?;
        let signature = Signature::Inline(InlineSignature {
            id: next_signature_id(),
            department_id: DepartmentId(upload.department_id.trim().to_string()),
            officer_name: upload.officer_name.trim().to_string(),
            image: SignatureImage {
                media_type: decoded.media_type.essence_str().to_string(),
                data_uri: upload.image_data.trim().to_string(),
                byte_len: decoded.bytes.len(),
            },
            notes: upload.notes.filter(|n| !n.trim().is_empty()),
            placement: upload.placement.unwrap_or_default(),
            styling: upload.styling.unwrap_or_default(),
            uploaded_at: now,
            version: 0,
        });

        let stored = self.store.append(signature)?;
        info!(
            signature_id = %stored.id(),
            department_id = %stored.department_id(),
            version = stored.version(),
            bytes = decoded.bytes.len(),
            "signature image bound"
        );
        Ok(stored)
    }

    /// Create a provider bundle where the student signs first and the officer second.
    pub async fn bind_external(
        &self,
        request: ExternalBundleRequest,
        now: DateTime<Utc>,
    ) -> Result<Signature, SignatureError> {
        let provider = self.provider.as_ref().ok_or(SignatureError::NotConfigured)?;
        if request.student.email.trim().is_empty() {
            return Err(SignatureError::Validation(
                "student email is required for external signing".to_string(),
            ));
        }

        let parties = vec![
            BundleParty {
                name: request.student.full_name.clone(),
                email: request.student.email.clone(),
                signing_order: 1,
            },
            BundleParty {
                name: request.department.officer_name.clone(),
                email: request.department.officer_email.clone(),
                signing_order: 2,
            },
        ];
        let bundle_request = BundleRequest {
            label: format!(
                "{} Clearance - {}",
                request.student.full_name, request.department.name
            ),
            document_name: format!(
                "{}_Clearance_{}.pdf",
                request.student.full_name.replace(' ', "_"),
                request.department.name
            ),
            document_url: request.document_url.clone(),
            student_id: request.student.id.0.clone(),
            department_id: request.department.id.0.clone(),
            clearance_item_id: request.item.id.0.clone(),
            parties: parties.clone(),
        };

        let snapshot = provider.create_bundle(bundle_request).await?;
        let signers = if snapshot.signers.is_empty() {
            parties
                .into_iter()
                .map(|party| BundleSigner {
                    name: party.name,
                    email: party.email,
                    signing_order: party.signing_order,
                    signed_at: None,
                })
                .collect()
        } else {
            snapshot.signers_as_bundle()
        };

        let signature = Signature::ExternalBundle(BundleSignature {
            id: next_signature_id(),
            department_id: request.department.id.clone(),
            bundle_id: snapshot.bundle_id.clone(),
            clearance_item_id: request.item.id.clone(),
            officer_name: request.department.officer_name.clone(),
            signers,
            status: BundleStatus::from_provider(&snapshot.status),
            download_url: snapshot.download_url.clone(),
            created_at: now,
            version: 0,
        });

        let stored = self.store.append(signature)?;
        info!(
            signature_id = %stored.id(),
            bundle_id = %snapshot.bundle_id,
            item_id = %request.item.id,
            "signing bundle created"
        );
        Ok(stored)
    }

    /// Completion state by signature id or provider bundle id.
    pub fn status(&self, id: &str) -> Result<SignatureStatus, SignatureError> {
        let signature = match self.store.fetch(&SignatureId(id.to_string()))? {
            Some(signature) => signature,
            None => self
                .store
                .find_bundle(id)?
                .ok_or_else(|| SignatureError::NotFound(id.to_string()))?,
        };
        Ok(status_of(&signature))
    }

    /// Pull the latest bundle state from the provider and persist it.
    pub async fn refresh_bundle(&self, bundle_id: &str) -> Result<Signature, SignatureError> {
        let provider = self.provider.as_ref().ok_or(SignatureError::NotConfigured)?;
        let mut signature = self
            .store
            .find_bundle(bundle_id)?
            .ok_or_else(|| SignatureError::NotFound(bundle_id.to_string()))?;

        let snapshot = provider.get_bundle(bundle_id).await?;
        if let Signature::ExternalBundle(bundle) = &mut signature {
            bundle.status = BundleStatus::from_provider(&snapshot.status);
            if !snapshot.signers.is_empty() {
                bundle.signers = snapshot.signers_as_bundle();
            }
            if snapshot.download_url.is_some() {
                bundle.download_url = snapshot.download_url.clone();
            }
        }

        self.store.replace(signature.clone())?;
        Ok(signature)
    }

    /// Apply an authenticated provider callback to the stored bundle.
    pub fn record_bundle_event(
        &self,
        event: BundleEvent,
        now: DateTime<Utc>,
    ) -> Result<Signature, SignatureError> {
        let mut signature = self
            .store
            .find_bundle(&event.bundle_id)?
            .ok_or_else(|| SignatureError::NotFound(event.bundle_id.clone()))?;

        if let Signature::ExternalBundle(bundle) = &mut signature {
            if let Some(email) = event.signer_email.as_deref() {
                for signer in bundle
                    .signers
                    .iter_mut()
                    .filter(|s| s.email.eq_ignore_ascii_case(email))
                {
                    if signer.signed_at.is_none() {
                        signer.signed_at = Some(event.signed_at.unwrap_or(now));
                    }
                }
            }
            if let Some(status) = event.status.as_deref() {
                bundle.status = BundleStatus::from_provider(status);
            }
            if event.event_type == "bundle.completed" {
                bundle.status = BundleStatus::Complete;
            }
        }

        self.store.replace(signature.clone())?;
        info!(
            bundle_id = %event.bundle_id,
            event = %event.event_type,
            complete = signature.is_complete(),
            "signing bundle event recorded"
        );
        Ok(signature)
    }

    /// Latest inline upload for the department, used for future approvals.
    pub fn current_for(
        &self,
        department: &DepartmentId,
    ) -> Result<Option<Signature>, SignatureError> {
        Ok(self
            .store
            .history(department)?
            .into_iter()
            .rev()
            .find(|s| matches!(s, Signature::Inline(_))))
    }

    pub fn history(&self, department: &DepartmentId) -> Result<Vec<Signature>, SignatureError> {
        Ok(self.store.history(department)?)
    }

    pub fn fetch(&self, id: &SignatureId) -> Result<Option<Signature>, SignatureError> {
        Ok(self.store.fetch(id)?)
    }
}

fn status_of(signature: &Signature) -> SignatureStatus {
    let (bundle_id, signers, download_url) = match signature {
        Signature::Inline(inline) => (
            None,
            vec![SignerStatus {
                name: inline.officer_name.clone(),
                email: String::new(),
                signing_order: 1,
                signed: true,
                signed_at: Some(inline.uploaded_at),
            }],
            None,
        ),
        Signature::ExternalBundle(bundle) => (
            Some(bundle.bundle_id.clone()),
            bundle
                .signers
                .iter()
                .map(|s| SignerStatus {
                    name: s.name.clone(),
                    email: s.email.clone(),
                    signing_order: s.signing_order,
                    signed: s.signed_at.is_some(),
                    signed_at: s.signed_at,
                })
                .collect(),
            bundle.download_url.clone(),
        ),
    };

    SignatureStatus {
        signature_id: signature.id().clone(),
        department_id: signature.department_id().clone(),
        kind: signature.kind(),
        bundle_id,
        is_complete: signature.is_complete(),
        signers,
        download_url,
    }
}
