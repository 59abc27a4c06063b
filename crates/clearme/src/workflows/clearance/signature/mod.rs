//! Officer signatures: inline images and externally collected signing bundles.
//!
//! Both variants sit behind the same `is_complete` / `applies_to` contract so the approval
//! engine never branches on how a signature was captured.

mod binding;
mod memory;
pub mod upload;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ClearanceItem, ClearanceItemId, DepartmentId, SignatureId, SignatureKind, SignatureRef,
};
use super::repository::RepositoryError;

pub use binding::{
    BundleEvent, ExternalBundleRequest, InlineUpload, SignatureBinding, SignatureError,
    SignatureSource, SignatureStatus, SignerStatus,
};
pub use memory::InMemorySignatureStore;
pub use upload::{DecodedImage, UploadError, MAX_SIGNATURE_BYTES};

/// Where the signature image lands on the printed form, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            x: 50.0,
            y: 100.0,
            width: 200.0,
            height: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Styling {
    pub opacity: f32,
    pub rotation: f32,
    pub border_width: f32,
}

impl Default for Styling {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            rotation: 0.0,
            border_width: 0.0,
        }
    }
}

/// Validated image payload. `data_uri` is kept for rendering; never log it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureImage {
    pub media_type: String,
    pub data_uri: String,
    pub byte_len: usize,
}

impl std::fmt::Debug for SignatureImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureImage")
            .field("media_type", &self.media_type)
            .field("byte_len", &self.byte_len)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineSignature {
    pub id: SignatureId,
    pub department_id: DepartmentId,
    pub officer_name: String,
    pub image: SignatureImage,
    pub notes: Option<String>,
    pub placement: Placement,
    pub styling: Styling,
    pub uploaded_at: DateTime<Utc>,
    pub version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    Pending,
    InProgress,
    Complete,
    Cancelled,
}

impl BundleStatus {
    /// Maps provider status strings; unknown values are treated as still pending.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "co" | "complete" | "completed" | "bundle.completed" => Self::Complete,
            "st" | "sg" | "started" | "signing" | "in_progress" => Self::InProgress,
            "ca" | "cancelled" | "canceled" | "ex" | "expired" | "fa" | "failed" => {
                Self::Cancelled
            }
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSigner {
    pub name: String,
    pub email: String,
    pub signing_order: u8,
    pub signed_at: Option<DateTime<Utc>>,
}

/// Multi-party signing bundle hosted by the external provider, scoped to one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSignature {
    pub id: SignatureId,
    pub department_id: DepartmentId,
    pub bundle_id: String,
    pub clearance_item_id: ClearanceItemId,
    pub officer_name: String,
    pub signers: Vec<BundleSigner>,
    pub status: BundleStatus,
    pub download_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub version: u32,
}

impl BundleSignature {
    fn all_signed(&self) -> bool {
        !self.signers.is_empty() && self.signers.iter().all(|s| s.signed_at.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signature {
    Inline(InlineSignature),
    ExternalBundle(BundleSignature),
}

impl Signature {
    pub fn id(&self) -> &SignatureId {
        match self {
            Signature::Inline(inline) => &inline.id,
            Signature::ExternalBundle(bundle) => &bundle.id,
        }
    }

    pub fn department_id(&self) -> &DepartmentId {
        match self {
            Signature::Inline(inline) => &inline.department_id,
            Signature::ExternalBundle(bundle) => &bundle.department_id,
        }
    }

    pub fn officer_name(&self) -> &str {
        match self {
            Signature::Inline(inline) => &inline.officer_name,
            Signature::ExternalBundle(bundle) => &bundle.officer_name,
        }
    }

    pub fn kind(&self) -> SignatureKind {
        match self {
            Signature::Inline(_) => SignatureKind::Inline,
            Signature::ExternalBundle(_) => SignatureKind::ExternalBundle,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Signature::Inline(inline) => inline.version,
            Signature::ExternalBundle(bundle) => bundle.version,
        }
    }

    pub(crate) fn set_version(&mut self, version: u32) {
        match self {
            Signature::Inline(inline) => inline.version = version,
            Signature::ExternalBundle(bundle) => bundle.version = version,
        }
    }

    /// Inline images are complete on upload; bundles once every signer has signed or the
    /// provider reports completion.
    pub fn is_complete(&self) -> bool {
        match self {
            Signature::Inline(_) => true,
            Signature::ExternalBundle(bundle) => match bundle.status {
                BundleStatus::Complete => true,
                BundleStatus::Cancelled => false,
                BundleStatus::Pending | BundleStatus::InProgress => bundle.all_signed(),
            },
        }
    }

    /// Inline signatures cover every item of their department; a bundle covers the one
    /// item it was created for.
    pub fn applies_to(&self, item: &ClearanceItem) -> bool {
        match self {
            Signature::Inline(inline) => inline.department_id == item.department_id,
            Signature::ExternalBundle(bundle) => {
                bundle.department_id == item.department_id && bundle.clearance_item_id == item.id
            }
        }
    }

    pub fn reference(&self) -> SignatureRef {
        SignatureRef {
            signature_id: self.id().clone(),
            kind: self.kind(),
            officer_name: self.officer_name().to_string(),
            version: self.version(),
        }
    }
}

/// Append-only per-department signature history.
pub trait SignatureStore: Send + Sync {
    /// Store a new signature, assigning the next version for its department.
    fn append(&self, signature: Signature) -> Result<Signature, RepositoryError>;
    fn fetch(&self, id: &SignatureId) -> Result<Option<Signature>, RepositoryError>;
    /// Department history, oldest version first.
    fn history(&self, department: &DepartmentId) -> Result<Vec<Signature>, RepositoryError>;
    fn all(&self) -> Result<Vec<Signature>, RepositoryError>;
    fn find_bundle(&self, bundle_id: &str) -> Result<Option<Signature>, RepositoryError>;
    /// Overwrite bundle progress in place; version and id are preserved.
    fn replace(&self, signature: Signature) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ApprovalSignatureError {
    #[error("no signature on file for department '{0}'")]
    Missing(DepartmentId),
    #[error("signature '{0}' is not complete yet")]
    NotReady(SignatureId),
    #[error("signature '{0}' has been superseded by a newer upload")]
    Superseded(SignatureId),
    #[error("clearance item '{0}' is already signed")]
    AlreadySigned(ClearanceItemId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Pick the signature an approval of `item` must carry.
///
/// With an explicit id the signature must belong to the item's department, be the
/// current inline upload (or a bundle for this item) and be complete. Without one, the
/// newest complete signature that applies wins.
pub fn resolve_for_approval(
    store: &dyn SignatureStore,
    item: &ClearanceItem,
    requested: Option<&SignatureId>,
) -> Result<Signature, ApprovalSignatureError> {
    let history = store.history(&item.department_id)?;
    let candidates: Vec<&Signature> = history.iter().filter(|s| s.applies_to(item)).collect();
    let current_inline = history
        .iter()
        .rev()
        .find(|s| matches!(s, Signature::Inline(_)))
        .map(Signature::id);

    if let Some(id) = requested {
        let signature = candidates
            .iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| ApprovalSignatureError::Missing(item.department_id.clone()))?;
        if matches!(signature, Signature::Inline(_)) && current_inline != Some(id) {
            return Err(ApprovalSignatureError::Superseded(id.clone()));
        }
        if !signature.is_complete() {
            return Err(ApprovalSignatureError::NotReady(id.clone()));
        }
        return Ok((*signature).clone());
    }

    if candidates.is_empty() {
        return Err(ApprovalSignatureError::Missing(item.department_id.clone()));
    }

    let usable = candidates.iter().rev().find(|s| {
        s.is_complete()
            && match s {
                Signature::Inline(_) => current_inline == Some(s.id()),
                Signature::ExternalBundle(_) => true,
            }
    });

    match usable {
        Some(signature) => Ok((*signature).clone()),
        None => {
            let newest = candidates[candidates.len() - 1];
            Err(ApprovalSignatureError::NotReady(newest.id().clone()))
        }
    }
}

/// Stamp `signature` onto `item`. Re-applying the same signature is a no-op; an item that
/// already carries a different signature keeps it.
pub fn apply(
    signature: &Signature,
    item: &mut ClearanceItem,
) -> Result<bool, ApprovalSignatureError> {
    if let Some(existing) = &item.signature {
        if &existing.signature_id == signature.id() {
            return Ok(false);
        }
        return Err(ApprovalSignatureError::AlreadySigned(item.id.clone()));
    }
    if !signature.applies_to(item) {
        return Err(ApprovalSignatureError::Missing(item.department_id.clone()));
    }
    if !signature.is_complete() {
        return Err(ApprovalSignatureError::NotReady(signature.id().clone()));
    }
    item.signature = Some(signature.reference());
    Ok(true)
}
