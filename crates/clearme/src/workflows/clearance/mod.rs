//! Multi-department clearance approval.
//!
//! The [`ApprovalEngine`] owns every transition rule; routers, the signature binding and
//! the external sync all go through it.

pub mod access;
pub mod document;
pub mod domain;
pub mod engine;
pub mod memory;
pub mod registry;
pub mod repository;
pub mod response;
pub mod router;
pub mod services;
pub mod signature;
pub mod stats;

#[cfg(test)]
mod tests;

pub use access::{AccessError, AccessLinks, GeneratedLink, LinkBatch, LinkDispatcher};
pub use document::{ClearanceDocument, DocumentBundle, InstitutionProfile, SignatureSlot};
pub use domain::{
    AccessToken, ClearanceAggregate, ClearanceItem, ClearanceItemId, ClearanceProgress,
    ClearanceStatus, ClearanceSummary, DepartmentClearance, DepartmentId, OverallStatus,
    PaymentStatus, SignatureId, SignatureKind, SignatureRef, Student, StudentId, StudentProfile,
};
pub use engine::{
    ApprovalEngine, BulkDecision, BulkItemOutcome, BulkOutcome, ClearanceError, ClearanceQuery,
    DecisionAction, DecisionRequest, QueueEntry,
};
pub use memory::InMemoryClearanceStore;
pub use registry::{Department, DepartmentRegistry, DepartmentUpdate, RegistryError};
pub use repository::{
    ClearanceEvent, ClearanceStore, DecisionNotifier, NotifyError, RepositoryError,
    SilentNotifier,
};
pub use router::clearance_router;
pub use services::{ClearanceServices, Integrations};
pub use signature::{
    InMemorySignatureStore, InlineUpload, Signature, SignatureBinding, SignatureError,
    SignatureStore,
};
pub use stats::{ClearanceStatistics, ExportError};
