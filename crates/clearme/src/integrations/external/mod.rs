//! Bidirectional sync with the student-records backend.

mod client;
pub mod mapping;
mod service;

pub use client::{ExternalSystem, GatewayError, HttpExternalSystem, PushAck};
pub use service::{
    apply_inbound, InboundOutcome, SyncError, SyncNotifier, SyncService, SyncSummary,
    SyncWebhook,
};
