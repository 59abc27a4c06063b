//! Out-of-process collaborators: the student-records backend and the signing provider.
//!
//! Nothing here decides a clearance item. Inbound events are routed through the
//! approval engine and outbound pushes only ever observe committed state.

pub mod external;
pub mod router;
pub mod signing;
pub mod sync_log;
pub mod webhook;

pub use external::{ExternalSystem, HttpExternalSystem, SyncError, SyncNotifier, SyncService};
pub use router::integration_router;
pub use signing::{BlueinkClient, SigningError, SigningProvider};
pub use sync_log::{BoundedSyncLog, SyncLogEntry, SyncLogFilter, SyncLogStore};
pub use webhook::{WebhookError, WebhookVerifier};
