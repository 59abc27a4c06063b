use serde::Serialize;

use super::domain::{
    ClearanceItem, ClearanceItemId, DepartmentClearance, DepartmentId, Student, StudentId,
};

/// Storage abstraction so the approval engine can be exercised in isolation.
///
/// `replace_item` is the only way to mutate an item and carries the version the caller
/// read; a store must refuse the write when the stored version differs.
pub trait ClearanceStore: Send + Sync {
    fn insert_student(&self, student: Student) -> Result<Student, RepositoryError>;
    fn update_student(&self, student: Student) -> Result<(), RepositoryError>;
    fn fetch_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError>;
    fn find_student_by_token(&self, token: &str) -> Result<Option<Student>, RepositoryError>;
    fn students(&self) -> Result<Vec<Student>, RepositoryError>;

    /// Insert a batch atomically; fails with `Conflict` if any (student, department)
    /// pair already has an item, leaving the store untouched.
    fn insert_items(&self, items: Vec<ClearanceItem>) -> Result<(), RepositoryError>;
    fn fetch_item(&self, id: &ClearanceItemId) -> Result<Option<ClearanceItem>, RepositoryError>;
    fn items_for_student(&self, id: &StudentId) -> Result<Vec<ClearanceItem>, RepositoryError>;
    fn items_for_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Vec<ClearanceItem>, RepositoryError>;

    /// Compare-and-swap on the item version. The stored copy gets `expected_version + 1`.
    fn replace_item(
        &self,
        item: ClearanceItem,
        expected_version: u64,
    ) -> Result<ClearanceItem, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record was modified concurrently (expected version {expected}, found {found})")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Committed state change handed to outbound hooks after the write succeeded.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClearanceEvent {
    Submitted {
        student: Student,
        items: Vec<DepartmentClearance>,
    },
    Decided {
        student: Student,
        entry: DepartmentClearance,
    },
}

/// Outbound hook (e.g. the student-records sync). Failures are reported, never
/// propagated into the transition that produced the event.
pub trait DecisionNotifier: Send + Sync {
    fn publish(&self, event: ClearanceEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Notifier used when no outbound integration is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl DecisionNotifier for SilentNotifier {
    fn publish(&self, _event: ClearanceEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}
