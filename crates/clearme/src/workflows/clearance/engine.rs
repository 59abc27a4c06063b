use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    ClearanceAggregate, ClearanceItem, ClearanceItemId, ClearanceProgress, ClearanceStatus,
    ClearanceSummary, DepartmentClearance, DepartmentId, OverallStatus, PaymentStatus,
    SignatureId, Student, StudentId, StudentProfile,
};
use super::registry::{Department, DepartmentRegistry, DepartmentUpdate, RegistryError};
use super::repository::{ClearanceEvent, ClearanceStore, DecisionNotifier, RepositoryError};
use super::signature::{self, ApprovalSignatureError, Signature, SignatureStore};

/// Officer verdict for a pending item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Approve,
    Reject,
    RequirePayment { amount: u64 },
}

impl DecisionAction {
    pub const fn target_status(self) -> ClearanceStatus {
        match self {
            DecisionAction::Approve => ClearanceStatus::Approved,
            DecisionAction::Reject => ClearanceStatus::Rejected,
            DecisionAction::RequirePayment { .. } => ClearanceStatus::RequiresPayment,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub action: DecisionAction,
    pub officer_name: Option<String>,
    pub signature_id: Option<SignatureId>,
    pub remarks: Option<String>,
    /// When set, the write only happens if the item is still at this version.
    pub expected_version: Option<u64>,
}

impl DecisionRequest {
    pub fn new(action: DecisionAction) -> Self {
        Self {
            action,
            officer_name: None,
            signature_id: None,
            remarks: None,
            expected_version: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkDecision {
    pub student_ids: Vec<StudentId>,
    pub action: DecisionAction,
    pub officer_name: Option<String>,
    pub signature_id: Option<SignatureId>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BulkItemOutcome {
    Decided { item: Box<DepartmentClearance> },
    Skipped { status: ClearanceStatus },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemResult {
    pub student_id: StudentId,
    #[serde(flatten)]
    pub outcome: BulkItemOutcome,
}

/// Per-student report of a bulk decision; nothing is dropped silently.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub department_id: DepartmentId,
    pub decided_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub results: Vec<BulkItemResult>,
}

/// Filters for the clearance listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "departmentId")]
    pub department: Option<String>,
}

/// Entry in a department officer's work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub student_id: StudentId,
    pub student_name: String,
    pub program: String,
    pub year_level: String,
    pub section: String,
    pub item: ClearanceItem,
}

#[derive(Debug, thiserror::Error)]
pub enum ClearanceError {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("clearance item '{item_id}' is {status}; only pending items can be decided")]
    InvalidState {
        item_id: ClearanceItemId,
        status: ClearanceStatus,
    },
    #[error("clearance already submitted for student '{0}'")]
    AlreadySubmitted(StudentId),
    #[error("{0}")]
    Conflict(String),
    #[error("no signature on file for department '{0}'")]
    SignatureMissing(DepartmentId),
    #[error("signature '{0}' is not complete yet")]
    NotReady(SignatureId),
    #[error("signature '{0}' has been superseded by a newer upload")]
    SignatureSuperseded(SignatureId),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<ApprovalSignatureError> for ClearanceError {
    fn from(error: ApprovalSignatureError) -> Self {
        match error {
            ApprovalSignatureError::Missing(department) => Self::SignatureMissing(department),
            ApprovalSignatureError::NotReady(id) => Self::NotReady(id),
            ApprovalSignatureError::Superseded(id) => Self::SignatureSuperseded(id),
            ApprovalSignatureError::AlreadySigned(item) => {
                Self::Conflict(format!("clearance item '{item}' is already signed"))
            }
            ApprovalSignatureError::Repository(error) => Self::Repository(error),
        }
    }
}

fn write_conflict(error: RepositoryError) -> ClearanceError {
    match error {
        RepositoryError::VersionMismatch { expected, found } => ClearanceError::Conflict(format!(
            "clearance item changed concurrently (expected version {expected}, found {found})"
        )),
        RepositoryError::Conflict => {
            ClearanceError::Conflict("clearance item changed concurrently".to_string())
        }
        other => ClearanceError::Repository(other),
    }
}

/// Transition rules for clearance items plus department administration.
///
/// Every precondition (pending state, signature on file, positive payment amount,
/// expected version) is checked here, not by callers.
pub struct ApprovalEngine {
    store: Arc<dyn ClearanceStore>,
    signatures: Arc<dyn SignatureStore>,
    notifier: Arc<dyn DecisionNotifier>,
    registry: RwLock<DepartmentRegistry>,
}

impl ApprovalEngine {
    pub fn new(
        store: Arc<dyn ClearanceStore>,
        signatures: Arc<dyn SignatureStore>,
        notifier: Arc<dyn DecisionNotifier>,
        registry: DepartmentRegistry,
    ) -> Self {
        Self {
            store,
            signatures,
            notifier,
            registry: RwLock::new(registry),
        }
    }

    fn registry(&self) -> Result<RwLockReadGuard<'_, DepartmentRegistry>, ClearanceError> {
        self.registry.read().map_err(|_| {
            RepositoryError::Unavailable("department registry lock poisoned".to_string()).into()
        })
    }

    fn registry_mut(&self) -> Result<RwLockWriteGuard<'_, DepartmentRegistry>, ClearanceError> {
        self.registry.write().map_err(|_| {
            RepositoryError::Unavailable("department registry lock poisoned".to_string()).into()
        })
    }

    fn notify(&self, event: ClearanceEvent) {
        if let Err(error) = self.notifier.publish(event) {
            warn!(%error, "clearance event notification failed");
        }
    }

    // ----- departments -------------------------------------------------------------

    pub fn departments(&self) -> Result<Vec<Department>, ClearanceError> {
        Ok(self.registry()?.list().to_vec())
    }

    pub fn active_departments(&self) -> Result<Vec<Department>, ClearanceError> {
        Ok(self.registry()?.active().cloned().collect())
    }

    pub fn department(&self, id: &DepartmentId) -> Result<Department, ClearanceError> {
        Ok(self.registry()?.get(id)?.clone())
    }

    /// Register a department. An active department gets a pending item for every
    /// student who already submitted.
    pub fn add_department(
        &self,
        department: Department,
        now: DateTime<Utc>,
    ) -> Result<Department, ClearanceError> {
        let added = self.registry_mut()?.insert(department)?.clone();
        info!(department_id = %added.id, active = added.is_active, "department added");
        if added.is_active {
            self.backfill(&added, now)?;
        }
        Ok(added)
    }

    pub fn update_department(
        &self,
        id: &DepartmentId,
        update: DepartmentUpdate,
        now: DateTime<Utc>,
    ) -> Result<Department, ClearanceError> {
        let (was_active, updated) = {
            let mut registry = self.registry_mut()?;
            let was_active = registry.get(id)?.is_active;
            let updated = registry.update(id, update)?.clone();
            (was_active, updated)
        };
        info!(department_id = %updated.id, active = updated.is_active, "department updated");
        if updated.is_active && !was_active {
            self.backfill(&updated, now)?;
        }
        Ok(updated)
    }

    pub fn set_department_active(
        &self,
        id: &DepartmentId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Department, ClearanceError> {
        let update = DepartmentUpdate {
            is_active: Some(active),
            ..DepartmentUpdate::default()
        };
        self.update_department(id, update, now)
    }

    /// Remove a department nobody references. Deactivate instead when items exist.
    pub fn delete_department(&self, id: &DepartmentId) -> Result<Department, ClearanceError> {
        self.registry()?.get(id)?;
        let referenced = self.store.items_for_department(id)?.len();
        if referenced > 0 {
            return Err(ClearanceError::Conflict(format!(
                "department '{id}' is referenced by {referenced} clearance item(s)"
            )));
        }
        let removed = self.registry_mut()?.remove(id)?;
        info!(department_id = %removed.id, "department deleted");
        Ok(removed)
    }

    fn backfill(&self, department: &Department, now: DateTime<Utc>) -> Result<usize, ClearanceError> {
        let mut created = 0;
        for student in self.store.students()? {
            if student.submitted_at.is_none() {
                continue;
            }
            let id = ClearanceItemId::for_pair(&student.id, &department.id);
            if self.store.fetch_item(&id)?.is_some() {
                continue;
            }
            let item =
                ClearanceItem::pending(&student.id, &department.id, &department.officer_name, now);
            match self.store.insert_items(vec![item]) {
                Ok(()) => created += 1,
                Err(RepositoryError::Conflict) => {}
                Err(other) => return Err(other.into()),
            }
        }
        if created > 0 {
            info!(department_id = %department.id, created, "pending items back-filled");
        }
        Ok(created)
    }

    // ----- students ----------------------------------------------------------------

    pub fn student(&self, id: &StudentId) -> Result<Student, ClearanceError> {
        self.store
            .fetch_student(id)?
            .ok_or_else(|| ClearanceError::NotFound {
                entity: "student",
                id: id.0.clone(),
            })
    }

    pub fn find_student(&self, id: &StudentId) -> Result<Option<Student>, ClearanceError> {
        Ok(self.store.fetch_student(id)?)
    }

    pub fn students(&self) -> Result<Vec<Student>, ClearanceError> {
        Ok(self.store.students()?)
    }

    pub(crate) fn store(&self) -> &Arc<dyn ClearanceStore> {
        &self.store
    }

    /// Overwrite a student's profile. A transition of the payment status to `cleared`
    /// fires the payment-cleared event.
    pub fn update_student_profile(
        &self,
        profile: StudentProfile,
        now: DateTime<Utc>,
    ) -> Result<Student, ClearanceError> {
        let mut student = self.student(&profile.id)?;
        let was_cleared = student.payment_status == PaymentStatus::Cleared;
        student.apply_profile(profile, now);
        self.store.update_student(student.clone())?;
        info!(student_id = %student.id, payment_status = student.payment_status.label(), "student profile updated");

        if !was_cleared && student.payment_status == PaymentStatus::Cleared {
            self.clear_payment(&student.id, now)?;
            return self.student(&student.id);
        }
        Ok(student)
    }

    // ----- transitions -------------------------------------------------------------

    /// Open a clearance request: one pending item per active department.
    ///
    /// Unknown students are stored alongside their items; a student that already has
    /// items is rejected with `AlreadySubmitted` and nothing is written.
    pub fn submit(
        &self,
        mut student: Student,
        now: DateTime<Utc>,
    ) -> Result<ClearanceAggregate, ClearanceError> {
        if !self.store.items_for_student(&student.id)?.is_empty() {
            return Err(ClearanceError::AlreadySubmitted(student.id));
        }

        let departments = self.active_departments()?;
        if departments.is_empty() {
            return Err(ClearanceError::Validation(
                "no active departments are configured".to_string(),
            ));
        }

        let known = self.store.fetch_student(&student.id)?.is_some();
        let items: Vec<ClearanceItem> = departments
            .iter()
            .map(|department| {
                ClearanceItem::pending(&student.id, &department.id, &department.officer_name, now)
            })
            .collect();
        match self.store.insert_items(items) {
            Ok(()) => {}
            Err(RepositoryError::Conflict) => {
                return Err(ClearanceError::AlreadySubmitted(student.id));
            }
            Err(other) => return Err(other.into()),
        }

        // The student row is written only after the items are stored.
        student.submitted_at = Some(now);
        student.last_updated = now;
        if known {
            self.store.update_student(student.clone())?;
        } else {
            match self.store.insert_student(student.clone()) {
                Ok(_) => {}
                Err(RepositoryError::Conflict) => self.store.update_student(student.clone())?,
                Err(other) => return Err(other.into()),
            }
        }

        let aggregate = self.build_aggregate(student)?;
        info!(
            student_id = %aggregate.student.id,
            items = aggregate.items.len(),
            status = ClearanceStatus::Pending.label(),
            "clearance submitted"
        );
        self.notify(ClearanceEvent::Submitted {
            student: aggregate.student.clone(),
            items: aggregate.items.clone(),
        });
        Ok(aggregate)
    }

    /// Apply an officer decision to one pending item.
    pub fn decide(
        &self,
        item_id: &ClearanceItemId,
        request: DecisionRequest,
        now: DateTime<Utc>,
    ) -> Result<DepartmentClearance, ClearanceError> {
        let current = self
            .store
            .fetch_item(item_id)?
            .ok_or_else(|| ClearanceError::NotFound {
                entity: "clearance item",
                id: item_id.0.clone(),
            })?;

        if let Some(expected) = request.expected_version {
            if expected != current.version {
                return Err(ClearanceError::Conflict(format!(
                    "clearance item '{item_id}' is at version {}, not {expected}",
                    current.version
                )));
            }
        }
        if current.status != ClearanceStatus::Pending {
            return Err(ClearanceError::InvalidState {
                item_id: current.id,
                status: current.status,
            });
        }

        let mut updated = current.clone();
        match request.action {
            DecisionAction::Approve => {
                let signature = signature::resolve_for_approval(
                    self.signatures.as_ref(),
                    &current,
                    request.signature_id.as_ref(),
                )?;
                signature::apply(&signature, &mut updated)?;
                updated.officer_name =
                    officer_or(request.officer_name.as_deref(), signature.officer_name());
                updated.signed_date = Some(now);
                updated.payment_amount = None;
            }
            DecisionAction::Reject => {
                updated.officer_name =
                    officer_or(request.officer_name.as_deref(), &current.officer_name);
                updated.payment_amount = None;
            }
            DecisionAction::RequirePayment { amount } => {
                if amount == 0 {
                    return Err(ClearanceError::Validation(
                        "paymentAmount must be greater than zero".to_string(),
                    ));
                }
                updated.officer_name =
                    officer_or(request.officer_name.as_deref(), &current.officer_name);
                updated.payment_amount = Some(amount);
            }
        }
        updated.status = request.action.target_status();
        updated.remarks = request
            .remarks
            .map(|remarks| remarks.trim().to_string())
            .filter(|remarks| !remarks.is_empty())
            .or(current.remarks.clone());
        updated.updated_at = now;

        let stored = self
            .store
            .replace_item(updated, current.version)
            .map_err(write_conflict)?;
        info!(
            student_id = %stored.student_id,
            department_id = %stored.department_id,
            status = stored.status.label(),
            version = stored.version,
            "clearance item decided"
        );

        let entry = self.annotate(stored)?;
        if let Some(student) = self.store.fetch_student(&entry.item.student_id)? {
            self.notify(ClearanceEvent::Decided {
                student,
                entry: entry.clone(),
            });
        }
        Ok(entry)
    }

    pub fn decide_for(
        &self,
        student: &StudentId,
        department: &DepartmentId,
        request: DecisionRequest,
        now: DateTime<Utc>,
    ) -> Result<DepartmentClearance, ClearanceError> {
        self.registry()?.get(department)?;
        self.decide(&ClearanceItemId::for_pair(student, department), request, now)
    }

    /// Decide the same action for many students of one department.
    ///
    /// Items that are no longer pending are skipped; anything else that goes wrong for a
    /// single student is reported as a failure for that student only. An approval with no
    /// usable signature for the department fails the whole request before any write.
    pub fn bulk_decide(
        &self,
        department: &DepartmentId,
        decision: BulkDecision,
        now: DateTime<Utc>,
    ) -> Result<BulkOutcome, ClearanceError> {
        if decision.student_ids.is_empty() {
            return Err(ClearanceError::Validation(
                "studentIds must contain at least one student".to_string(),
            ));
        }
        self.registry()?.get(department)?;

        let signature_id = match decision.action {
            DecisionAction::Approve => {
                Some(self.bulk_signature(department, decision.signature_id.as_ref())?)
            }
            _ => decision.signature_id.clone(),
        };

        let mut seen = HashSet::new();
        let mut outcome = BulkOutcome {
            department_id: department.clone(),
            decided_count: 0,
            skipped_count: 0,
            failed_count: 0,
            results: Vec::new(),
        };

        for student_id in decision.student_ids {
            if !seen.insert(student_id.clone()) {
                continue;
            }
            let item_id = ClearanceItemId::for_pair(&student_id, department);
            let result = match self.store.fetch_item(&item_id) {
                Ok(Some(item)) if item.status != ClearanceStatus::Pending => {
                    BulkItemOutcome::Skipped {
                        status: item.status,
                    }
                }
                Ok(Some(item)) => {
                    let request = DecisionRequest {
                        action: decision.action,
                        officer_name: decision.officer_name.clone(),
                        signature_id: signature_id.clone(),
                        remarks: decision.remarks.clone(),
                        expected_version: Some(item.version),
                    };
                    match self.decide(&item_id, request, now) {
                        Ok(entry) => BulkItemOutcome::Decided {
                            item: Box::new(entry),
                        },
                        Err(ClearanceError::InvalidState { status, .. }) => {
                            BulkItemOutcome::Skipped { status }
                        }
                        Err(error) => BulkItemOutcome::Failed {
                            message: error.to_string(),
                        },
                    }
                }
                Ok(None) => BulkItemOutcome::Failed {
                    message: format!(
                        "no clearance item for student '{student_id}' in department '{department}'"
                    ),
                },
                Err(error) => BulkItemOutcome::Failed {
                    message: error.to_string(),
                },
            };

            match &result {
                BulkItemOutcome::Decided { .. } => outcome.decided_count += 1,
                BulkItemOutcome::Skipped { .. } => outcome.skipped_count += 1,
                BulkItemOutcome::Failed { .. } => outcome.failed_count += 1,
            }
            outcome.results.push(BulkItemResult {
                student_id,
                outcome: result,
            });
        }

        info!(
            department_id = %department,
            decided = outcome.decided_count,
            skipped = outcome.skipped_count,
            failed = outcome.failed_count,
            "bulk decision applied"
        );
        Ok(outcome)
    }

    fn bulk_signature(
        &self,
        department: &DepartmentId,
        requested: Option<&SignatureId>,
    ) -> Result<SignatureId, ClearanceError> {
        let history = self.signatures.history(department)?;
        let current = history
            .iter()
            .rev()
            .find(|s| matches!(s, Signature::Inline(_)));

        match requested {
            Some(id) => {
                let signature = history
                    .iter()
                    .find(|s| s.id() == id)
                    .ok_or_else(|| ClearanceError::SignatureMissing(department.clone()))?;
                if matches!(signature, Signature::Inline(_))
                    && current.map(Signature::id) != Some(id)
                {
                    return Err(ClearanceError::SignatureSuperseded(id.clone()));
                }
                if !signature.is_complete() {
                    return Err(ClearanceError::NotReady(id.clone()));
                }
                Ok(id.clone())
            }
            None => current
                .map(|s| s.id().clone())
                .ok_or_else(|| ClearanceError::SignatureMissing(department.clone())),
        }
    }

    /// Explicit payment-cleared event: every `requires_payment` item of the student goes
    /// back to `pending` and the student's payment status becomes `cleared`.
    pub fn clear_payment(
        &self,
        student_id: &StudentId,
        now: DateTime<Utc>,
    ) -> Result<ClearanceAggregate, ClearanceError> {
        let mut student = self.student(student_id)?;

        let mut reopened = 0;
        for item in self.store.items_for_student(student_id)? {
            if item.status != ClearanceStatus::RequiresPayment {
                continue;
            }
            let version = item.version;
            let mut updated = item;
            updated.status = ClearanceStatus::Pending;
            updated.payment_amount = None;
            updated.updated_at = now;
            let stored = self
                .store
                .replace_item(updated, version)
                .map_err(write_conflict)?;
            reopened += 1;
            info!(
                student_id = %stored.student_id,
                department_id = %stored.department_id,
                status = stored.status.label(),
                "payment cleared, item reopened"
            );
            let entry = self.annotate(stored)?;
            self.notify(ClearanceEvent::Decided {
                student: student.clone(),
                entry,
            });
        }

        if student.payment_status != PaymentStatus::Cleared {
            student.payment_status = PaymentStatus::Cleared;
            student.last_updated = now;
            self.store.update_student(student.clone())?;
        }
        info!(student_id = %student.id, reopened, "payment cleared");
        self.build_aggregate(student)
    }

    // ----- reads -------------------------------------------------------------------

    pub fn aggregate(&self, student_id: &StudentId) -> Result<ClearanceAggregate, ClearanceError> {
        let student = self.student(student_id)?;
        self.build_aggregate(student)
    }

    pub fn progress(&self, student_id: &StudentId) -> Result<ClearanceProgress, ClearanceError> {
        Ok(self.aggregate(student_id)?.progress)
    }

    /// Aggregates of every student that has submitted, in student id order.
    pub fn submitted_aggregates(&self) -> Result<Vec<ClearanceAggregate>, ClearanceError> {
        self.store
            .students()?
            .into_iter()
            .filter(|student| student.submitted_at.is_some())
            .map(|student| self.build_aggregate(student))
            .collect()
    }

    pub fn list(
        &self,
        query: &ClearanceQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClearanceSummary>, ClearanceError> {
        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(OverallStatus::parse(raw).ok_or_else(|| {
                ClearanceError::Validation(format!("unknown clearance status '{raw}'"))
            })?),
        };
        let department = query
            .department
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty() && *raw != "all")
            .map(|raw| DepartmentId(raw.to_string()));
        let search = query
            .search
            .as_deref()
            .map(|raw| raw.trim().to_lowercase())
            .filter(|raw| !raw.is_empty());

        let mut rows = Vec::new();
        for aggregate in self.submitted_aggregates()? {
            if let Some(term) = &search {
                let student = &aggregate.student;
                let matched = student.full_name.to_lowercase().contains(term)
                    || student.id.0.to_lowercase().contains(term)
                    || student.email.to_lowercase().contains(term);
                if !matched {
                    continue;
                }
            }
            if let Some(department) = &department {
                let pending_here = aggregate
                    .item_for(department)
                    .map(|entry| entry.item.status == ClearanceStatus::Pending)
                    .unwrap_or(false);
                if !pending_here {
                    continue;
                }
            }
            let row = summarize(&aggregate, now);
            if status.is_some_and(|wanted| wanted != row.status) {
                continue;
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Items of one department, filtered by status (pending when unspecified).
    pub fn department_queue(
        &self,
        department: &DepartmentId,
        status: Option<ClearanceStatus>,
    ) -> Result<Vec<QueueEntry>, ClearanceError> {
        self.registry()?.get(department)?;
        let wanted = status.unwrap_or(ClearanceStatus::Pending);

        let mut queue = Vec::new();
        for item in self.store.items_for_department(department)? {
            if item.status != wanted {
                continue;
            }
            let Some(student) = self.store.fetch_student(&item.student_id)? else {
                continue;
            };
            queue.push(QueueEntry {
                student_id: student.id.clone(),
                student_name: student.full_name.clone(),
                program: student.program.clone(),
                year_level: student.year_level.clone(),
                section: student.section.clone(),
                item,
            });
        }
        Ok(queue)
    }

    fn annotate(&self, item: ClearanceItem) -> Result<DepartmentClearance, ClearanceError> {
        let registry = self.registry()?;
        let department = registry.get(&item.department_id)?;
        Ok(annotate(department, item))
    }

    fn build_aggregate(&self, student: Student) -> Result<ClearanceAggregate, ClearanceError> {
        let mut items = self.store.items_for_student(&student.id)?;
        let registry = self.registry()?;

        let mut entries = Vec::with_capacity(registry.active_count());
        for department in registry.active() {
            if let Some(position) = items
                .iter()
                .position(|item| item.department_id == department.id)
            {
                entries.push(annotate(department, items.swap_remove(position)));
            }
        }

        let progress = ClearanceProgress::from_statuses(
            entries.iter().map(|entry| entry.item.status),
            registry.active_count(),
        );
        Ok(ClearanceAggregate {
            student,
            items: entries,
            progress,
        })
    }
}

fn officer_or(requested: Option<&str>, fallback: &str) -> String {
    match requested.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}

fn annotate(department: &Department, item: ClearanceItem) -> DepartmentClearance {
    DepartmentClearance {
        item,
        department_name: department.name.clone(),
        department_full_name: department.full_name.clone(),
        department_description: department.description.clone(),
        display_order: department.display_order,
    }
}

/// Listing row for one student's clearance.
pub fn summarize(aggregate: &ClearanceAggregate, now: DateTime<Utc>) -> ClearanceSummary {
    let statuses: Vec<ClearanceStatus> = aggregate.items.iter().map(|e| e.item.status).collect();
    let student = &aggregate.student;
    ClearanceSummary {
        student_id: student.id.clone(),
        student_name: student.full_name.clone(),
        program: student.program.clone(),
        year_level: student.year_level.clone(),
        email: student.email.clone(),
        submitted_date: student.submitted_at,
        status: OverallStatus::derive(&aggregate.progress, &statuses, &student.access, now),
        approved_count: aggregate.progress.approved_count,
        total_required: aggregate.progress.total,
        progress_percent: aggregate.progress.percent(),
    }
}
