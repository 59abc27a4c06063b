use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::client::{ExternalSystem, GatewayError, PushAck};
use super::mapping::{
    clearance_from_external, clearance_to_external, student_from_external, student_to_external,
    InboundClearance, MappingError, PhpClearanceRecord, PhpStudentRecord,
};
use crate::integrations::sync_log::{
    record_quietly, SyncDirection, SyncLogEntry, SyncLogStore, SyncStatus, SyncType,
};
use crate::workflows::clearance::{
    AccessLinks, ApprovalEngine, ClearanceError, ClearanceEvent, ClearanceItemId,
    ClearanceStatus, DecisionAction, DecisionNotifier, DecisionRequest, DepartmentClearance,
    NotifyError, Signature, SignatureStore, Student, StudentId,
};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Workflow(#[from] ClearanceError),
    #[error("unsupported sync event '{0}'")]
    UnsupportedEvent(String),
}

/// Counts reported by a full sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub students: usize,
    pub clearances: usize,
    pub failed: usize,
}

impl SyncSummary {
    pub fn synced(&self) -> usize {
        self.students + self.clearances
    }
}

/// Gateway calls wrapped with retry and sync-log bookkeeping.
pub struct SyncService {
    gateway: Arc<dyn ExternalSystem>,
    log: Arc<dyn SyncLogStore>,
    signatures: Arc<dyn SignatureStore>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl SyncService {
    pub fn new(
        gateway: Arc<dyn ExternalSystem>,
        log: Arc<dyn SyncLogStore>,
        signatures: Arc<dyn SignatureStore>,
        retry_attempts: u32,
    ) -> Self {
        Self {
            gateway,
            log,
            signatures,
            retry_attempts: retry_attempts.max(1),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn log(&self) -> &Arc<dyn SyncLogStore> {
        &self.log
    }

    /// Runs `call` until it succeeds, fails permanently, or attempts run out.
    /// Returns the result and the number of retries used.
    async fn attempt<T, F, Fut>(&self, mut call: F) -> (Result<T, GatewayError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut retries = 0;
        loop {
            match call().await {
                Ok(value) => return (Ok(value), retries),
                Err(error) if retries + 1 < self.retry_attempts && is_transient(&error) => {
                    retries += 1;
                    warn!(%error, retries, "student records call failed, retrying");
                    tokio::time::sleep(self.retry_delay * retries).await;
                }
                Err(error) => return (Err(error), retries),
            }
        }
    }

    fn bookkeep<T>(
        &self,
        sync_type: SyncType,
        local_id: &str,
        result: &Result<T, GatewayError>,
        external_id: Option<&str>,
        retries: u32,
    ) {
        let now = Utc::now();
        let entry = match result {
            Ok(_) => {
                info!(sync_type = ?sync_type, local_id, retries, "synced to student records");
                SyncLogEntry::new(
                    sync_type,
                    SyncDirection::ToExternal,
                    SyncStatus::Success,
                    local_id,
                    now,
                )
            }
            Err(error) => {
                warn!(sync_type = ?sync_type, local_id, retries, %error, "sync to student records failed");
                SyncLogEntry::new(
                    sync_type,
                    SyncDirection::ToExternal,
                    SyncStatus::Failed,
                    local_id,
                    now,
                )
                .with_error(error.to_string())
            }
        };
        let entry = match external_id {
            Some(id) => entry.with_external_id(id),
            None => entry,
        };
        record_quietly(self.log.as_ref(), entry.with_retries(retries));
    }

    pub async fn push_student(&self, student: &Student) -> Result<String, SyncError> {
        let record = student_to_external(student);
        let (result, retries) = self.attempt(|| self.gateway.push_student(&record)).await;
        let external = result.as_ref().ok().map(|ack| ack.external_id.clone());
        self.bookkeep(
            SyncType::Student,
            &student.id.0,
            &result,
            external.as_deref(),
            retries,
        );
        Ok(result?.external_id)
    }

    /// Push every item; the first failure is returned after all were attempted.
    pub async fn push_clearances(
        &self,
        student: &StudentId,
        entries: &[DepartmentClearance],
    ) -> Result<usize, SyncError> {
        let mut pushed = 0;
        let mut first_error = None;
        for entry in entries {
            match self.push_clearance(student, entry).await {
                Ok(_) => pushed += 1,
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(pushed),
        }
    }

    pub async fn push_clearance(
        &self,
        student: &StudentId,
        entry: &DepartmentClearance,
    ) -> Result<String, SyncError> {
        let signature = self.signature_for(entry);
        let record = clearance_to_external(entry, signature.as_ref());
        let (result, retries) = self
            .attempt(|| self.gateway.push_clearance(&student.0, &record))
            .await;
        let external = result.as_ref().ok().map(|ack| ack.external_id.clone());
        self.bookkeep(
            SyncType::Clearance,
            &entry.item.id.0,
            &result,
            external.as_deref(),
            retries,
        );
        Ok(result?.external_id)
    }

    pub async fn update_clearance_status(
        &self,
        entry: &DepartmentClearance,
    ) -> Result<(), SyncError> {
        let item = &entry.item;
        let (result, retries) = self
            .attempt(|| {
                self.gateway.update_clearance_status(
                    &item.id.0,
                    item.status.label(),
                    item.remarks.as_deref(),
                )
            })
            .await;
        self.bookkeep(SyncType::Clearance, &item.id.0, &result, None, retries);
        Ok(result?)
    }

    /// Students known to the records system; unmappable records are logged and skipped.
    pub async fn pull_students(&self) -> Result<Vec<PhpStudentRecord>, SyncError> {
        let (result, retries) = self.attempt(|| self.gateway.fetch_students()).await;
        let records = match result {
            Ok(records) => records,
            Err(error) => {
                self.record_inbound(SyncType::Student, "*", Some(&error.to_string()), retries);
                return Err(error.into());
            }
        };

        let mut accepted = Vec::with_capacity(records.len());
        for record in records {
            match student_from_external(&record) {
                Ok(_) => {
                    self.record_inbound(SyncType::Student, &record.student_id, None, retries);
                    accepted.push(record);
                }
                Err(error) => {
                    self.record_inbound(
                        SyncType::Student,
                        &record.student_id,
                        Some(&error.to_string()),
                        retries,
                    );
                }
            }
        }
        Ok(accepted)
    }

    pub async fn pull_clearances(
        &self,
        student: &StudentId,
    ) -> Result<Vec<InboundClearance>, SyncError> {
        let (result, retries) = self
            .attempt(|| self.gateway.fetch_clearances(&student.0))
            .await;
        let records = match result {
            Ok(records) => records,
            Err(error) => {
                self.record_inbound(
                    SyncType::Clearance,
                    &student.0,
                    Some(&error.to_string()),
                    retries,
                );
                return Err(error.into());
            }
        };

        let mut mapped = Vec::with_capacity(records.len());
        for record in &records {
            match clearance_from_external(record) {
                Ok(inbound) => {
                    self.record_inbound(SyncType::Clearance, &inbound.item_id.0, None, retries);
                    mapped.push(inbound);
                }
                Err(error) => self.record_inbound(
                    SyncType::Clearance,
                    &record.clearance_id,
                    Some(&error.to_string()),
                    retries,
                ),
            }
        }
        Ok(mapped)
    }

    pub async fn test_connection(&self) -> Result<(), SyncError> {
        self.gateway.health().await?;
        Ok(())
    }

    /// Push every submitted student and all of their items.
    pub async fn sync_all(&self, engine: &ApprovalEngine) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();
        for aggregate in engine.submitted_aggregates()? {
            if self.push_student(&aggregate.student).await.is_err() {
                summary.failed += 1;
                continue;
            }
            summary.students += 1;
            for entry in &aggregate.items {
                match self.push_clearance(&aggregate.student.id, entry).await {
                    Ok(_) => summary.clearances += 1,
                    Err(_) => summary.failed += 1,
                }
            }
        }
        info!(
            students = summary.students,
            clearances = summary.clearances,
            failed = summary.failed,
            "full sync finished"
        );
        Ok(summary)
    }

    /// Outbound reaction to a committed engine event.
    pub async fn publish(&self, event: ClearanceEvent) {
        let result = match event {
            ClearanceEvent::Submitted { student, items } => {
                match self.push_student(&student).await {
                    Ok(_) => self.push_clearances(&student.id, &items).await.map(|_| ()),
                    Err(error) => Err(error),
                }
            }
            ClearanceEvent::Decided { entry, .. } => self.update_clearance_status(&entry).await,
        };
        if let Err(error) = result {
            warn!(%error, "outbound sync after clearance event failed");
        }
    }

    fn signature_for(&self, entry: &DepartmentClearance) -> Option<Signature> {
        let reference = entry.item.signature.as_ref()?;
        match self.signatures.fetch(&reference.signature_id) {
            Ok(found) => found,
            Err(error) => {
                warn!(%error, signature_id = %reference.signature_id, "signature lookup failed during sync");
                None
            }
        }
    }

    fn record_inbound(
        &self,
        sync_type: SyncType,
        local_id: &str,
        error: Option<&str>,
        retries: u32,
    ) {
        record_inbound(self.log.as_ref(), sync_type, local_id, error, retries);
    }
}

fn is_transient(error: &GatewayError) -> bool {
    match error {
        GatewayError::Http(_) => true,
        GatewayError::UnexpectedResponse { status, .. } => *status >= 500,
        GatewayError::Rejected(_) => false,
    }
}

fn record_inbound(
    log: &dyn SyncLogStore,
    sync_type: SyncType,
    local_id: &str,
    error: Option<&str>,
    retries: u32,
) {
    let status = if error.is_some() {
        SyncStatus::Failed
    } else {
        SyncStatus::Success
    };
    let mut entry = SyncLogEntry::new(
        sync_type,
        SyncDirection::FromExternal,
        status,
        local_id,
        Utc::now(),
    )
    .with_retries(retries);
    if let Some(message) = error {
        entry = entry.with_error(message);
    }
    record_quietly(log, entry);
}

/// `DecisionNotifier` that hands committed events to the sync service on the runtime.
pub struct SyncNotifier {
    service: Arc<SyncService>,
}

impl SyncNotifier {
    pub fn new(service: Arc<SyncService>) -> Self {
        Self { service }
    }
}

impl DecisionNotifier for SyncNotifier {
    fn publish(&self, event: ClearanceEvent) -> Result<(), NotifyError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|error| NotifyError::Transport(error.to_string()))?;
        let service = Arc::clone(&self.service);
        handle.spawn(async move { service.publish(event).await });
        Ok(())
    }
}

// ----- inbound webhook ----------------------------------------------------------------

/// Body posted by the records system to the sync webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncWebhook {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InboundOutcome {
    StudentUpdated { student_id: StudentId },
    StudentImported { student_id: StudentId },
    ClearanceDecided { item_id: ClearanceItemId, status: ClearanceStatus },
    Acknowledged { event: String },
}

#[derive(Debug, Deserialize)]
struct StudentPayload {
    student: PhpStudentRecord,
}

#[derive(Debug, Deserialize)]
struct ClearancePayload {
    clearance: PhpClearanceRecord,
    #[serde(default)]
    student_id: Option<String>,
}

/// Apply a verified inbound event. Decisions go through the engine, so every
/// transition rule still holds; every event is recorded as `from_external`.
pub fn apply_inbound(
    engine: &ApprovalEngine,
    access: &AccessLinks,
    log: &dyn SyncLogStore,
    webhook: SyncWebhook,
    now: DateTime<Utc>,
) -> Result<InboundOutcome, SyncError> {
    info!(event = %webhook.event, timestamp = ?webhook.timestamp, "student records webhook received");
    let (sync_type, local_id, result) = match webhook.event.as_str() {
        "student.updated" => {
            let local_id = webhook.data["student"]["student_id"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            (
                SyncType::Student,
                local_id,
                apply_student_update(engine, access, webhook.data, now),
            )
        }
        "clearance.approved" | "clearance.rejected" => {
            let action = if webhook.event == "clearance.approved" {
                DecisionAction::Approve
            } else {
                DecisionAction::Reject
            };
            let local_id = webhook.data["clearance"]["clearance_id"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            (
                SyncType::Clearance,
                local_id,
                apply_clearance_decision(engine, action, webhook.data, now),
            )
        }
        "signature.received" => {
            let local_id = webhook.data["signature"]["clearance_id"]
                .as_str()
                .or_else(|| webhook.data["signature"]["id"].as_str())
                .unwrap_or_default()
                .to_string();
            (
                SyncType::Signature,
                local_id,
                Ok(InboundOutcome::Acknowledged {
                    event: webhook.event.clone(),
                }),
            )
        }
        other => return Err(SyncError::UnsupportedEvent(other.to_string())),
    };

    let error = result.as_ref().err().map(ToString::to_string);
    record_inbound(log, sync_type, &local_id, error.as_deref(), 0);
    result
}

fn apply_student_update(
    engine: &ApprovalEngine,
    access: &AccessLinks,
    data: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<InboundOutcome, SyncError> {
    let payload: StudentPayload = serde_json::from_value(data)
        .map_err(|_| SyncError::Mapping(MappingError::MissingField("student")))?;
    let profile = student_from_external(&payload.student)?;
    let student_id = profile.id.clone();

    if engine.find_student(&student_id)?.is_some() {
        engine.update_student_profile(profile, now)?;
        return Ok(InboundOutcome::StudentUpdated { student_id });
    }

    let student = access.enroll(profile, now);
    engine
        .store()
        .insert_student(student)
        .map_err(ClearanceError::from)?;
    info!(student_id = %student_id, "student imported from records system");
    Ok(InboundOutcome::StudentImported { student_id })
}

fn apply_clearance_decision(
    engine: &ApprovalEngine,
    action: DecisionAction,
    data: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<InboundOutcome, SyncError> {
    let payload: ClearancePayload = serde_json::from_value(data)
        .map_err(|_| SyncError::Mapping(MappingError::MissingField("clearance")))?;
    let inbound = clearance_from_external(&payload.clearance)?;
    let item_id = resolve_item(engine, &inbound, payload.student_id.as_deref())?;

    let mut request = DecisionRequest::new(action);
    request.officer_name = inbound.officer;
    request.remarks = inbound.remarks;
    let entry = engine.decide(&item_id, request, now)?;
    Ok(InboundOutcome::ClearanceDecided {
        item_id: entry.item.id,
        status: entry.item.status,
    })
}

/// Items are addressed by local id; a foreign id falls back to (student, department).
fn resolve_item(
    engine: &ApprovalEngine,
    inbound: &InboundClearance,
    student_id: Option<&str>,
) -> Result<ClearanceItemId, SyncError> {
    if engine
        .store()
        .fetch_item(&inbound.item_id)
        .map_err(ClearanceError::from)?
        .is_some()
    {
        return Ok(inbound.item_id.clone());
    }

    let student = student_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(MappingError::MissingField("student_id"))?;
    let wanted = inbound.department.trim();
    let department = engine
        .departments()?
        .into_iter()
        .find(|d| d.id.0.eq_ignore_ascii_case(wanted) || d.name.eq_ignore_ascii_case(wanted))
        .map(|d| d.id)
        .ok_or_else(|| ClearanceError::NotFound {
            entity: "department",
            id: wanted.to_string(),
        })?;
    Ok(ClearanceItemId::for_pair(
        &StudentId(student.to_string()),
        &department,
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::config::PortalConfig;
    use crate::integrations::sync_log::SyncLogFilter;
    use crate::workflows::clearance::signature::InlineUpload;
    use crate::workflows::clearance::{ClearanceServices, PaymentStatus, StudentProfile};

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    /// Records pushes; the first `failures` calls answer with the scripted error.
    #[derive(Default)]
    struct ScriptedGateway {
        failures: Mutex<u32>,
        permanent: bool,
        students: Mutex<Vec<PhpStudentRecord>>,
        clearances: Mutex<Vec<PhpClearanceRecord>>,
    }

    impl ScriptedGateway {
        fn failing(failures: u32, permanent: bool) -> Self {
            Self {
                failures: Mutex::new(failures),
                permanent,
                ..Self::default()
            }
        }

        fn next_failure(&self) -> Option<GatewayError> {
            let mut failures = self.failures.lock().expect("gateway mutex poisoned");
            if *failures == 0 {
                return None;
            }
            *failures -= 1;
            Some(if self.permanent {
                GatewayError::Rejected("duplicate student".to_string())
            } else {
                GatewayError::UnexpectedResponse {
                    status: 503,
                    body: "maintenance".to_string(),
                }
            })
        }
    }

    #[async_trait]
    impl ExternalSystem for ScriptedGateway {
        async fn push_student(&self, record: &PhpStudentRecord) -> Result<PushAck, GatewayError> {
            if let Some(error) = self.next_failure() {
                return Err(error);
            }
            let mut students = self.students.lock().expect("gateway mutex poisoned");
            students.push(record.clone());
            Ok(PushAck {
                external_id: format!("php-{}", students.len()),
            })
        }

        async fn push_clearance(
            &self,
            _student_id: &str,
            record: &PhpClearanceRecord,
        ) -> Result<PushAck, GatewayError> {
            if let Some(error) = self.next_failure() {
                return Err(error);
            }
            let mut clearances = self.clearances.lock().expect("gateway mutex poisoned");
            clearances.push(record.clone());
            Ok(PushAck {
                external_id: format!("php-clr-{}", clearances.len()),
            })
        }

        async fn update_clearance_status(
            &self,
            _clearance_id: &str,
            _status: &str,
            _remarks: Option<&str>,
        ) -> Result<(), GatewayError> {
            match self.next_failure() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        async fn fetch_students(&self) -> Result<Vec<PhpStudentRecord>, GatewayError> {
            Ok(vec![
                PhpStudentRecord {
                    student_id: "2024-010".to_string(),
                    first_name: "Lea".to_string(),
                    last_name: "Ramos".to_string(),
                    payment_status: "pending".to_string(),
                    ..PhpStudentRecord::default()
                },
                PhpStudentRecord {
                    student_id: "2024-011".to_string(),
                    payment_status: "waived".to_string(),
                    ..PhpStudentRecord::default()
                },
            ])
        }

        async fn fetch_clearances(
            &self,
            _student_id: &str,
        ) -> Result<Vec<PhpClearanceRecord>, GatewayError> {
            Ok(Vec::new())
        }

        async fn health(&self) -> Result<(), GatewayError> {
            match self.next_failure() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    }

    fn profile(id: &str, payment_status: PaymentStatus) -> StudentProfile {
        StudentProfile {
            id: StudentId(id.to_string()),
            first_name: "Juan".to_string(),
            last_name: "Santos".to_string(),
            full_name: None,
            program: "BSIT".to_string(),
            section: "4A".to_string(),
            year_level: "4th Year".to_string(),
            email: format!("{id}@students.smcl.edu.ph"),
            contact_number: String::new(),
            address: String::new(),
            enrollment_date: None,
            expected_graduation: None,
            payment_status,
        }
    }

    fn sync_for(services: &ClearanceServices, gateway: Arc<ScriptedGateway>) -> SyncService {
        SyncService::new(
            gateway,
            Arc::clone(&services.sync_log),
            Arc::clone(services.signatures.store()),
            3,
        )
        .with_retry_delay(Duration::ZERO)
    }

    fn log_entries(services: &ClearanceServices) -> Vec<SyncLogEntry> {
        services
            .sync_log
            .query(&SyncLogFilter::default())
            .expect("sync log readable")
    }

    fn webhook(event: &str, data: serde_json::Value) -> SyncWebhook {
        SyncWebhook {
            event: event.to_string(),
            data,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_and_counted() {
        let services = ClearanceServices::standalone(&PortalConfig::default());
        let gateway = Arc::new(ScriptedGateway::failing(2, false));
        let sync = sync_for(&services, Arc::clone(&gateway));
        let aggregate = services
            .submit(profile("2021-0001", PaymentStatus::Cleared), Utc::now())
            .expect("submitted");

        let external = sync
            .push_student(&aggregate.student)
            .await
            .expect("pushed after retries");
        assert_eq!(external, "php-1");

        let entries = log_entries(&services);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, SyncStatus::Success);
        assert_eq!(entries[0].direction, SyncDirection::ToExternal);
        assert_eq!(entries[0].retry_count, 2);
        assert_eq!(entries[0].external_id, "php-1");
        assert_eq!(entries[0].local_id, "2021-0001");
    }

    #[tokio::test]
    async fn permanent_rejections_are_not_retried() {
        let services = ClearanceServices::standalone(&PortalConfig::default());
        let gateway = Arc::new(ScriptedGateway::failing(5, true));
        let sync = sync_for(&services, Arc::clone(&gateway));
        let aggregate = services
            .submit(profile("2021-0001", PaymentStatus::Cleared), Utc::now())
            .expect("submitted");

        let err = sync
            .push_student(&aggregate.student)
            .await
            .expect_err("rejected");
        assert!(matches!(err, SyncError::Gateway(GatewayError::Rejected(_))));
        assert_eq!(*gateway.failures.lock().expect("gateway mutex poisoned"), 4);

        let entries = log_entries(&services);
        assert_eq!(entries[0].status, SyncStatus::Failed);
        assert_eq!(entries[0].retry_count, 0);
        assert!(entries[0]
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("duplicate student")));
    }

    #[tokio::test]
    async fn full_sync_pushes_students_and_items() {
        let services = ClearanceServices::standalone(&PortalConfig::default());
        let gateway = Arc::new(ScriptedGateway::default());
        let sync = sync_for(&services, Arc::clone(&gateway));
        services
            .submit(profile("2021-0001", PaymentStatus::Cleared), Utc::now())
            .expect("submitted");
        services
            .submit(profile("2021-0002", PaymentStatus::Cleared), Utc::now())
            .expect("submitted");

        let summary = sync.sync_all(&services.engine).await.expect("synced");
        assert_eq!(summary.students, 2);
        assert_eq!(summary.clearances, 10);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.synced(), 12);

        let clearances = gateway.clearances.lock().expect("gateway mutex poisoned");
        assert!(clearances[0].clearance_id.ends_with("-cashier"));
        assert_eq!(clearances[0].status, "pending");
        assert_eq!(clearances[0].department, "Cashier");
    }

    #[tokio::test]
    async fn pulled_students_skip_unmappable_records() {
        let services = ClearanceServices::standalone(&PortalConfig::default());
        let sync = sync_for(&services, Arc::new(ScriptedGateway::default()));

        let students = sync.pull_students().await.expect("pulled");
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].student_id, "2024-010");

        let failed = services
            .sync_log
            .query(&SyncLogFilter {
                status: Some(SyncStatus::Failed),
                ..SyncLogFilter::default()
            })
            .expect("sync log readable");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].local_id, "2024-011");
        assert_eq!(failed[0].direction, SyncDirection::FromExternal);
    }

    #[test]
    fn inbound_student_update_imports_unknown_students() {
        let services = ClearanceServices::standalone(&PortalConfig::default());
        let outcome = apply_inbound(
            &services.engine,
            &services.access,
            services.sync_log.as_ref(),
            webhook(
                "student.updated",
                json!({ "student": {
                    "student_id": "2024-020",
                    "first_name": "Ana",
                    "last_name": "Lim",
                    "payment_status": "pending"
                } }),
            ),
            Utc::now(),
        )
        .expect("imported");

        assert_eq!(
            outcome,
            InboundOutcome::StudentImported {
                student_id: StudentId("2024-020".to_string())
            }
        );
        let student = services
            .engine
            .find_student(&StudentId("2024-020".to_string()))
            .expect("lookup")
            .expect("stored");
        assert_eq!(student.full_name, "Ana Lim");
        assert!(student.submitted_at.is_none());
        assert_eq!(student.access.token.len(), 32);
        assert_eq!(log_entries(&services)[0].direction, SyncDirection::FromExternal);
    }

    #[test]
    fn inbound_payment_clearance_reopens_held_items() {
        let services = ClearanceServices::standalone(&PortalConfig::default());
        let now = Utc::now();
        services
            .submit(profile("2021-0001", PaymentStatus::Pending), now)
            .expect("submitted");
        services
            .engine
            .decide(
                &ClearanceItemId("clr-2021-0001-cashier".to_string()),
                DecisionRequest::new(DecisionAction::RequirePayment { amount: 1200 }),
                now,
            )
            .expect("held");

        let outcome = apply_inbound(
            &services.engine,
            &services.access,
            services.sync_log.as_ref(),
            webhook(
                "student.updated",
                json!({ "student": {
                    "student_id": "2021-0001",
                    "first_name": "Juan",
                    "last_name": "Santos",
                    "program": "BSIT",
                    "payment_status": "cleared"
                } }),
            ),
            now,
        )
        .expect("updated");
        assert!(matches!(outcome, InboundOutcome::StudentUpdated { .. }));

        let aggregate = services
            .engine
            .aggregate(&StudentId("2021-0001".to_string()))
            .expect("aggregate");
        assert_eq!(aggregate.items[0].item.status, ClearanceStatus::Pending);
        assert_eq!(aggregate.student.payment_status, PaymentStatus::Cleared);
    }

    #[test]
    fn inbound_approval_still_needs_a_signature() {
        let services = ClearanceServices::standalone(&PortalConfig::default());
        let now = Utc::now();
        services
            .submit(profile("2021-0001", PaymentStatus::Cleared), now)
            .expect("submitted");
        let approval = || {
            webhook(
                "clearance.approved",
                json!({
                    "student_id": "2021-0001",
                    "clearance": {
                        "clearance_id": "php-77",
                        "department": "Library",
                        "officer": "Mr. Jose Dela Cruz",
                        "status": "approved"
                    }
                }),
            )
        };

        let err = apply_inbound(
            &services.engine,
            &services.access,
            services.sync_log.as_ref(),
            approval(),
            now,
        )
        .expect_err("no signature on file");
        assert!(matches!(
            err,
            SyncError::Workflow(ClearanceError::SignatureMissing(_))
        ));
        assert_eq!(log_entries(&services)[0].status, SyncStatus::Failed);

        services
            .bind_inline(
                InlineUpload {
                    department_id: "library".to_string(),
                    image_data: PIXEL.to_string(),
                    officer_name: "Mr. Jose Dela Cruz".to_string(),
                    ..InlineUpload::default()
                },
                now,
            )
            .expect("signature bound");
        let outcome = apply_inbound(
            &services.engine,
            &services.access,
            services.sync_log.as_ref(),
            approval(),
            now,
        )
        .expect("approved");
        assert_eq!(
            outcome,
            InboundOutcome::ClearanceDecided {
                item_id: ClearanceItemId("clr-2021-0001-library".to_string()),
                status: ClearanceStatus::Approved,
            }
        );
    }

    #[test]
    fn unknown_events_are_not_logged() {
        let services = ClearanceServices::standalone(&PortalConfig::default());
        let err = apply_inbound(
            &services.engine,
            &services.access,
            services.sync_log.as_ref(),
            webhook("invoice.created", json!({})),
            Utc::now(),
        )
        .expect_err("unsupported");
        assert!(matches!(err, SyncError::UnsupportedEvent(ref event) if event == "invoice.created"));
        assert!(log_entries(&services).is_empty());
    }

    #[test]
    fn notifier_needs_a_runtime() {
        let services = ClearanceServices::standalone(&PortalConfig::default());
        let sync = Arc::new(sync_for(&services, Arc::new(ScriptedGateway::default())));
        let student = services
            .access
            .enroll(profile("2021-0001", PaymentStatus::Cleared), Utc::now());

        let err = SyncNotifier::new(sync)
            .publish(ClearanceEvent::Submitted {
                student,
                items: Vec::new(),
            })
            .expect_err("no runtime");
        assert!(matches!(err, NotifyError::Transport(_)));
    }
}
