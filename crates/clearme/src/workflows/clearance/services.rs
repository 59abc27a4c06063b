use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use super::access::{AccessLinks, LinkDispatcher, LoggingDispatcher};
use super::document::{self, ClearanceDocument, DocumentBundle, InstitutionProfile};
use super::domain::{ClearanceAggregate, DepartmentId, StudentId, StudentProfile};
use super::engine::{ApprovalEngine, ClearanceError};
use super::memory::InMemoryClearanceStore;
use super::registry::{DepartmentRegistry, RegistryError};
use super::repository::{ClearanceStore, DecisionNotifier, SilentNotifier};
use super::signature::{
    ExternalBundleRequest, InMemorySignatureStore, InlineUpload, Signature, SignatureBinding,
    SignatureError, SignatureStore,
};
use super::stats::{self, ClearanceStatistics};
use crate::config::{AppConfig, PortalConfig, WebhookConfig};
use crate::integrations::external::{ExternalSystem, SyncNotifier, SyncService};
use crate::integrations::signing::SigningProvider;
use crate::integrations::sync_log::{BoundedSyncLog, SyncLogStore};
use crate::integrations::webhook::WebhookVerifier;

/// Optional out-of-process collaborators. Absent ones disable their routes only.
#[derive(Clone, Default)]
pub struct Integrations {
    pub records: Option<Arc<dyn ExternalSystem>>,
    pub signing: Option<Arc<dyn SigningProvider>>,
    pub dispatcher: Option<Arc<dyn LinkDispatcher>>,
}

/// Shared state behind the clearance and integration routers.
#[derive(Clone)]
pub struct ClearanceServices {
    pub engine: Arc<ApprovalEngine>,
    pub signatures: Arc<SignatureBinding>,
    pub access: Arc<AccessLinks>,
    pub institution: Arc<InstitutionProfile>,
    pub sync: Option<Arc<SyncService>>,
    pub sync_log: Arc<dyn SyncLogStore>,
    pub sync_webhook: Option<Arc<WebhookVerifier>>,
    pub signing_webhook: Option<Arc<WebhookVerifier>>,
    base_url: String,
}

impl ClearanceServices {
    pub fn new(config: &AppConfig, registry: DepartmentRegistry, integrations: Integrations) -> Self {
        let retry_attempts = config
            .sync
            .as_ref()
            .map(|sync| sync.retry_attempts)
            .unwrap_or(1);
        Self::assemble(
            &config.portal,
            &config.webhooks,
            registry,
            integrations,
            retry_attempts,
        )
    }

    /// In-memory wiring without external collaborators or webhook secrets.
    pub fn standalone(portal: &PortalConfig) -> Self {
        Self::assemble(
            portal,
            &WebhookConfig::default(),
            DepartmentRegistry::standard(),
            Integrations::default(),
            1,
        )
    }

    fn assemble(
        portal: &PortalConfig,
        webhooks: &WebhookConfig,
        registry: DepartmentRegistry,
        integrations: Integrations,
        retry_attempts: u32,
    ) -> Self {
        let store: Arc<dyn ClearanceStore> = Arc::new(InMemoryClearanceStore::default());
        let signature_store: Arc<dyn SignatureStore> = Arc::new(InMemorySignatureStore::default());
        let sync_log: Arc<dyn SyncLogStore> =
            Arc::new(BoundedSyncLog::new(portal.sync_log_capacity));

        let sync = integrations.records.map(|gateway| {
            Arc::new(SyncService::new(
                gateway,
                Arc::clone(&sync_log),
                Arc::clone(&signature_store),
                retry_attempts,
            ))
        });
        let notifier: Arc<dyn DecisionNotifier> = match &sync {
            Some(service) => Arc::new(SyncNotifier::new(Arc::clone(service))),
            None => Arc::new(SilentNotifier),
        };

        let engine = ApprovalEngine::new(
            Arc::clone(&store),
            Arc::clone(&signature_store),
            notifier,
            registry,
        );
        let dispatcher = integrations
            .dispatcher
            .unwrap_or_else(|| Arc::new(LoggingDispatcher));
        let access = AccessLinks::new(
            store,
            dispatcher,
            portal.base_url.clone(),
            portal.access_link_validity_days,
        );

        Self {
            engine: Arc::new(engine),
            signatures: Arc::new(SignatureBinding::new(signature_store, integrations.signing)),
            access: Arc::new(access),
            institution: Arc::new(InstitutionProfile::default()),
            sync,
            sync_log,
            sync_webhook: webhooks
                .external_system_secret
                .as_deref()
                .map(|secret| Arc::new(WebhookVerifier::new(secret))),
            signing_webhook: webhooks
                .signing_secret
                .as_deref()
                .map(|secret| Arc::new(WebhookVerifier::new(secret))),
            base_url: portal.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn document_url(&self, student: &StudentId) -> String {
        format!("{}/api/v1/students/{}/clearance/document", self.base_url, student)
    }

    /// First submission enrolls the student with a fresh access link; a known student
    /// keeps their link and gets the submitted profile applied.
    pub fn submit(
        &self,
        profile: StudentProfile,
        now: DateTime<Utc>,
    ) -> Result<ClearanceAggregate, ClearanceError> {
        if profile.id.0.trim().is_empty() {
            return Err(ClearanceError::Validation("student id is required".to_string()));
        }
        if profile.display_name().is_empty() {
            return Err(ClearanceError::Validation("student name is required".to_string()));
        }

        let student = match self.engine.find_student(&profile.id)? {
            Some(mut existing) => {
                existing.apply_profile(profile, now);
                existing
            }
            None => self.access.enroll(profile, now),
        };
        self.engine.submit(student, now)
    }

    /// Bind an uploaded signature image to a registered department.
    pub fn bind_inline(
        &self,
        upload: InlineUpload,
        now: DateTime<Utc>,
    ) -> Result<Signature, SignatureError> {
        let department_id = DepartmentId(upload.department_id.trim().to_string());
        if !department_id.0.is_empty() {
            match self.engine.department(&department_id) {
                Ok(_) => {}
                Err(ClearanceError::Registry(RegistryError::NotFound(id))) => {
                    return Err(SignatureError::UnknownDepartment(id));
                }
                Err(ClearanceError::Repository(inner)) => return Err(inner.into()),
                Err(other) => return Err(SignatureError::Validation(other.to_string())),
            }
        }
        self.signatures.bind_inline(upload, now)
    }

    pub fn document(
        &self,
        student_id: &StudentId,
        issued_on: NaiveDate,
    ) -> Result<ClearanceDocument, ClearanceError> {
        let aggregate = self.engine.aggregate(student_id)?;
        let signatures = self.signatures.store().all()?;
        Ok(document::render(
            &aggregate.student,
            &aggregate,
            &signatures,
            issued_on,
            &self.institution,
        ))
    }

    pub fn document_bundle(
        &self,
        student_id: &StudentId,
        now: DateTime<Utc>,
    ) -> Result<DocumentBundle, ClearanceError> {
        let aggregate = self.engine.aggregate(student_id)?;
        let signatures = self.signatures.store().all()?;
        Ok(document::bundle(
            &aggregate,
            &signatures,
            now,
            self.document_url(student_id),
        ))
    }

    pub fn statistics(&self, now: DateTime<Utc>) -> Result<ClearanceStatistics, ClearanceError> {
        let aggregates = self.engine.submitted_aggregates()?;
        let departments = self.engine.departments()?;
        Ok(stats::compute(&aggregates, &departments, now))
    }

    /// Inputs for an external signing bundle on one pending item.
    pub fn signing_request(
        &self,
        student_id: &StudentId,
        department_id: &DepartmentId,
    ) -> Result<ExternalBundleRequest, ClearanceError> {
        let aggregate = self.engine.aggregate(student_id)?;
        let department = self.engine.department(department_id)?;
        let entry = aggregate
            .item_for(department_id)
            .ok_or_else(|| ClearanceError::NotFound {
                entity: "clearance item",
                id: format!("{student_id}/{department_id}"),
            })?;
        Ok(ExternalBundleRequest {
            item: entry.item.clone(),
            student: aggregate.student.clone(),
            department,
            document_url: self.document_url(student_id),
        })
    }
}
