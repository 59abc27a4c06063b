use std::sync::{Mutex, MutexGuard};

use super::{Signature, SignatureStore};
use crate::workflows::clearance::domain::{DepartmentId, SignatureId};
use crate::workflows::clearance::repository::RepositoryError;

#[derive(Debug, Default)]
pub struct InMemorySignatureStore {
    entries: Mutex<Vec<Signature>>,
}

impl InMemorySignatureStore {
    fn lock(&self) -> Result<MutexGuard<'_, Vec<Signature>>, RepositoryError> {
        self.entries
            .lock()
            .map_err(|_| RepositoryError::Unavailable("signature store mutex poisoned".to_string()))
    }
}

impl SignatureStore for InMemorySignatureStore {
    fn append(&self, mut signature: Signature) -> Result<Signature, RepositoryError> {
        let mut entries = self.lock()?;
        if entries.iter().any(|existing| existing.id() == signature.id()) {
            return Err(RepositoryError::Conflict);
        }
        let next = entries
            .iter()
            .filter(|existing| existing.department_id() == signature.department_id())
            .map(Signature::version)
            .max()
            .unwrap_or(0)
            + 1;
        signature.set_version(next);
        entries.push(signature.clone());
        Ok(signature)
    }

    fn fetch(&self, id: &SignatureId) -> Result<Option<Signature>, RepositoryError> {
        Ok(self.lock()?.iter().find(|s| s.id() == id).cloned())
    }

    fn history(&self, department: &DepartmentId) -> Result<Vec<Signature>, RepositoryError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|s| s.department_id() == department)
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<Signature>, RepositoryError> {
        Ok(self.lock()?.clone())
    }

    fn find_bundle(&self, bundle_id: &str) -> Result<Option<Signature>, RepositoryError> {
        Ok(self
            .lock()?
            .iter()
            .find(|s| matches!(s, Signature::ExternalBundle(bundle) if bundle.bundle_id == bundle_id))
            .cloned())
    }

    fn replace(&self, signature: Signature) -> Result<(), RepositoryError> {
        let mut entries = self.lock()?;
        let slot = entries
            .iter_mut()
            .find(|existing| existing.id() == signature.id())
            .ok_or(RepositoryError::NotFound)?;
        let version = slot.version();
        *slot = signature;
        slot.set_version(version);
        Ok(())
    }
}
