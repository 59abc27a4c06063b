use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::domain::{ClearanceItem, ClearanceItemId, DepartmentId, Student, StudentId};
use super::repository::{ClearanceStore, RepositoryError};

#[derive(Debug, Default)]
struct Tables {
    students: BTreeMap<StudentId, Student>,
    items: HashMap<ClearanceItemId, ClearanceItem>,
}

/// Process-local store used by the service binary and tests.
#[derive(Debug, Default)]
pub struct InMemoryClearanceStore {
    tables: Mutex<Tables>,
}

impl InMemoryClearanceStore {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("clearance store mutex poisoned".to_string()))
    }
}

impl ClearanceStore for InMemoryClearanceStore {
    fn insert_student(&self, student: Student) -> Result<Student, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.students.contains_key(&student.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.students.insert(student.id.clone(), student.clone());
        Ok(student)
    }

    fn update_student(&self, student: Student) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        match tables.students.get_mut(&student.id) {
            Some(existing) => {
                *existing = student;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        Ok(self.lock()?.students.get(id).cloned())
    }

    fn find_student_by_token(&self, token: &str) -> Result<Option<Student>, RepositoryError> {
        Ok(self
            .lock()?
            .students
            .values()
            .find(|student| student.access.token == token)
            .cloned())
    }

    fn students(&self) -> Result<Vec<Student>, RepositoryError> {
        Ok(self.lock()?.students.values().cloned().collect())
    }

    fn insert_items(&self, items: Vec<ClearanceItem>) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        let collides = items.iter().any(|item| {
            tables.items.contains_key(&item.id)
                || tables.items.values().any(|existing| {
                    existing.student_id == item.student_id
                        && existing.department_id == item.department_id
                })
        });
        if collides {
            return Err(RepositoryError::Conflict);
        }
        for item in items {
            tables.items.insert(item.id.clone(), item);
        }
        Ok(())
    }

    fn fetch_item(&self, id: &ClearanceItemId) -> Result<Option<ClearanceItem>, RepositoryError> {
        Ok(self.lock()?.items.get(id).cloned())
    }

    fn items_for_student(&self, id: &StudentId) -> Result<Vec<ClearanceItem>, RepositoryError> {
        Ok(self
            .lock()?
            .items
            .values()
            .filter(|item| &item.student_id == id)
            .cloned()
            .collect())
    }

    fn items_for_department(
        &self,
        id: &DepartmentId,
    ) -> Result<Vec<ClearanceItem>, RepositoryError> {
        let mut items: Vec<ClearanceItem> = self
            .lock()?
            .items
            .values()
            .filter(|item| &item.department_id == id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok(items)
    }

    fn replace_item(
        &self,
        mut item: ClearanceItem,
        expected_version: u64,
    ) -> Result<ClearanceItem, RepositoryError> {
        let mut tables = self.lock()?;
        let stored = tables
            .items
            .get_mut(&item.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepositoryError::VersionMismatch {
                expected: expected_version,
                found: stored.version,
            });
        }
        item.version = expected_version + 1;
        *stored = item.clone();
        Ok(item)
    }
}
