use serde::{Deserialize, Serialize};

use super::domain::DepartmentId;

/// Administrative office whose sign-off is required for clearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: DepartmentId,
    pub code: String,
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub officer_name: String,
    pub officer_email: String,
    pub display_order: u16,
    pub is_active: bool,
}

/// Partial update applied by department administration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentUpdate {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub description: Option<String>,
    pub officer_name: Option<String>,
    pub officer_email: Option<String>,
    pub display_order: Option<u16>,
    pub is_active: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("department '{0}' not found")]
    NotFound(DepartmentId),
    #[error("department '{0}' already exists")]
    Duplicate(DepartmentId),
    #[error("department {field} must not be empty")]
    MissingField { field: &'static str },
    #[error("department id '{0}' may only contain ASCII letters, digits and '_'")]
    InvalidId(DepartmentId),
}

/// Ordered lookup of departments. Changes are administrative and go through the
/// approval engine so reference checks against stored items stay in one place.
#[derive(Debug, Clone)]
pub struct DepartmentRegistry {
    departments: Vec<Department>,
}

impl DepartmentRegistry {
    pub fn standard() -> Self {
        Self::from_departments(standard_departments())
    }

    pub fn from_departments(departments: Vec<Department>) -> Self {
        let mut registry = Self { departments };
        registry.sort();
        registry
    }

    pub fn get(&self, id: &DepartmentId) -> Result<&Department, RegistryError> {
        self.departments
            .iter()
            .find(|department| &department.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Every department, active or not, in display order.
    pub fn list(&self) -> &[Department] {
        &self.departments
    }

    pub fn active(&self) -> impl Iterator<Item = &Department> {
        self.departments
            .iter()
            .filter(|department| department.is_active)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub(crate) fn insert(&mut self, department: Department) -> Result<&Department, RegistryError> {
        validate(&department)?;
        if self.get(&department.id).is_ok() {
            return Err(RegistryError::Duplicate(department.id));
        }
        let id = department.id.clone();
        self.departments.push(department);
        self.sort();
        self.get(&id)
    }

    pub(crate) fn update(
        &mut self,
        id: &DepartmentId,
        update: DepartmentUpdate,
    ) -> Result<&Department, RegistryError> {
        let department = self
            .departments
            .iter_mut()
            .find(|department| &department.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        let mut candidate = department.clone();
        if let Some(name) = update.name {
            candidate.name = name;
        }
        if let Some(full_name) = update.full_name {
            candidate.full_name = full_name;
        }
        if let Some(description) = update.description {
            candidate.description = description;
        }
        if let Some(officer_name) = update.officer_name {
            candidate.officer_name = officer_name;
        }
        if let Some(officer_email) = update.officer_email {
            candidate.officer_email = officer_email;
        }
        if let Some(display_order) = update.display_order {
            candidate.display_order = display_order;
        }
        if let Some(is_active) = update.is_active {
            candidate.is_active = is_active;
        }
        validate(&candidate)?;
        *department = candidate;

        self.sort();
        self.get(id)
    }

    pub(crate) fn remove(&mut self, id: &DepartmentId) -> Result<Department, RegistryError> {
        let position = self
            .departments
            .iter()
            .position(|department| &department.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        Ok(self.departments.remove(position))
    }

    fn sort(&mut self) {
        self.departments
            .sort_by(|a, b| (a.display_order, &a.id).cmp(&(b.display_order, &b.id)));
    }
}

impl Default for DepartmentRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn validate(department: &Department) -> Result<(), RegistryError> {
    if department.id.0.trim().is_empty() {
        return Err(RegistryError::MissingField { field: "id" });
    }
    // Item ids end in `-{department}`, so department ids stay hyphen-free.
    if !department
        .id
        .0
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(RegistryError::InvalidId(department.id.clone()));
    }
    if department.name.trim().is_empty() {
        return Err(RegistryError::MissingField { field: "name" });
    }
    if department.officer_name.trim().is_empty() {
        return Err(RegistryError::MissingField {
            field: "officerName",
        });
    }
    Ok(())
}

fn standard_departments() -> Vec<Department> {
    const STANDARD: &[(&str, &str, &str, &str, &str, &str, &str)] = &[
        (
            "cashier",
            "CASHIER",
            "Cashier",
            "Cashier's Office",
            "Financial Services & Payment Processing",
            "Ms. Ana Reyes",
            "ana.reyes@smcl.edu.ph",
        ),
        (
            "library",
            "LIBRARY",
            "Library",
            "Library Services",
            "Library Resources & Book Management",
            "Mr. Jose Dela Cruz",
            "jose.delacruz@smcl.edu.ph",
        ),
        (
            "guidance",
            "GUIDANCE",
            "Guidance",
            "Guidance Office",
            "Student Counseling & Support Services",
            "Dr. Carmen Lopez",
            "carmen.lopez@smcl.edu.ph",
        ),
        (
            "clinic",
            "CLINIC",
            "Clinic",
            "Health Services",
            "Health Services & Medical Records",
            "Nurse Maria Garcia",
            "maria.garcia@smcl.edu.ph",
        ),
        (
            "registrar",
            "REGISTRAR",
            "Registrar",
            "Registrar's Office",
            "Academic Records & Registration",
            "Ms. Rosa Martinez",
            "rosa.martinez@smcl.edu.ph",
        ),
    ];

    STANDARD
        .iter()
        .enumerate()
        .map(
            |(index, (id, code, name, full_name, description, officer, email))| Department {
                id: DepartmentId((*id).to_string()),
                code: (*code).to_string(),
                name: (*name).to_string(),
                full_name: (*full_name).to_string(),
                description: (*description).to_string(),
                officer_name: (*officer).to_string(),
                officer_email: (*email).to_string(),
                display_order: index as u16 + 1,
                is_active: true,
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn department(id: &str, order: u16) -> Department {
        Department {
            id: DepartmentId(id.to_string()),
            code: id.to_ascii_uppercase(),
            name: id.to_string(),
            full_name: format!("{id} office"),
            description: String::new(),
            officer_name: "Officer".to_string(),
            officer_email: String::new(),
            display_order: order,
            is_active: true,
        }
    }

    #[test]
    fn standard_registry_lists_five_departments_in_order() {
        let registry = DepartmentRegistry::standard();
        let codes: Vec<&str> = registry.list().iter().map(|d| d.code.as_str()).collect();
        assert_eq!(
            codes,
            vec!["CASHIER", "LIBRARY", "GUIDANCE", "CLINIC", "REGISTRAR"]
        );
        assert_eq!(registry.active_count(), 5);
    }

    #[test]
    fn insert_keeps_display_order() {
        let mut registry = DepartmentRegistry::from_departments(vec![
            department("b", 2),
            department("c", 3),
        ]);
        registry.insert(department("a", 1)).expect("insert succeeds");
        let ids: Vec<&str> = registry.list().iter().map(|d| d.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut registry = DepartmentRegistry::standard();
        let duplicate = department("library", 9);
        assert!(matches!(
            registry.insert(duplicate),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[test]
    fn update_validates_and_reorders() {
        let mut registry = DepartmentRegistry::standard();
        let id = DepartmentId("cashier".to_string());

        let blank = DepartmentUpdate {
            officer_name: Some("  ".to_string()),
            ..DepartmentUpdate::default()
        };
        assert!(matches!(
            registry.update(&id, blank),
            Err(RegistryError::MissingField { .. })
        ));
        assert_eq!(
            registry.get(&id).expect("still present").officer_name,
            "Ms. Ana Reyes"
        );

        let moved = DepartmentUpdate {
            display_order: Some(10),
            ..DepartmentUpdate::default()
        };
        registry.update(&id, moved).expect("update succeeds");
        assert_eq!(registry.list().last().map(|d| &d.id), Some(&id));
    }

    #[test]
    fn ids_are_limited_to_word_characters() {
        let mut registry = DepartmentRegistry::standard();
        for bad in ["b-cashier", "student affairs", "dean/office"] {
            assert!(matches!(
                registry.insert(department(bad, 9)),
                Err(RegistryError::InvalidId(_))
            ));
        }
        registry
            .insert(department("student_affairs", 9))
            .expect("underscores are allowed");
        assert_eq!(registry.list().len(), 6);
    }

    #[test]
    fn get_reports_unknown_department() {
        let registry = DepartmentRegistry::standard();
        assert!(matches!(
            registry.get(&DepartmentId("athletics".to_string())),
            Err(RegistryError::NotFound(_))
        ));
    }
}
