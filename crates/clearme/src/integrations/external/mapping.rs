//! Field mapping between local records and the student-records backend.
//!
//! Every function here is pure; transport lives in `client`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::integrations::sync_log::{SyncDirection, SyncLogEntry, SyncStatus, SyncType};
use crate::workflows::clearance::{
    ClearanceItemId, ClearanceStatus, DepartmentClearance, PaymentStatus, Signature, Student,
    StudentId, StudentProfile,
};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhpStudentRecord {
    pub student_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub year_level: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub enrollment_date: String,
    #[serde(default)]
    pub expected_graduation: String,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub clearance_id: String,
    #[serde(default)]
    pub submitted_date: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub unique_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhpClearanceRecord {
    pub clearance_id: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub officer: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueink_bundle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueink_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhpSyncLogRecord {
    pub id: String,
    pub sync_type: String,
    pub direction: String,
    pub status: String,
    pub php_id: String,
    pub next_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: String,
    pub retry_count: u32,
}

/// Inbound clearance decision in local terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundClearance {
    pub item_id: ClearanceItemId,
    pub department: String,
    pub status: ClearanceStatus,
    pub officer: Option<String>,
    pub payment_amount: Option<u64>,
    pub remarks: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("external record is missing '{0}'")]
    MissingField(&'static str),
    #[error("unknown {field} value '{value}'")]
    UnknownValue { field: &'static str, value: String },
    #[error("invalid date in '{field}': '{value}'")]
    InvalidDate { field: &'static str, value: String },
}

pub fn student_to_external(student: &Student) -> PhpStudentRecord {
    PhpStudentRecord {
        student_id: student.id.0.clone(),
        first_name: student.first_name.clone(),
        last_name: student.last_name.clone(),
        full_name: student.full_name.clone(),
        program: student.program.clone(),
        section: student.section.clone(),
        year_level: student.year_level.clone(),
        email: student.email.clone(),
        contact_number: student.contact_number.clone(),
        address: student.address.clone(),
        enrollment_date: date_text(student.enrollment_date),
        expected_graduation: date_text(student.expected_graduation),
        payment_status: student.payment_status.label().to_string(),
        clearance_id: student.clearance_id.clone(),
        submitted_date: student
            .submitted_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_default(),
        last_updated: student.last_updated.to_rfc3339(),
        unique_token: student.access.token.clone(),
    }
}

pub fn student_from_external(record: &PhpStudentRecord) -> Result<StudentProfile, MappingError> {
    if record.student_id.trim().is_empty() {
        return Err(MappingError::MissingField("student_id"));
    }
    let payment_status = if record.payment_status.trim().is_empty() {
        PaymentStatus::Pending
    } else {
        PaymentStatus::parse(&record.payment_status).ok_or_else(|| MappingError::UnknownValue {
            field: "payment_status",
            value: record.payment_status.clone(),
        })?
    };

    Ok(StudentProfile {
        id: StudentId(record.student_id.trim().to_string()),
        first_name: record.first_name.clone(),
        last_name: record.last_name.clone(),
        full_name: Some(record.full_name.clone()).filter(|name| !name.trim().is_empty()),
        program: record.program.clone(),
        section: record.section.clone(),
        year_level: record.year_level.clone(),
        email: record.email.clone(),
        contact_number: record.contact_number.clone(),
        address: record.address.clone(),
        enrollment_date: parse_date("enrollment_date", &record.enrollment_date)?,
        expected_graduation: parse_date("expected_graduation", &record.expected_graduation)?,
        payment_status,
    })
}

pub fn clearance_to_external(
    entry: &DepartmentClearance,
    signature: Option<&Signature>,
) -> PhpClearanceRecord {
    let item = &entry.item;
    let (bundle_id, bundle_status) = match signature {
        Some(Signature::ExternalBundle(bundle)) => (
            Some(bundle.bundle_id.clone()),
            Some(if signature.is_some_and(Signature::is_complete) {
                "completed".to_string()
            } else {
                "pending".to_string()
            }),
        ),
        _ => (None, None),
    };

    PhpClearanceRecord {
        clearance_id: item.id.0.clone(),
        department: entry.department_name.clone(),
        officer: item.officer_name.clone(),
        description: entry.department_description.clone(),
        status: item.status.label().to_string(),
        payment_amount: item.payment_amount,
        signed_date: item.signed_date.map(|at| at.to_rfc3339()),
        signed_by: item.signature.as_ref().map(|s| s.officer_name.clone()),
        signature_image_url: None,
        blueink_bundle_id: bundle_id,
        blueink_status: bundle_status,
    }
}

pub fn clearance_from_external(
    record: &PhpClearanceRecord,
) -> Result<InboundClearance, MappingError> {
    if record.clearance_id.trim().is_empty() {
        return Err(MappingError::MissingField("clearance_id"));
    }
    let status =
        ClearanceStatus::parse(&record.status).ok_or_else(|| MappingError::UnknownValue {
            field: "status",
            value: record.status.clone(),
        })?;
    if let Some(signed) = record.signed_date.as_deref() {
        parse_timestamp("signed_date", signed)?;
    }

    Ok(InboundClearance {
        item_id: ClearanceItemId(record.clearance_id.trim().to_string()),
        department: record.department.clone(),
        status,
        officer: record
            .signed_by
            .clone()
            .or_else(|| Some(record.officer.clone()))
            .filter(|name| !name.trim().is_empty()),
        payment_amount: record.payment_amount,
        remarks: Some(record.description.clone()).filter(|d| !d.trim().is_empty()),
    })
}

pub fn sync_log_to_external(entry: &SyncLogEntry) -> PhpSyncLogRecord {
    let sync_type = match entry.sync_type {
        SyncType::Student => "student",
        SyncType::Clearance => "clearance",
        SyncType::Signature => "signature",
    };
    let direction = match entry.direction {
        SyncDirection::ToExternal => "to_php",
        SyncDirection::FromExternal => "from_php",
    };
    let status = match entry.status {
        SyncStatus::Success => "success",
        SyncStatus::Failed => "failed",
        SyncStatus::Pending => "pending",
    };

    PhpSyncLogRecord {
        id: entry.id.to_string(),
        sync_type: sync_type.to_string(),
        direction: direction.to_string(),
        status: status.to_string(),
        php_id: entry.external_id.clone(),
        next_id: entry.local_id.clone(),
        error_message: entry.error_message.clone(),
        timestamp: entry.timestamp.to_rfc3339(),
        retry_count: entry.retry_count,
    }
}

pub fn sync_log_from_external(record: &PhpSyncLogRecord) -> Result<SyncLogEntry, MappingError> {
    let sync_type = SyncType::parse(&record.sync_type).ok_or_else(|| MappingError::UnknownValue {
        field: "sync_type",
        value: record.sync_type.clone(),
    })?;
    let direction = match record.direction.as_str() {
        "to_php" => SyncDirection::ToExternal,
        "from_php" => SyncDirection::FromExternal,
        other => {
            return Err(MappingError::UnknownValue {
                field: "direction",
                value: other.to_string(),
            })
        }
    };
    let status = SyncStatus::parse(&record.status).ok_or_else(|| MappingError::UnknownValue {
        field: "status",
        value: record.status.clone(),
    })?;
    let id = record.id.parse().map_err(|_| MappingError::UnknownValue {
        field: "id",
        value: record.id.clone(),
    })?;

    Ok(SyncLogEntry {
        id,
        sync_type,
        direction,
        status,
        external_id: record.php_id.clone(),
        local_id: record.next_id.clone(),
        error_message: record.error_message.clone(),
        timestamp: parse_timestamp("timestamp", &record.timestamp)?,
        retry_count: record.retry_count,
    })
}

fn date_text(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp; blank means absent.
fn parse_date(field: &'static str, raw: &str) -> Result<Option<NaiveDate>, MappingError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    parse_timestamp(field, raw).map(|at| Some(at.date_naive()))
}

fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, MappingError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| MappingError::InvalidDate {
            field,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PhpStudentRecord {
        PhpStudentRecord {
            student_id: "2024-001".to_string(),
            first_name: "Juan".to_string(),
            last_name: "Dela Cruz".to_string(),
            program: "BS Computer Science".to_string(),
            section: "CS-4A".to_string(),
            year_level: "4th Year".to_string(),
            email: "juan@student.test".to_string(),
            enrollment_date: "2021-08-15".to_string(),
            expected_graduation: "2025-05-30T00:00:00Z".to_string(),
            payment_status: "cleared".to_string(),
            ..PhpStudentRecord::default()
        }
    }

    #[test]
    fn student_record_maps_to_profile() {
        let profile = student_from_external(&record()).expect("maps");
        assert_eq!(profile.id, StudentId("2024-001".to_string()));
        assert_eq!(profile.display_name(), "Juan Dela Cruz");
        assert_eq!(profile.payment_status, PaymentStatus::Cleared);
        assert_eq!(profile.enrollment_date, NaiveDate::from_ymd_opt(2021, 8, 15));
        assert_eq!(
            profile.expected_graduation,
            NaiveDate::from_ymd_opt(2025, 5, 30)
        );
    }

    #[test]
    fn unknown_payment_status_is_reported() {
        let mut bad = record();
        bad.payment_status = "waived".to_string();
        assert_eq!(
            student_from_external(&bad),
            Err(MappingError::UnknownValue {
                field: "payment_status",
                value: "waived".to_string(),
            })
        );
    }

    #[test]
    fn clearance_record_requires_known_status() {
        let record = PhpClearanceRecord {
            clearance_id: "clr-2024-001-library".to_string(),
            department: "Library".to_string(),
            officer: "Mr. Jose Dela Cruz".to_string(),
            status: "approved".to_string(),
            ..PhpClearanceRecord::default()
        };
        let inbound = clearance_from_external(&record).expect("maps");
        assert_eq!(inbound.status, ClearanceStatus::Approved);
        assert_eq!(inbound.officer.as_deref(), Some("Mr. Jose Dela Cruz"));

        let unknown = PhpClearanceRecord {
            status: "signed".to_string(),
            ..record
        };
        assert!(matches!(
            clearance_from_external(&unknown),
            Err(MappingError::UnknownValue { field: "status", .. })
        ));
    }

    #[test]
    fn sync_log_uses_external_direction_names() {
        let entry = SyncLogEntry::new(
            SyncType::Student,
            SyncDirection::FromExternal,
            SyncStatus::Failed,
            "2024-001",
            Utc::now(),
        )
        .with_error("timeout");
        let record = sync_log_to_external(&entry);
        assert_eq!(record.direction, "from_php");
        assert_eq!(record.next_id, "2024-001");

        let back = sync_log_from_external(&record).expect("maps back");
        assert_eq!(back.id, entry.id);
        assert_eq!(back.error_message.as_deref(), Some("timeout"));
    }
}
