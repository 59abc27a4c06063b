use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for enrolled students (the institution's student number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// Identifier wrapper for administrative departments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

/// Identifier for a single (student, department) clearance record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClearanceItemId(pub String);

/// Identifier for a bound officer signature (inline image or external bundle).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignatureId(pub String);

impl ClearanceItemId {
    /// Items are keyed by their (student, department) pair so a second insert for the
    /// same pair always collides.
    pub fn for_pair(student: &StudentId, department: &DepartmentId) -> Self {
        Self(format!("clr-{}-{}", student.0, department.0))
    }
}

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_inner!(StudentId, DepartmentId, ClearanceItemId, SignatureId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Cleared,
    Pending,
    Overdue,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Cleared => "cleared",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Overdue => "overdue",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cleared" => Some(Self::Cleared),
            "pending" => Some(Self::Pending),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

/// Verdict recorded by one department on one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceStatus {
    Pending,
    Approved,
    Rejected,
    RequiresPayment,
}

impl ClearanceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ClearanceStatus::Pending => "pending",
            ClearanceStatus::Approved => "approved",
            ClearanceStatus::Rejected => "rejected",
            ClearanceStatus::RequiresPayment => "requires_payment",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "requires_payment" => Some(Self::RequiresPayment),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ClearanceStatus::Approved | ClearanceStatus::Rejected)
    }
}

impl fmt::Display for ClearanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque per-student portal token with a fixed validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub token: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Identity and academic profile supplied at enrollment or import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: StudentId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub program: String,
    pub section: String,
    pub year_level: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub enrollment_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_graduation: Option<NaiveDate>,
    #[serde(default = "default_payment_status")]
    pub payment_status: PaymentStatus,
}

fn default_payment_status() -> PaymentStatus {
    PaymentStatus::Pending
}

impl StudentProfile {
    pub fn display_name(&self) -> String {
        match self.full_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{} {}", self.first_name.trim(), self.last_name.trim())
                .trim()
                .to_string(),
        }
    }
}

/// Stored student record: profile plus portal access and lifecycle timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub program: String,
    pub section: String,
    pub year_level: String,
    pub email: String,
    pub contact_number: String,
    pub address: String,
    pub enrollment_date: Option<NaiveDate>,
    pub expected_graduation: Option<NaiveDate>,
    pub payment_status: PaymentStatus,
    pub clearance_id: String,
    pub access: AccessToken,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Student {
    pub fn from_profile(profile: StudentProfile, access: AccessToken, now: DateTime<Utc>) -> Self {
        let full_name = profile.display_name();
        let clearance_id = clearance_reference(&profile.id, now);
        Self {
            id: profile.id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            full_name,
            program: profile.program,
            section: profile.section,
            year_level: profile.year_level,
            email: profile.email,
            contact_number: profile.contact_number,
            address: profile.address,
            enrollment_date: profile.enrollment_date,
            expected_graduation: profile.expected_graduation,
            payment_status: profile.payment_status,
            clearance_id,
            access,
            created_at: now,
            last_updated: now,
            submitted_at: None,
        }
    }

    /// Overwrite the profile fields while keeping access and lifecycle data.
    pub fn apply_profile(&mut self, profile: StudentProfile, now: DateTime<Utc>) {
        self.full_name = profile.display_name();
        self.first_name = profile.first_name;
        self.last_name = profile.last_name;
        self.program = profile.program;
        self.section = profile.section;
        self.year_level = profile.year_level;
        self.email = profile.email;
        self.contact_number = profile.contact_number;
        self.address = profile.address;
        self.enrollment_date = profile.enrollment_date;
        self.expected_graduation = profile.expected_graduation;
        self.payment_status = profile.payment_status;
        self.last_updated = now;
    }
}

/// `CLR-<year>-<student number>`, zero padded to three digits for short ids.
fn clearance_reference(id: &StudentId, now: DateTime<Utc>) -> String {
    format!("CLR-{}-{:0>3}", now.format("%Y"), id.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    Inline,
    ExternalBundle,
}

/// Snapshot of the signature applied to an approval. Later re-binding never rewrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRef {
    pub signature_id: SignatureId,
    pub kind: SignatureKind,
    pub officer_name: String,
    pub version: u32,
}

/// One department's verdict on one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceItem {
    pub id: ClearanceItemId,
    pub student_id: StudentId,
    pub department_id: DepartmentId,
    pub officer_name: String,
    pub status: ClearanceStatus,
    pub signed_date: Option<DateTime<Utc>>,
    pub signature: Option<SignatureRef>,
    pub remarks: Option<String>,
    pub payment_amount: Option<u64>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl ClearanceItem {
    pub fn pending(
        student: &StudentId,
        department: &DepartmentId,
        officer_name: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ClearanceItemId::for_pair(student, department),
            student_id: student.clone(),
            department_id: department.clone(),
            officer_name: officer_name.to_string(),
            status: ClearanceStatus::Pending,
            signed_date: None,
            signature: None,
            remarks: None,
            payment_amount: None,
            submitted_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

/// Progress summary derived from the current items; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceProgress {
    pub approved_count: usize,
    pub total: usize,
    pub is_complete: bool,
}

impl ClearanceProgress {
    pub fn from_statuses<I>(statuses: I, total: usize) -> Self
    where
        I: IntoIterator<Item = ClearanceStatus>,
    {
        let approved_count = statuses
            .into_iter()
            .filter(|status| *status == ClearanceStatus::Approved)
            .count();
        Self {
            approved_count,
            total,
            is_complete: total > 0 && approved_count == total,
        }
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.approved_count * 100) / self.total) as u8
    }
}

/// A clearance item annotated with the department data needed for display and sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentClearance {
    #[serde(flatten)]
    pub item: ClearanceItem,
    pub department_name: String,
    pub department_full_name: String,
    pub department_description: String,
    pub display_order: u16,
}

/// A student's full clearance: items in administrative display order plus progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceAggregate {
    pub student: Student,
    pub items: Vec<DepartmentClearance>,
    pub progress: ClearanceProgress,
}

impl ClearanceAggregate {
    pub fn item_for(&self, department: &DepartmentId) -> Option<&DepartmentClearance> {
        self.items
            .iter()
            .find(|entry| &entry.item.department_id == department)
    }
}

/// Student-level rollup used by dashboards and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
}

impl OverallStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OverallStatus::Pending => "pending",
            OverallStatus::InProgress => "in_progress",
            OverallStatus::Completed => "completed",
            OverallStatus::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Completion wins over expiry; an expired link only matters while work remains.
    pub fn derive(
        progress: &ClearanceProgress,
        statuses: &[ClearanceStatus],
        access: &AccessToken,
        now: DateTime<Utc>,
    ) -> Self {
        if progress.is_complete {
            OverallStatus::Completed
        } else if access.is_expired(now) {
            OverallStatus::Expired
        } else if statuses
            .iter()
            .any(|status| *status != ClearanceStatus::Pending)
        {
            OverallStatus::InProgress
        } else {
            OverallStatus::Pending
        }
    }
}

/// Row returned by the clearance listing and the CSV export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceSummary {
    pub student_id: StudentId,
    pub student_name: String,
    pub program: String,
    pub year_level: String,
    pub email: String,
    pub submitted_date: Option<DateTime<Utc>>,
    pub status: OverallStatus,
    pub approved_count: usize,
    pub total_required: usize,
    pub progress_percent: u8,
}
