use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ClearanceAggregate, ClearanceStatus, ClearanceSummary, DepartmentId, OverallStatus,
};
use super::engine::summarize;
use super::registry::Department;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStatistics {
    pub total_students: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub expired: usize,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStatistics {
    pub department_id: DepartmentId,
    pub name: String,
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub requires_payment: usize,
    /// Mean hours from submission to signature over approved items.
    pub avg_processing_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceStatistics {
    pub overall: OverallStatistics,
    pub departments: Vec<DepartmentStatistics>,
    pub generated_at: DateTime<Utc>,
}

pub fn compute(
    aggregates: &[ClearanceAggregate],
    departments: &[Department],
    now: DateTime<Utc>,
) -> ClearanceStatistics {
    let mut overall = OverallStatistics {
        total_students: aggregates.len(),
        pending: 0,
        in_progress: 0,
        completed: 0,
        expired: 0,
        completion_rate: 0.0,
    };
    for aggregate in aggregates {
        match summarize(aggregate, now).status {
            OverallStatus::Pending => overall.pending += 1,
            OverallStatus::InProgress => overall.in_progress += 1,
            OverallStatus::Completed => overall.completed += 1,
            OverallStatus::Expired => overall.expired += 1,
        }
    }
    if overall.total_students > 0 {
        overall.completion_rate =
            round_tenth(overall.completed as f64 * 100.0 / overall.total_students as f64);
    }

    let departments = departments
        .iter()
        .filter(|department| department.is_active)
        .map(|department| department_statistics(department, aggregates))
        .collect();

    ClearanceStatistics {
        overall,
        departments,
        generated_at: now,
    }
}

fn department_statistics(
    department: &Department,
    aggregates: &[ClearanceAggregate],
) -> DepartmentStatistics {
    let mut stats = DepartmentStatistics {
        department_id: department.id.clone(),
        name: department.name.clone(),
        total: 0,
        pending: 0,
        approved: 0,
        rejected: 0,
        requires_payment: 0,
        avg_processing_hours: None,
    };
    let mut hours = Vec::new();

    for entry in aggregates.iter().filter_map(|a| a.item_for(&department.id)) {
        let item = &entry.item;
        stats.total += 1;
        match item.status {
            ClearanceStatus::Pending => stats.pending += 1,
            ClearanceStatus::Approved => {
                stats.approved += 1;
                if let Some(signed) = item.signed_date {
                    let minutes = (signed - item.submitted_at).num_minutes().max(0);
                    hours.push(minutes as f64 / 60.0);
                }
            }
            ClearanceStatus::Rejected => stats.rejected += 1,
            ClearanceStatus::RequiresPayment => stats.requires_payment += 1,
        }
    }

    if !hours.is_empty() {
        let mean = hours.iter().sum::<f64>() / hours.len() as f64;
        stats.avg_processing_hours = Some(round_tenth(mean));
    }
    stats
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush csv: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv output is not utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// `Student ID,Name,Program,Status,Progress,Email` with every field quoted.
pub fn export_csv(rows: &[ClearanceSummary]) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(["Student ID", "Name", "Program", "Status", "Progress", "Email"])?;
    for row in rows {
        writer.write_record([
            row.student_id.0.as_str(),
            row.student_name.as_str(),
            row.program.as_str(),
            row.status.label(),
            format!("{}%", row.progress_percent).as_str(),
            row.email.as_str(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
