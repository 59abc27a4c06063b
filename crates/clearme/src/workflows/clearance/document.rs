//! Printable clearance form. Rendering is a pure projection of its inputs: the same
//! student, aggregate, signatures and issue date always produce the same bytes.

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::domain::{ClearanceAggregate, ClearanceStatus, DepartmentId, SignatureId, Student};
use super::signature::{BundleSigner, Signature};

/// Fixed institutional text printed on every form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstitutionProfile {
    pub name: String,
    pub address: String,
    pub title: String,
    pub certification: String,
    pub notices: Vec<(String, String)>,
    pub form_code: String,
    pub revision: String,
}

impl Default for InstitutionProfile {
    fn default() -> Self {
        Self {
            name: "SAINT MICHAEL'S COLLEGE OF LAGUNA".to_string(),
            address: "OLD NATIONAL ROAD, PLATERO, CITY OF BIÑAN, LAGUNA".to_string(),
            title: "STUDENT'S CLEARANCE".to_string(),
            certification: "I hereby certify that the above named student has satisfactorily \
                complied with all the requirements and is free from all money property \
                accountabilities in my subjects/units/department."
                .to_string(),
            notices: vec![
                (
                    "For Basic Education Division".to_string(),
                    "Please surrender at the Principal's/Vice Principal's/Administrator's Office."
                        .to_string(),
                ),
                (
                    "For Tertiary Education Division".to_string(),
                    "Please surrender at the Registrar's Center.".to_string(),
                ),
            ],
            form_code: "F-CRO-18".to_string(),
            revision: "Rev (10/08/14/23)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSlot {
    pub number: usize,
    pub department_id: DepartmentId,
    pub department_full_name: String,
    pub officer_name: String,
    pub status: ClearanceStatus,
    pub signed_on: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub signature_id: Option<SignatureId>,
    pub filled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceDocument {
    pub student_id: String,
    pub clearance_id: String,
    pub issued_on: NaiveDate,
    pub slots: Vec<SignatureSlot>,
    pub filled_slots: usize,
    pub total_slots: usize,
    pub html: String,
}

pub fn render(
    student: &Student,
    aggregate: &ClearanceAggregate,
    signatures: &[Signature],
    issued_on: NaiveDate,
    profile: &InstitutionProfile,
) -> ClearanceDocument {
    let slots: Vec<SignatureSlot> = aggregate
        .items
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let item = &entry.item;
            let filled = item.status == ClearanceStatus::Approved && item.signature.is_some();
            SignatureSlot {
                number: index + 1,
                department_id: item.department_id.clone(),
                department_full_name: entry.department_full_name.clone(),
                officer_name: item.officer_name.clone(),
                status: item.status,
                signed_on: item.signed_date.map(|signed| signed.date_naive()),
                remarks: item.remarks.clone(),
                signature_id: item.signature.as_ref().map(|s| s.signature_id.clone()),
                filled,
            }
        })
        .collect();

    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(
        html,
        "<title>{} - {}</title>",
        escape_html(&profile.title),
        escape_html(&student.full_name)
    );
    html.push_str(STYLE);
    html.push_str("</head>\n<body>\n<div class=\"form\">\n");

    let _ = writeln!(
        html,
        "<div class=\"header\">\n<h1>{}</h1>\n<p class=\"address\">{}</p>\n<h2>{}</h2>\n</div>",
        escape_html(&profile.name),
        escape_html(&profile.address),
        escape_html(&profile.title)
    );

    html.push_str("<table class=\"info\">\n");
    let issued = issued_on.format("%B %-d, %Y").to_string();
    info_row(
        &mut html,
        ("Name of Student", student.full_name.as_str()),
        ("Date", issued.as_str()),
    );
    info_row(
        &mut html,
        ("Program/Major/Grade", student.program.as_str()),
        ("Year Level", student.year_level.as_str()),
    );
    info_row(
        &mut html,
        ("Section", student.section.as_str()),
        ("Clearance No.", student.clearance_id.as_str()),
    );
    html.push_str("</table>\n");

    let _ = writeln!(
        html,
        "<p class=\"certification\">{}</p>",
        escape_html(&profile.certification)
    );

    html.push_str("<ol class=\"slots\">\n");
    for slot in &slots {
        render_slot(&mut html, slot, signatures);
    }
    html.push_str("</ol>\n");

    html.push_str("<div class=\"notices\">\n<p><strong>IMPORTANT:</strong></p>\n");
    for (division, notice) in &profile.notices {
        let _ = writeln!(
            html,
            "<p><strong>{}:</strong> {}</p>",
            escape_html(division),
            escape_html(notice)
        );
    }
    html.push_str("</div>\n");

    let _ = writeln!(
        html,
        "<div class=\"footer\">{}<br>{}</div>",
        escape_html(&profile.form_code),
        escape_html(&profile.revision)
    );
    html.push_str("</div>\n</body>\n</html>\n");

    let filled_slots = slots.iter().filter(|slot| slot.filled).count();
    ClearanceDocument {
        student_id: student.id.0.clone(),
        clearance_id: student.clearance_id.clone(),
        issued_on,
        total_slots: slots.len(),
        filled_slots,
        slots,
        html,
    }
}

const STYLE: &str = "<style>\n\
body { font-family: Arial, sans-serif; margin: 20px; }\n\
.header { text-align: center; margin-bottom: 24px; }\n\
.info { width: 100%; border-collapse: collapse; margin-bottom: 16px; }\n\
.info td { padding: 4px 8px; }\n\
.slot { border: 1px solid #ccc; padding: 8px; margin: 8px 0; }\n\
.approved { background-color: #d4edda; }\n\
.pending { background-color: #fff3cd; }\n\
.rejected { background-color: #f8d7da; }\n\
.requires_payment { background-color: #ffe5b4; }\n\
.signature img { max-height: 60px; }\n\
.footer { text-align: center; margin-top: 30px; font-size: 12px; }\n\
</style>\n";

fn info_row(html: &mut String, left: (&str, &str), right: (&str, &str)) {
    let _ = writeln!(
        html,
        "<tr><td><strong>{}:</strong> {}</td><td><strong>{}:</strong> {}</td></tr>",
        escape_html(left.0),
        escape_html(left.1),
        escape_html(right.0),
        escape_html(right.1)
    );
}

fn render_slot(html: &mut String, slot: &SignatureSlot, signatures: &[Signature]) {
    let _ = writeln!(
        html,
        "<li class=\"slot {}\">\n<p><strong>{}</strong></p>",
        slot.status.label(),
        escape_html(&slot.department_full_name)
    );

    let signature = slot
        .signature_id
        .as_ref()
        .and_then(|id| signatures.iter().find(|s| s.id() == id));
    html.push_str("<div class=\"signature\">");
    match (slot.filled, signature) {
        (true, Some(Signature::Inline(inline))) => {
            let _ = write!(
                html,
                "<img src=\"{}\" alt=\"Signature of {}\">",
                escape_html(&inline.image.data_uri),
                escape_html(&slot.officer_name)
            );
        }
        (true, Some(Signature::ExternalBundle(bundle))) => {
            let _ = write!(
                html,
                "<span class=\"esign\">Signed electronically (bundle {})</span>",
                escape_html(&bundle.bundle_id)
            );
        }
        (true, None) => html.push_str("<span class=\"esign\">Signed</span>"),
        (false, _) => html.push_str("&nbsp;"),
    }
    html.push_str("</div>\n");

    let _ = writeln!(
        html,
        "<p>{}<br><em>(Signature over Printed Name)</em></p>",
        escape_html(&slot.officer_name)
    );
    let _ = writeln!(html, "<p>Status: {}</p>", slot.status.label().to_uppercase());
    if let Some(signed_on) = slot.signed_on {
        let _ = writeln!(html, "<p>Signed: {}</p>", signed_on.format("%Y-%m-%d"));
    }
    if let Some(remarks) = &slot.remarks {
        let _ = writeln!(html, "<p>Remarks: {}</p>", escape_html(remarks));
    }
    html.push_str("</li>\n");
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureSource {
    Manual,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSignature {
    #[serde(rename = "type")]
    pub source: SignatureSource,
    pub department: String,
    pub officer: String,
    pub signature_id: SignatureId,
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signers: Vec<BundleSigner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// Metadata for a generated document combining manual and external signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentBundle {
    pub student_name: String,
    pub clearance_id: String,
    pub generated_at: DateTime<Utc>,
    pub signatures: Vec<DocumentSignature>,
    pub signature_count: usize,
    pub manual_signatures: usize,
    pub external_signatures: usize,
    pub download_url: String,
}

/// Collect the signatures stamped on approved items. Bundles count only once complete.
pub fn bundle(
    aggregate: &ClearanceAggregate,
    signatures: &[Signature],
    generated_at: DateTime<Utc>,
    download_url: String,
) -> DocumentBundle {
    let mut collected = Vec::new();
    for entry in &aggregate.items {
        let Some(reference) = &entry.item.signature else {
            continue;
        };
        let Some(signature) = signatures.iter().find(|s| s.id() == &reference.signature_id)
        else {
            continue;
        };
        match signature {
            Signature::Inline(inline) => collected.push(DocumentSignature {
                source: SignatureSource::Manual,
                department: entry.department_name.clone(),
                officer: inline.officer_name.clone(),
                signature_id: inline.id.clone(),
                signed_at: entry.item.signed_date,
                bundle_id: None,
                signers: Vec::new(),
                download_url: None,
            }),
            Signature::ExternalBundle(external) if signature.is_complete() => {
                collected.push(DocumentSignature {
                    source: SignatureSource::External,
                    department: entry.department_name.clone(),
                    officer: external.officer_name.clone(),
                    signature_id: external.id.clone(),
                    signed_at: entry.item.signed_date,
                    bundle_id: Some(external.bundle_id.clone()),
                    signers: external.signers.clone(),
                    download_url: external.download_url.clone(),
                })
            }
            Signature::ExternalBundle(_) => {}
        }
    }

    let manual_signatures = collected
        .iter()
        .filter(|s| s.source == SignatureSource::Manual)
        .count();
    DocumentBundle {
        student_name: aggregate.student.full_name.clone(),
        clearance_id: aggregate.student.clearance_id.clone(),
        generated_at,
        signature_count: collected.len(),
        manual_signatures,
        external_signatures: collected.len() - manual_signatures,
        signatures: collected,
        download_url,
    }
}
