use crate::infra::{load_signature_image, parse_date};
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::Args;
use clearme::config::PortalConfig;
use clearme::error::AppError;
use clearme::workflows::clearance::{
    ClearanceAggregate, ClearanceDocument, ClearanceServices, DecisionAction, DecisionRequest,
    InlineUpload, PaymentStatus, StudentId, StudentProfile,
};
use std::path::PathBuf;

/// 1x1 transparent PNG used as the officers' signature in the demo.
const DEMO_SIGNATURE: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

const DEMO_BALANCE: u64 = 1_500;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Student id used for the walkthrough.
    #[arg(long, default_value = "2021-0001")]
    pub(crate) student_id: String,
    /// Date printed on the clearance form (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) issued_on: Option<NaiveDate>,
    /// Skip the cashier payment hold.
    #[arg(long)]
    pub(crate) skip_payment_hold: bool,
    /// Print the rendered HTML form after the summary.
    #[arg(long)]
    pub(crate) show_html: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RenderArgs {
    /// JSON file holding the student profile (camelCase fields).
    #[arg(long)]
    pub(crate) student_file: PathBuf,
    /// Signature image applied to every department; the items stay pending without it.
    #[arg(long)]
    pub(crate) signature_image: Option<PathBuf>,
    /// Date printed on the form (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) issued_on: Option<NaiveDate>,
    /// Write the HTML here instead of stdout.
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        student_id,
        issued_on,
        skip_payment_hold,
        show_html,
    } = args;
    let issued_on = issued_on.unwrap_or_else(|| Local::now().date_naive());
    let now = Utc::now();

    println!("Student clearance demo");
    let services = ClearanceServices::standalone(&PortalConfig::default());
    let payment_status = if skip_payment_hold {
        PaymentStatus::Cleared
    } else {
        PaymentStatus::Pending
    };
    let aggregate = services.submit(demo_student(&student_id, payment_status), now)?;
    println!(
        "- Submitted {} for {} ({} departments)",
        aggregate.student.clearance_id,
        aggregate.student.full_name,
        aggregate.items.len()
    );
    if let Ok(Some(student)) = services.engine.find_student(&aggregate.student.id) {
        println!(
            "  Access link: {}",
            services.access.link_for(&student.access.token)
        );
    }

    let departments = services.engine.active_departments()?;
    for department in &departments {
        services.bind_inline(
            InlineUpload {
                department_id: department.id.0.clone(),
                image_data: DEMO_SIGNATURE.to_string(),
                officer_name: department.officer_name.clone(),
                ..InlineUpload::default()
            },
            now,
        )?;
    }
    println!("- Bound signatures for {} officers", departments.len());

    if !skip_payment_hold {
        if let Some(cashier) = departments.first() {
            let held = services.engine.decide_for(
                &aggregate.student.id,
                &cashier.id,
                DecisionRequest::new(DecisionAction::RequirePayment {
                    amount: DEMO_BALANCE,
                }),
                now,
            )?;
            println!(
                "  {} placed a hold: {} (balance {})",
                cashier.name,
                held.item.status.label(),
                DEMO_BALANCE
            );
            services.engine.clear_payment(&aggregate.student.id, now)?;
            println!("  Payment cleared, {} item reopened", cashier.name);
        }
    }

    for department in &departments {
        let decided = services.engine.decide_for(
            &aggregate.student.id,
            &department.id,
            DecisionRequest::new(DecisionAction::Approve),
            now,
        )?;
        let progress = services.engine.aggregate(&aggregate.student.id)?.progress;
        println!(
            "- {} {} by {} | {}/{} ({}%)",
            department.name,
            decided.item.status.label(),
            decided.item.officer_name,
            progress.approved_count,
            progress.total,
            progress.percent()
        );
    }

    let document = services.document(&aggregate.student.id, issued_on)?;
    print_document_summary(&document);

    let statistics = services.statistics(now)?;
    println!(
        "Completion rate across {} student(s): {:.0}%",
        statistics.overall.total_students, statistics.overall.completion_rate
    );

    if show_html {
        println!("\n{}", document.html);
    }
    Ok(())
}

pub(crate) fn run_render(args: RenderArgs) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.student_file)?;
    let profile: StudentProfile = serde_json::from_str(&raw)?;
    let issued_on = args
        .issued_on
        .unwrap_or_else(|| Local::now().date_naive());
    let signature = args
        .signature_image
        .as_deref()
        .map(load_signature_image)
        .transpose()?;

    let services = ClearanceServices::standalone(&PortalConfig::default());
    let aggregate = render_clearance(&services, profile, signature, Utc::now())?;
    let document = services.document(&aggregate.student.id, issued_on)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &document.html)?;
            print_document_summary(&document);
            println!("Wrote {}", path.display());
        }
        None => println!("{}", document.html),
    }
    Ok(())
}

/// Submit the profile and, when a signature is given, approve every active department with it.
fn render_clearance(
    services: &ClearanceServices,
    profile: StudentProfile,
    signature: Option<String>,
    now: DateTime<Utc>,
) -> Result<ClearanceAggregate, AppError> {
    let aggregate = services.submit(profile, now)?;
    let Some(image_data) = signature else {
        return Ok(aggregate);
    };

    for department in services.engine.active_departments()? {
        services.bind_inline(
            InlineUpload {
                department_id: department.id.0.clone(),
                image_data: image_data.clone(),
                officer_name: department.officer_name.clone(),
                ..InlineUpload::default()
            },
            now,
        )?;
        services.engine.decide_for(
            &aggregate.student.id,
            &department.id,
            DecisionRequest::new(DecisionAction::Approve),
            now,
        )?;
    }
    Ok(services.engine.aggregate(&aggregate.student.id)?)
}

fn print_document_summary(document: &ClearanceDocument) {
    println!(
        "\nClearance form {} issued {}",
        document.clearance_id, document.issued_on
    );
    println!(
        "Signature slots filled: {}/{}",
        document.filled_slots, document.total_slots
    );
    for slot in &document.slots {
        let signed = slot
            .signed_on
            .map(|date| date.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}. {:<28} {:<16} {}",
            slot.number,
            slot.department_full_name,
            slot.status.label(),
            signed
        );
    }
}

fn demo_student(id: &str, payment_status: PaymentStatus) -> StudentProfile {
    StudentProfile {
        id: StudentId(id.to_string()),
        first_name: "Juan".to_string(),
        last_name: "Dela Cruz".to_string(),
        full_name: None,
        program: "Bachelor of Science in Information Technology".to_string(),
        section: "4A".to_string(),
        year_level: "4th Year".to_string(),
        email: format!("{id}@students.smcl.edu.ph"),
        contact_number: "09171234567".to_string(),
        address: "Biñan, Laguna".to_string(),
        enrollment_date: NaiveDate::from_ymd_opt(2021, 8, 16),
        expected_graduation: NaiveDate::from_ymd_opt(2025, 6, 20),
        payment_status,
    }
}
