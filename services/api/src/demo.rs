use crate::infra::{demo_portal, parse_class, parse_date};
use chrono::{Days, Local, NaiveDate};
use clap::Args;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use vaxportal::config::PortalConfig;
use vaxportal::error::AppError;
use vaxportal::workflows::reporting::{export, RecordSet, ReportFilters};
use vaxportal::workflows::vaccination::{
    ClassName, DriveDraft, InMemoryVaccinationStore, NewStudent, Section, VaccinationRequest,
    VaccinationService,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Override the demo's notion of today (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ReportArgs {
    /// Only include records for this vaccine
    #[arg(long)]
    pub(crate) vaccine_name: Option<String>,
    /// Only include students currently in this class (1-12)
    #[arg(long, value_parser = parse_class)]
    pub(crate) class_name: Option<ClassName>,
    /// Earliest vaccination date, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) start_date: Option<NaiveDate>,
    /// Latest vaccination date, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) end_date: Option<NaiveDate>,
    /// Write the report as CSV to this path instead of printing it
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
    /// Date used to schedule the demo dataset (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) fn run_report(args: ReportArgs) -> Result<(), AppError> {
    let ReportArgs {
        vaccine_name,
        class_name,
        start_date,
        end_date,
        output,
        today,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let service = demo_portal(today)?;
    let filters = ReportFilters {
        vaccine_name,
        class_name,
        start_date,
        end_date,
    };
    let set = service.report(&filters)?;

    match output {
        Some(path) => {
            let file = File::create(&path)?;
            export::write_csv(&set, file)?;
            println!("Wrote {} record(s) to {}", set.count, path.display());
        }
        None => render_report(&set),
    }

    Ok(())
}

fn render_report(set: &RecordSet) {
    println!("Vaccination report ({} record(s))", set.count);
    if set.records.is_empty() {
        println!("- no records match the given filters");
        return;
    }
    for row in &set.records {
        println!(
            "- {} | {} {} (class {}{}) | {} | {}",
            row.vaccination_date,
            row.student_id,
            row.student_name,
            row.class_name,
            row.section,
            row.vaccine_name,
            row.status
        );
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let config = PortalConfig::default();
    let lead_time = u64::from(config.lead_time_days);
    let service = VaccinationService::new(Arc::new(InMemoryVaccinationStore::new()), config);

    println!("School vaccination portal demo ({today})");

    let too_soon = DriveDraft {
        vaccine_name: "MMR".to_string(),
        date: today + Days::new(lead_time.saturating_sub(1)),
        available_doses: 2,
        applicable_classes: [5, 6].into_iter().filter_map(ClassName::new).collect::<BTreeSet<_>>(),
    };
    match service.create_drive(too_soon.clone(), today) {
        Ok(drive) => println!("- unexpected: drive {} scheduled early", drive.id),
        Err(err) => println!("- scheduling on {} refused: {} ({})", too_soon.date, err.code(), err),
    }

    let drive = service.create_drive(
        DriveDraft {
            date: today + Days::new(lead_time),
            ..too_soon
        },
        today,
    )?;
    println!(
        "- scheduled {} on {} with {} doses for classes 5 and 6",
        drive.vaccine_name, drive.date, drive.available_doses
    );

    let mut roster = Vec::new();
    for (code, grade) in [("S1", 5), ("S2", 7), ("S3", 6), ("S4", 5)] {
        let Some(class_name) = ClassName::new(grade) else {
            continue;
        };
        let student = service.create_student(NewStudent {
            student_id: code.to_string(),
            name: format!("Student {code}"),
            class_name,
            section: Section::A,
            age: Some(10 + grade),
            gender: None,
        })?;
        roster.push(student);
    }

    println!("\nRecording requests");
    for index in [0, 1, 0, 2, 3] {
        let student = &roster[index];
        let outcome = service.record_vaccination(VaccinationRequest {
            student_id: student.id,
            drive_id: drive.id,
            status: None,
            date: None,
        });
        match outcome {
            Ok(committed) => println!(
                "- {} (class {}): recorded, {} of {} doses used",
                student.student_id,
                student.class_name,
                committed.drive.used_doses,
                committed.drive.available_doses
            ),
            Err(err) => println!(
                "- {} (class {}): {} ({})",
                student.student_id,
                student.class_name,
                err.code(),
                err
            ),
        }
    }

    let drive = service.drive(drive.id)?;
    println!(
        "\n{} completion {} | {} remaining",
        drive.vaccine_name,
        drive.completion_label(),
        drive.remaining_doses()
    );

    let set = service.report(&ReportFilters::default())?;
    println!();
    render_report(&set);
    Ok(())
}
