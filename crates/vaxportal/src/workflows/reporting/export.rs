use std::io::Write;

use super::RecordSet;

pub const REPORT_FILENAME: &str = "vaccination_report.csv";

/// Column order matches the on-screen report table.
pub const REPORT_HEADER: [&str; 7] = [
    "student_id",
    "student_name",
    "class_name",
    "section",
    "vaccine_name",
    "vaccination_date",
    "status",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write report csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush report csv: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes the header followed by one line per row; an empty set yields only the header.
pub fn write_csv<W: Write>(set: &RecordSet, writer: W) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(REPORT_HEADER)?;

    for row in &set.records {
        let date = row.vaccination_date.format("%Y-%m-%d").to_string();
        csv_writer.write_record([
            row.student_id.as_str(),
            row.student_name.as_str(),
            row.class_name.as_str(),
            row.section.as_str(),
            row.vaccine_name.as_str(),
            date.as_str(),
            row.status.as_str(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn to_csv(set: &RecordSet) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Vec::new();
    write_csv(set, &mut buffer)?;
    Ok(buffer)
}
