//! Stateless export adapter for risk register snapshots.
//!
//! Both formats operate on a defensive copy with derived columns recomputed,
//! so a stale snapshot can never leak stale scores into an export and the
//! input table is never mutated.

use risk_register_core::RiskRegister;
use rust_xlsxwriter::Workbook;

pub const CSV_FILE_NAME: &str = "risks.csv";
pub const CSV_MIME: &str = "text/csv";
pub const XLSX_FILE_NAME: &str = "risks.xlsx";
pub const XLSX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const SHEET_NAME: &str = "Risk matrix";

pub const COLUMNS: [&str; 5] = [
    "description",
    "probability",
    "impact",
    "score",
    "classification",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv serialization failed: {0}")]
    Csv(String),
    #[error("spreadsheet serialization failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Csv => CSV_FILE_NAME,
            Self::Xlsx => XLSX_FILE_NAME,
        }
    }

    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Csv => CSV_MIME,
            Self::Xlsx => XLSX_MIME,
        }
    }
}

/// Serializes the register in the requested format.
///
/// # Errors
/// Returns [`ExportError`] when the underlying writer fails.
pub fn export(register: &RiskRegister, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Csv => export_csv(register),
        ExportFormat::Xlsx => export_xlsx(register),
    }
}

/// Serializes the register as semicolon-delimited UTF-8 text, header first.
///
/// # Errors
/// Returns [`ExportError::Csv`] when the writer fails.
pub fn export_csv(register: &RiskRegister) -> Result<Vec<u8>, ExportError> {
    let snapshot = recomputed_snapshot(register);

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());

    writer
        .write_record(COLUMNS)
        .map_err(|err| ExportError::Csv(err.to_string()))?;

    for entry in snapshot.entries() {
        writer
            .write_record([
                entry.description.as_str(),
                &entry.probability.to_string(),
                &entry.impact.to_string(),
                &entry.score.to_string(),
                entry.classification.as_str(),
            ])
            .map_err(|err| ExportError::Csv(err.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|err| ExportError::Csv(err.to_string()))
}

/// Serializes the register as a single-sheet XLSX workbook.
///
/// No formatting beyond the sheet name; consumers only need the cell values.
///
/// # Errors
/// Returns [`ExportError::Xlsx`] when workbook assembly fails.
pub fn export_xlsx(register: &RiskRegister) -> Result<Vec<u8>, ExportError> {
    let snapshot = recomputed_snapshot(register);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (column, header) in COLUMNS.iter().enumerate() {
        worksheet.write_string(0, column_index(column), *header)?;
    }

    for (index, entry) in snapshot.entries().iter().enumerate() {
        let row = row_index(index + 1);
        worksheet.write_string(row, 0, entry.description.as_str())?;
        worksheet.write_number(row, 1, f64::from(entry.probability))?;
        worksheet.write_number(row, 2, f64::from(entry.impact))?;
        worksheet.write_number(row, 3, f64::from(entry.score))?;
        worksheet.write_string(row, 4, entry.classification.as_str())?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn recomputed_snapshot(register: &RiskRegister) -> RiskRegister {
    let mut snapshot = register.clone();
    snapshot.recompute_all();
    snapshot
}

#[allow(clippy::cast_possible_truncation)]
fn row_index(index: usize) -> u32 {
    index as u32
}

#[allow(clippy::cast_possible_truncation)]
fn column_index(index: usize) -> u16 {
    index as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk_register_core::{classify, Classification, RiskEntry};

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    #[test]
    fn csv_round_trips_every_field() {
        let register = RiskRegister::default_set();
        let bytes = must(export_csv(&register));
        let body = must(String::from_utf8(bytes));

        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), register.len() + 1);
        assert_eq!(lines[0], "description;probability;impact;score;classification");

        for (line, entry) in lines[1..].iter().zip(register.entries()) {
            let fields: Vec<&str> = line.split(';').collect();
            assert_eq!(fields.len(), COLUMNS.len());
            assert_eq!(fields[0], entry.description);
            assert_eq!(fields[1], entry.probability.to_string());
            assert_eq!(fields[2], entry.impact.to_string());
            assert_eq!(fields[3], entry.score.to_string());
            assert_eq!(fields[4], entry.classification.as_str());
        }
    }

    #[test]
    fn csv_of_empty_register_is_header_only() {
        let bytes = must(export_csv(&RiskRegister::new()));
        let body = must(String::from_utf8(bytes));
        assert_eq!(body.lines().count(), 1);
    }

    #[test]
    fn export_recomputes_stale_derived_columns_without_mutating_input() {
        let mut handcrafted = RiskRegister::from_entries(vec![RiskEntry::new("stale row", 4, 4)]);
        // Make the derived columns stale via direct field edits.
        if let Some(row) = handcrafted.get_mut(0) {
            row.score = 1;
            row.classification = Classification::Low;
        }

        let bytes = must(export_csv(&handcrafted));
        let body = must(String::from_utf8(bytes));
        let row = body.lines().nth(1).map(ToString::to_string);
        let row = match row {
            Some(value) => value,
            None => panic!("expected one data row"),
        };
        assert!(row.contains(";16;"));
        assert!(row.ends_with(classify(16).as_str()));

        // Input still holds the stale values.
        let input_row = match handcrafted.get(0) {
            Some(value) => value,
            None => panic!("input row missing"),
        };
        assert_eq!(input_row.score, 1);
        assert_eq!(input_row.classification, Classification::Low);
    }

    #[test]
    fn xlsx_output_is_a_zip_container() {
        let bytes = must(export_xlsx(&RiskRegister::default_set()));
        // XLSX is a ZIP archive; PK magic is enough of a smoke check here.
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[0..2], b"PK");
    }

    #[test]
    fn format_metadata_matches_download_conventions() {
        assert_eq!(ExportFormat::Csv.file_name(), "risks.csv");
        assert_eq!(ExportFormat::Xlsx.file_name(), "risks.xlsx");
        assert_eq!(
            ExportFormat::Xlsx.mime(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
    }
}
