use crate::config::ColumnAliases;
use crate::dates::DateNormalizer;
use crate::domain::{SampleKey, SampleRecord};
use crate::error::IngestError;
use crate::manifest::ManifestRow;

/// Builds [`SampleRecord`]s from manifest rows using one vendor's column
/// aliases.
#[derive(Debug, Clone)]
pub struct SampleExtractor {
    columns: ColumnAliases,
    dates: DateNormalizer,
}

impl SampleExtractor {
    pub fn new(columns: ColumnAliases, dates: DateNormalizer) -> Self {
        Self { columns, dates }
    }

    pub fn extract(&self, row: &ManifestRow) -> Result<SampleRecord, IngestError> {
        let columns = &self.columns;
        let text = |aliases: &[String]| row.first_non_empty(aliases).unwrap_or_default().to_string();

        let mp_number = text(&columns.mp_number);
        if mp_number.is_empty() {
            return Err(IngestError::MissingIdentifier { field: "MP No." });
        }
        let path_number = text(&columns.path_number);
        if path_number.is_empty() {
            return Err(IngestError::MissingIdentifier { field: "Path No." });
        }

        let fiscal_year = self.dates.fiscal_year(&path_number)?;
        // An unparseable primary column still lets a later alias supply the date.
        let date = |aliases: &[String]| {
            aliases
                .iter()
                .filter_map(|column| row.get(column))
                .find_map(|raw| self.dates.normalize(raw, fiscal_year))
        };

        Ok(SampleRecord {
            key: SampleKey::new(path_number, mp_number),
            patient_name: text(&columns.patient_name),
            history_number: text(&columns.history_number),
            block_number: text(&columns.block_number),
            tumor_purity: text(&columns.tumor_purity),
            diagnosis: text(&columns.diagnosis),
            test_item: text(&columns.test_item),
            physician: text(&columns.physician),
            fiscal_year,
            receive_date: date(&columns.receive_date),
            sign_date: date(&columns.sign_date),
            report_date: date(&columns.report_date),
            turnaround_time: text(&columns.turnaround_time),
        })
    }
}
