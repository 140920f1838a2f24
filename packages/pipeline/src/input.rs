//! Employment CSV reading and row validation.
//!
//! Rows that cannot become records are counted, never fatal. Only an
//! unreadable file or a missing header aborts.

use std::fs::File;
use std::io::Read;

use employment_map_analytics_models::QualityReport;
use employment_map_employment_models::{EmploymentRecord, RawEmploymentRow, RecordRejection};

use crate::PipelineError;
use crate::config::InputConfig;

/// Accepted records plus the input-side quality counters.
#[derive(Debug, Default)]
pub struct InputData {
    /// Records for the configured municipality and years.
    pub records: Vec<EmploymentRecord>,
    /// Counters filled so far (`records_*`, `other_municipality`,
    /// `other_year`, `invalid_postal_codes`, `non_positive_bonds`,
    /// `malformed_rows`).
    pub quality: QualityReport,
}

/// Reads the employment CSV configured in `config`.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if the file cannot be opened and
/// [`PipelineError::Csv`] if it has no readable header.
pub fn read_records(config: &InputConfig) -> Result<InputData, PipelineError> {
    let file = File::open(&config.path).map_err(|e| PipelineError::Io {
        path: config.path.clone(),
        source: e,
    })?;
    let data = read_records_from(file, config)?;

    log::info!(
        "Read {} rows from {}: {} accepted",
        data.quality.records_read,
        config.path.display(),
        data.quality.records_accepted
    );
    Ok(data)
}

/// Reads employment rows from any CSV source.
///
/// Commas and semicolons are both accepted as delimiters; the header line
/// decides.
///
/// # Errors
///
/// Returns [`PipelineError::Csv`] if the header cannot be read.
pub fn read_records_from<R: Read>(
    mut reader: R,
    config: &InputConfig,
) -> Result<InputData, PipelineError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| PipelineError::Io {
            path: config.path.clone(),
            source: e,
        })?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(&bytes))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes.as_slice());
    csv_reader.headers()?;

    let municipality = config.municipality_id.trim();
    let mut data = InputData::default();
    let quality = &mut data.quality;

    for (line, row) in csv_reader.deserialize::<RawEmploymentRow>().enumerate() {
        quality.records_read += 1;

        let row = match row {
            Ok(row) => row,
            Err(e) => {
                log::debug!("Skipping undecodable row {}: {e}", line + 2);
                quality.malformed_rows += 1;
                continue;
            }
        };

        if row.municipality_id.trim() != municipality {
            quality.other_municipality += 1;
            continue;
        }

        match row.into_record() {
            Ok(record) => {
                if config
                    .years
                    .as_ref()
                    .is_some_and(|years| !years.contains(&record.year))
                {
                    quality.other_year += 1;
                    continue;
                }
                quality.records_accepted += 1;
                data.records.push(record);
            }
            Err(RecordRejection::InvalidPostalCode(e)) => {
                log::debug!("Row {}: {e}", line + 2);
                quality.invalid_postal_codes += 1;
            }
            Err(RecordRejection::NonPositiveBonds { .. }) => {
                quality.non_positive_bonds += 1;
            }
            Err(e @ (RecordRejection::MalformedBonds { .. } | RecordRejection::MalformedYear { .. })) => {
                log::debug!("Row {}: {e}", line + 2);
                quality.malformed_rows += 1;
            }
        }
    }

    if quality.invalid_postal_codes > 0 {
        log::warn!(
            "{} rows with invalid postal codes excluded",
            quality.invalid_postal_codes
        );
    }
    if quality.malformed_rows > 0 {
        log::warn!("{} malformed rows excluded", quality.malformed_rows);
    }

    Ok(data)
}

/// Semicolon if the header line has more semicolons than commas.
fn detect_delimiter(bytes: &[u8]) -> u8 {
    let header = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let count = |c: u8| header.iter().filter(|b| **b == c).count();
    if count(b';') > count(b',') { b';' } else { b',' }
}
