//! # Batch Data Loading
//!
//! Reads tab-separated submission files and writes tab-separated assessment files.
//! Loading is deliberately shallow: every row becomes a `RawSubmission` keyed by the
//! header, and all type checking is left to the record validation every single
//! submission goes through anyway. A bad row therefore yields a per-row error in the
//! output instead of aborting the whole batch.
//!
//! - Header required: column names are the submission keys (`A1_Score`, `age`, ...).
//! - Empty cells count as missing values.
//! - A row whose cell count differs from the header, or with a cell that is not
//!   UTF-8, is kept as an `InputError::Malformed` in its own slot.

use crate::assess::ScoringResponse;
use crate::record::{InputError, ParsedSubmission, RawSubmission};
use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

/// A comprehensive error type for batch file failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to read or write tab-separated data: {0}")]
    CsvError(#[from] csv::Error),
    #[error("The input file has no header row. The first line must name the columns.")]
    MissingHeader,
}

/// Loads every row of a TSV file, one entry per data row.
pub fn load_submissions(path: impl AsRef<Path>) -> Result<Vec<ParsedSubmission>, DataError> {
    let path = path.as_ref();
    log::info!("Loading submissions from '{}'", path.display());
    let rows = read_submissions(File::open(path)?)?;
    let unreadable = rows.iter().filter(|row| row.is_err()).count();
    log::info!("Loaded {} submissions ({unreadable} unreadable)", rows.len());
    Ok(rows)
}

/// Reads submissions from any TSV source. Only a missing header or a failing
/// reader is an error for the whole file.
pub fn read_submissions<R: Read>(source: R) -> Result<Vec<ParsedSubmission>, DataError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(DataError::MissingHeader);
    }

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        rows.push(parse_row(&headers, &record?));
    }
    Ok(rows)
}

fn parse_row(headers: &[String], record: &ByteRecord) -> ParsedSubmission {
    if record.len() != headers.len() {
        return Err(InputError::Malformed(format!(
            "the row has {} cells but the header names {} columns",
            record.len(),
            headers.len()
        )));
    }
    let mut cells = Vec::with_capacity(record.len());
    for (header, bytes) in headers.iter().zip(record.iter()) {
        let text = std::str::from_utf8(bytes).map_err(|_| {
            InputError::Malformed(format!("the cell in column '{header}' is not valid UTF-8"))
        })?;
        cells.push((header.as_str(), text));
    }
    Ok(RawSubmission::from_text_pairs(cells))
}

/// Writes one output row per response: `row, probability, risk_level, error`.
/// Rows are numbered from 1 in input order.
pub fn write_assessments<W: Write>(
    sink: W,
    responses: &[ScoringResponse],
) -> Result<(), DataError> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(sink);
    writer.write_record(["row", "probability", "risk_level", "error"])?;

    for (i, response) in responses.iter().enumerate() {
        let row = (i + 1).to_string();
        match response {
            ScoringResponse::Assessment(a) => {
                let probability = format!("{:.6}", a.probability());
                writer.write_record([
                    row.as_str(),
                    probability.as_str(),
                    a.risk_level().label(),
                    "",
                ])?;
            }
            ScoringResponse::Error { error } => {
                writer.write_record([row.as_str(), "", "", error.message.as_str()])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Writes assessments to a file at `path`.
pub fn save_assessments(
    path: impl AsRef<Path>,
    responses: &[ScoringResponse],
) -> Result<(), DataError> {
    write_assessments(File::create(path)?, responses)
}
