//! Append-only CSV output.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::OutputError;
use crate::models::OutputRow;

/// Appends product rows to the output table.
///
/// Rows of one product are encoded up front and reach the file in a single
/// write, synced before `append_rows` returns. A write that fails part way
/// is cut back off, so the file only ever holds whole products.
pub struct OutputWriter {
    file: File,
    rows_written: usize,
}

impl OutputWriter {
    /// Open for appending, writing the header if the file is new or empty.
    ///
    /// An existing file whose header differs is rejected rather than mixed.
    pub fn open(path: &Path) -> Result<Self, OutputError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        if !is_new {
            check_header(path)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = Self {
            file,
            rows_written: 0,
        };

        if is_new {
            let mut header = csv::WriterBuilder::new().from_writer(Vec::new());
            header.write_record(OutputRow::HEADER)?;
            writer.write_chunk(&into_bytes(header)?)?;
        }
        Ok(writer)
    }

    /// Rows appended through this writer.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Append every row of one product, then sync.
    pub fn append_rows(&mut self, rows: &[OutputRow]) -> Result<usize, OutputError> {
        let mut encoder = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for row in rows {
            encoder.serialize(row)?;
        }
        self.write_chunk(&into_bytes(encoder)?)?;

        self.rows_written += rows.len();
        Ok(rows.len())
    }

    fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), OutputError> {
        let start = self.file.metadata()?.len();
        let written = self
            .file
            .write_all(bytes)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            if let Err(trim) = self.file.set_len(start) {
                tracing::warn!(error = %trim, "could not remove partially written rows");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Product ids present in an output file with their row counts, in
    /// first-appearance order. A missing file yields an empty list.
    pub fn row_counts(path: &Path) -> Result<Vec<(String, usize)>, OutputError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in reader.records() {
            let record = record?;
            let Some(id) = record.get(0).map(str::trim).filter(|id| !id.is_empty()) else {
                continue;
            };
            match index.get(id) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(id.to_string(), counts.len());
                    counts.push((id.to_string(), 1));
                }
            }
        }
        Ok(counts)
    }
}

fn into_bytes(encoder: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, OutputError> {
    encoder
        .into_inner()
        .map_err(|e| OutputError::IoError(e.into_error()))
}

fn check_header(path: &Path) -> Result<(), OutputError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?;
    let matches = headers.len() == OutputRow::HEADER.len()
        && headers
            .iter()
            .zip(OutputRow::HEADER.iter())
            .all(|(a, b)| a == *b);
    if matches {
        Ok(())
    } else {
        Err(OutputError::HeaderMismatch(path.display().to_string()))
    }
}
