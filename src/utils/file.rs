//! File utilities for keyword lists.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Read the keyword list for a run.
///
/// `.csv` files are read with a header row and the keyword taken from
/// `column` (zero-based). Any other file is one keyword per line, where blank
/// lines and lines starting with `#` are ignored. Duplicates keep their first
/// position.
pub fn read_keywords(path: &Path, column: usize) -> Result<Vec<String>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Keywords(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let raw = if is_csv(path) {
        read_csv_column(path, column)?
    } else {
        fs::read_to_string(path)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect()
    };

    let mut seen = HashSet::new();
    let keywords: Vec<String> = raw
        .into_iter()
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect();

    if keywords.is_empty() {
        return Err(ConfigError::Keywords(format!(
            "no keywords in {}",
            path.display()
        )));
    }

    Ok(keywords)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

fn read_csv_column(path: &Path, column: usize) -> Result<Vec<String>, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ConfigError::Keywords(e.to_string()))?;

    let mut keywords = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ConfigError::Keywords(e.to_string()))?;
        if let Some(value) = record.get(column) {
            let value = value.trim();
            if !value.is_empty() {
                keywords.push(value.to_string());
            }
        }
    }
    Ok(keywords)
}
