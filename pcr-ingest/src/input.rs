//! Seed list reader
//!
//! The seed list is a delimited text file. When the header row names the
//! configured column (case-insensitive), that column supplies the candidate
//! codes; otherwise the first field of every line does. Candidates are raw and
//! still need [`pcr_common::normalize_codes`].

use pcr_common::Result;
use std::path::Path;

/// Read candidate codes from `path`
pub fn read_codes(path: &Path, column: &str) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let candidates = parse_codes(&content, column);
    tracing::info!(
        path = %path.display(),
        candidates = candidates.len(),
        "Seed list loaded"
    );
    Ok(candidates)
}

/// Extract candidate codes from delimited text
pub fn parse_codes(content: &str, column: &str) -> Vec<String> {
    let mut lines = content
        .lines()
        .map(|line| line.trim_start_matches('\u{feff}'))
        .filter(|line| !line.trim().is_empty())
        .peekable();

    let Some(header) = lines.peek().copied() else {
        return Vec::new();
    };
    let delimiter = detect_delimiter(header);

    let position = split_fields(header, delimiter)
        .iter()
        .position(|field| field.eq_ignore_ascii_case(column));

    match position {
        Some(index) => lines
            .skip(1)
            .filter_map(|line| split_fields(line, delimiter).into_iter().nth(index))
            .filter(|field| !field.is_empty())
            .collect(),
        None => lines
            .filter_map(|line| split_fields(line, delimiter).into_iter().next())
            .filter(|field| !field.is_empty())
            .collect(),
    }
}

fn detect_delimiter(header: &str) -> char {
    [',', ';', '\t']
        .into_iter()
        .find(|d| header.contains(*d))
        .unwrap_or(',')
}

fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|field| field.trim().trim_matches('"').trim().to_string())
        .collect()
}
