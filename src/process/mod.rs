// src/process/mod.rs
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use std::{fs, path::Path};
use tracing::{debug, trace};

pub mod convert;
pub mod header;
pub mod utils;

use header::{has_unnamed_marker, normalize_header, HeaderConvention, HeaderOptions};
use utils::{clean_str, sniff_delimiter};

#[derive(Debug)]
pub struct RawTable {
    /// Base name of the source file.
    pub file_name: String,
    /// Header convention the file was read with.
    pub convention: HeaderConvention,
    /// Canonical column names, one per cell of every row.
    pub headers: Vec<String>,
    /// Cleaned data cells, padded to `headers.len()`.
    pub rows: Vec<Vec<String>>,
}

/// How to read one export.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions<'a> {
    /// `None` detects the convention per file.
    pub convention: Option<HeaderConvention>,
    /// `None` sniffs the delimiter per file.
    pub delimiter: Option<u8>,
    pub header: HeaderOptions<'a>,
}

/// Read one export from disk. See [`parse_export`].
#[tracing::instrument(level = "debug", skip(path, opts), fields(path = %path.as_ref().display()))]
pub fn read_export<P: AsRef<Path>>(path: P, opts: &ReadOptions<'_>) -> Result<RawTable> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    parse_export(&file_name, &bytes, opts)
}

/// Parse an export's bytes:
/// - decode UTF-8 (BOM tolerated),
/// - split records on the configured or sniffed delimiter,
/// - drop blank rows and the leading title/banner rows,
/// - pick the header convention and normalize the header,
/// - check every data row against the header width.
pub fn parse_export(file_name: &str, bytes: &[u8], opts: &ReadOptions<'_>) -> Result<RawTable> {
    // 1) decode
    let text = std::str::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", file_name))?;
    let text = text.trim_start_matches('\u{feff}');

    // 2) split records
    let delimiter = opts.delimiter.unwrap_or_else(|| sniff_delimiter(text));
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result
            .with_context(|| format!("CSV parse error in {} at record {}", file_name, idx))?;
        let row: Vec<String> = record.iter().map(clean_str).collect();
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(row);
    }

    // 3) banner lines ("Amtliches Endergebnis,,,,") carry at most one value
    let preamble = rows.iter().take_while(|r| non_empty(r) <= 1).count();
    if preamble > 0 {
        trace!(file_name, preamble, "skipping preamble rows");
        rows.drain(..preamble);
    }
    if rows.is_empty() {
        bail!("{} has no tabular rows", file_name);
    }

    // 4) header
    let convention = opts.convention.unwrap_or_else(|| detect_convention(&rows));
    let header_len = convention.header_rows();
    if rows.len() < header_len {
        bail!(
            "{} has {} rows, a {} header needs {}",
            file_name,
            rows.len(),
            convention,
            header_len
        );
    }
    let width = match convention {
        HeaderConvention::Headerless => rows.iter().map(Vec::len).max().unwrap_or(0),
        _ => rows[..header_len].iter().map(Vec::len).max().unwrap_or(0),
    };
    let headers = normalize_header(convention, &rows[..header_len], width, &opts.header)
        .with_context(|| format!("normalizing header of {}", file_name))?;

    // 5) data rows
    let mut data = rows.split_off(header_len);
    for (idx, row) in data.iter_mut().enumerate() {
        if row.len() > width {
            bail!(
                "{}: data row {} has {} fields, header has {}",
                file_name,
                idx,
                row.len(),
                width
            );
        }
        row.resize(width, String::new());
    }

    let delimiter = delimiter as char;
    debug!(
        file_name,
        convention = %convention,
        delimiter = %delimiter,
        columns = headers.len(),
        rows = data.len(),
        "parsed export"
    );

    Ok(RawTable {
        file_name: file_name.to_string(),
        convention,
        headers,
        rows: data,
    })
}

/// Guess the header convention from the first rows left after the preamble:
/// - a second row that carries the unnamed marker, or that has no label in
///   the first column and no numbers, is the sub-level of a two-row header
///   (this wins even when the parents are numbers such as years),
/// - a number past the label column of the first row means there is no
///   header at all,
/// - anything else is a single header row.
pub fn detect_convention(rows: &[Vec<String>]) -> HeaderConvention {
    let Some(first) = rows.first() else {
        return HeaderConvention::Headerless;
    };
    if rows.get(1).map_or(false, |second| is_sub_header_row(second)) {
        return HeaderConvention::TwoRow;
    }
    if has_numeric_tail(first) {
        return HeaderConvention::Headerless;
    }
    HeaderConvention::SingleRow
}

fn non_empty(row: &[String]) -> usize {
    row.iter().filter(|c| !c.is_empty()).count()
}

fn has_numeric_tail(row: &[String]) -> bool {
    row.iter()
        .skip(1)
        .any(|c| convert::parse_locale_number(c).is_some())
}

/// Data rows always carry a label in column 0; sub-level header rows do not.
fn is_sub_header_row(row: &[String]) -> bool {
    if row.iter().any(|c| has_unnamed_marker(c)) {
        return true;
    }
    let unlabeled = row.first().map_or(true, |c| c.is_empty());
    unlabeled && non_empty(row) > 0 && !has_numeric_tail(row)
}
