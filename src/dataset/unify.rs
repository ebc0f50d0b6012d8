//! Concatenation of per-file batches into one table, and the dataset-wide
//! missing-value fill that runs once the column types are known.

use std::collections::HashMap;
use tracing::debug;

use crate::loader::FileBatch;
use crate::process::convert::{parse_locale_number, Coerced};
use crate::schema::{Cell, Field, FieldType};

/// All batches over the union of their columns.
#[derive(Debug, Default)]
pub struct Unified {
    /// Column names in first-seen order.
    pub columns: Vec<String>,
    /// One row per input row, in ingestion order, `columns.len()` wide.
    pub rows: Vec<Vec<Coerced>>,
}

/// Union the batch columns (first-seen order) and lay every row out over
/// them. A column a file does not have is missing in that file's rows.
pub fn unify(batches: &[FileBatch]) -> Unified {
    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for batch in batches {
        for name in &batch.columns {
            if !index.contains_key(name.as_str()) {
                index.insert(name.as_str(), columns.len());
                columns.push(name.clone());
            }
        }
    }

    let total: usize = batches.iter().map(|b| b.rows.len()).sum();
    let mut rows = Vec::with_capacity(total);
    for batch in batches {
        let positions: Vec<usize> = batch.columns.iter().map(|c| index[c.as_str()]).collect();
        if positions.len() < columns.len() {
            debug!(
                file = %batch.source_file,
                absent = columns.len() - positions.len(),
                "file lacks some unified columns"
            );
        }
        for row in &batch.rows {
            let mut out = vec![Coerced::missing(); columns.len()];
            for (value, &pos) in row.iter().zip(&positions) {
                out[pos] = value.clone();
            }
            rows.push(out);
        }
    }

    Unified { columns, rows }
}

/// Turn coerced cells into typed cells. Missing numbers become zero, missing
/// text becomes the cleaned raw input (empty when the column was absent).
pub fn fill_missing(rows: Vec<Vec<Coerced>>, fields: &[Field]) -> Vec<Vec<Cell>> {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .zip(fields)
                .map(|(value, field)| finalize(value, field.ty))
                .collect()
        })
        .collect()
}

fn finalize(value: Coerced, ty: FieldType) -> Cell {
    match ty {
        FieldType::String => match value {
            Coerced::Text(s) | Coerced::Missing { raw: s } => Cell::String(s),
            Coerced::Number(v) => Cell::String(v.to_string()),
        },
        FieldType::Integer => Cell::Integer(number(value) as i64),
        FieldType::Float => Cell::Float(number(value)),
    }
}

fn number(value: Coerced) -> f64 {
    match value {
        Coerced::Number(v) => v,
        Coerced::Text(s) => parse_locale_number(&s).unwrap_or(0.0),
        Coerced::Missing { .. } => 0.0,
    }
}
