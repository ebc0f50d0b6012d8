use tracing::debug;

use super::{Field, FieldType};
use crate::process::convert::{is_blank, Coerced};

/// Largest magnitude an f64 carries without losing integer precision.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0; // 2^53

/// For each unified column, look at every row:
///  - designated text columns (label, provenance, configured) are String
///  - a column with no parsed number but some non-blank text is String
///  - otherwise Integer when every number is whole and exactly representable,
///    Float as soon as one is not
///
/// Missing cells of a numeric column count as zero, so they never turn an
/// Integer column into a Float one.
pub fn infer_fields<F>(columns: &[String], rows: &[Vec<Coerced>], is_text: F) -> Vec<Field>
where
    F: Fn(&str) -> bool,
{
    columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let ty = if is_text(name) {
                FieldType::String
            } else {
                classify(name, rows.iter().filter_map(|r| r.get(idx)))
            };
            Field::new(name.clone(), ty)
        })
        .collect()
}

fn classify<'a, I>(name: &str, cells: I) -> FieldType
where
    I: Iterator<Item = &'a Coerced>,
{
    let mut saw_number = false;
    let mut saw_text = false;
    let mut integral = true;

    for cell in cells {
        match cell {
            Coerced::Number(v) => {
                saw_number = true;
                if v.fract() != 0.0 || v.abs() >= MAX_EXACT_INT {
                    integral = false;
                }
            }
            Coerced::Text(s) | Coerced::Missing { raw: s } => {
                if !is_blank(s) {
                    saw_text = true;
                }
            }
        }
    }

    if !saw_number && saw_text {
        debug!("infer_fields: `{}` has no numeric values, keeping it as text", name);
        return FieldType::String;
    }
    if integral {
        FieldType::Integer
    } else {
        FieldType::Float
    }
}
