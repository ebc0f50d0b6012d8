//! Substring filtering over a dataset snapshot.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::dataset::{Dataset, Record};
use crate::schema::{Field, FieldType};

/// Field name → substring. Empty means "everything".
pub type Filters = BTreeMap<String, String>;

/// Name of the single field reported when the dataset is empty.
pub const PLACEHOLDER_FIELD: &str = "placeholder";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub records: Vec<Record>,
}

/// Parse `field=value` pairs as given on a command line.
pub fn parse_filters<I, S>(pairs: I) -> anyhow::Result<Filters>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut filters = Filters::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let Some((field, value)) = pair.split_once('=') else {
            anyhow::bail!("filter `{}` is not of the form field=value", pair);
        };
        filters.insert(field.trim().to_string(), value.to_string());
    }
    Ok(filters)
}

/// Records matching every applicable filter, in ingestion order.
///
/// A filter applies when its field exists and its substring is non-empty;
/// the field's text rendering must contain the substring, ignoring case.
pub fn execute(dataset: &Dataset, filters: &Filters) -> QueryResult {
    if dataset.is_empty() {
        return QueryResult {
            fields: vec![Field::new(PLACEHOLDER_FIELD, FieldType::String)],
            records: Vec::new(),
        };
    }

    let active: Vec<(&str, String)> = filters
        .iter()
        .filter(|(field, needle)| {
            let known = dataset.field(field).is_some();
            if !known {
                debug!(field = %field, "ignoring filter on unknown field");
            }
            known && !needle.is_empty()
        })
        .map(|(field, needle)| (field.as_str(), needle.to_lowercase()))
        .collect();

    let records = dataset
        .records()
        .iter()
        .filter(|record| matches(record, &active))
        .cloned()
        .collect();

    QueryResult {
        fields: dataset.fields().to_vec(),
        records,
    }
}

fn matches(record: &Record, active: &[(&str, String)]) -> bool {
    active.iter().all(|(field, needle)| {
        record
            .get(field)
            .map_or(false, |cell| cell.to_string().to_lowercase().contains(needle.as_str()))
    })
}
