//! The unified, immutable dataset: typed records over one shared schema.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub mod unify;

use crate::config::LoaderConfig;
use crate::loader::FileBatch;
use crate::schema::{infer_fields, Cell, Field};
use unify::{fill_missing, unify};

/// Field names shared by every record of one dataset.
#[derive(Debug, PartialEq)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, index }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One row: a value for every field, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<Columns>,
    values: Vec<Cell>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Cell> {
        self.columns.position(field).and_then(|i| self.values.get(i))
    }

    /// `(name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Records serialize as JSON objects with keys in schema order.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Ordered records plus the field schema. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    fields: Vec<Field>,
    records: Vec<Record>,
}

impl Dataset {
    /// Zero fields, zero records.
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Build from typed rows. Every row must be `fields.len()` wide.
    pub fn new(fields: Vec<Field>, rows: Vec<Vec<Cell>>) -> Self {
        let columns = Arc::new(Columns::new(
            fields.iter().map(|f| f.name.clone()).collect(),
        ));
        let records = rows
            .into_iter()
            .map(|values| {
                debug_assert_eq!(values.len(), columns.len());
                Record {
                    columns: Arc::clone(&columns),
                    values,
                }
            })
            .collect();
        Self { fields, records }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True for the empty dataset: no fields at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Unify the batches, infer the schema and fill missing values.
///
/// No batches (every file failed, or none found) yields [`Dataset::empty`].
pub fn build_dataset(batches: &[FileBatch], config: &LoaderConfig) -> Dataset {
    if batches.is_empty() {
        info!("no files loaded, publishing the empty dataset");
        return Dataset::empty();
    }

    let unified = unify(batches);
    let fields = infer_fields(&unified.columns, &unified.rows, |name| {
        config.is_text_field(name)
    });
    let rows = fill_missing(unified.rows, &fields);
    let dataset = Dataset::new(fields, rows);

    info!(
        fields = dataset.fields().len(),
        records = dataset.len(),
        "dataset built: {}",
        dataset
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    dataset
}
