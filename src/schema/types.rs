// src/schema/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// The inferred type of a dataset column.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
pub enum FieldType {
    Integer,
    Float,
    String,
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Integer => "Integer",
            FieldType::Float => "Float",
            FieldType::String => "String",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named, typed column of the unified dataset.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A typed scalar stored in a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    String(String),
    Integer(i64),
    Float(f64),
}

/// Text rendering used for substring matching. Floats keep full precision.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::String(s) => write!(f, "{s}"),
            Cell::Integer(i) => write!(f, "{i}"),
            Cell::Float(v) => write!(f, "{v}"),
        }
    }
}
