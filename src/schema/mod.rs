pub mod derive;
pub mod types;

pub use derive::infer_fields;
pub use types::{Cell, Field, FieldType};
