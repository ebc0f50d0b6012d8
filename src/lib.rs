//! Ingestion and query core for Brandenburg election result exports.
//!
//! A directory of CSV exports (two-row, single-row or headerless layouts) is
//! normalized into one typed dataset, published as an immutable snapshot and
//! queried with case-insensitive substring filters.

pub mod config;
pub mod dataset;
pub mod lifecycle;
pub mod loader;
pub mod process;
pub mod query;
pub mod schema;

pub use config::{load_config, LoaderConfig};
pub use dataset::{Dataset, Record};
pub use lifecycle::{DatasetController, LoadState, Snapshot};
pub use query::{Filters, QueryResult};
pub use schema::{Cell, Field, FieldType};
