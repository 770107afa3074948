//! Dynamic schema engine
//!
//! Everything needed to map topics and payload keys onto tables and columns
//! discovered at runtime:
//! - `ident` - identifier sanitizing and table naming
//! - `types` - column type lattice, inference, widening and value normalization
//! - `schema` - registry rows and table layouts
//! - `evolution` - column creation and widening plans
//! - `cache` - registry and column-state caches

pub mod cache;
pub mod evolution;
pub mod ident;
pub mod schema;
pub mod types;

pub use cache::SchemaCache;
pub use schema::{ColumnInfo, TableSchema, TopicRecord};
pub use types::{ColumnType, ColumnValue, ScalarKind, ScalarRow, TopicShape};
