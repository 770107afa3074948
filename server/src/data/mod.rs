//! Data storage layer
//!
//! - `dynamic` - runtime-discovered schema engine (naming, types, evolution, caches)
//! - `postgres` - PostgreSQL service, migrations and repositories
//! - `query` - validated history query plans
//! - `traits` - the `TopicStore` repository trait
//! - `error` - unified data layer error

pub mod dynamic;
pub mod error;
#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod query;
pub mod traits;

pub use error::DataError;
pub use postgres::PostgresService;
pub use traits::TopicStore;
