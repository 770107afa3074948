//! PostgreSQL repositories
//!
//! - `registry` - topic registry rows
//! - `dynamic` - backing table DDL and row writes
//! - `history` - raw and aggregate history reads

pub mod dynamic;
pub mod history;
pub mod registry;
