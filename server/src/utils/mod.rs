//! Shared helpers

pub mod retry;
pub mod sql;
