//! Read-only HTTP API over the history service

pub mod access;
pub mod middleware;
pub mod routes;
mod server;
pub mod types;

pub use access::{AccessResolver, UnrestrictedAccess};
pub use server::{ApiServer, router};
