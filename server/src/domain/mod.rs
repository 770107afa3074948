//! Domain logic
//!
//! - `ingest` - broker subscription, payload classification and persistence
//! - `history` - topic listing and raw/aggregate history queries

pub mod history;
pub mod ingest;

pub use history::{AccessControl, HistoryService};
pub use ingest::{IngestionPipeline, MessageIngestor, MqttSource};
