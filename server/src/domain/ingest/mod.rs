//! Ingestion Pipeline
//!
//! Receives broker messages, classifies each payload as object or scalar
//! shape, evolves the topic's table and inserts one row per message.

mod mqtt;
mod payload;
mod persist;
mod pipeline;
mod source;

pub use mqtt::MqttSource;
pub use persist::{IngestError, MessageIngestor};
pub use pipeline::{IngestionPipeline, PipelineState};
pub use source::{InboundMessage, MessageSource, TransportError};
