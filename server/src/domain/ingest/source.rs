//! Upstream message source abstraction
//!
//! The pipeline drives any [`MessageSource`]: the MQTT client in production,
//! scripted sources in tests.

use async_trait::async_trait;
use thiserror::Error;

/// One message as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Transport-level failure; always answered with a reconnect
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Subscription to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Connection lost: {0}")]
    Connection(String),

    #[error("Connection closed by broker")]
    Closed,
}

#[async_trait]
pub trait MessageSource: Send {
    /// Connect and subscribe to the configured topic filters
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Wait for the next message
    async fn next_message(&mut self) -> Result<InboundMessage, TransportError>;

    /// Release the connection; safe to call when not connected
    async fn disconnect(&mut self);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Subscribe {
            topic: "sensor/#".into(),
            reason: "not authorized".into(),
        };
        assert_eq!(
            err.to_string(),
            "Subscription to sensor/# failed: not authorized"
        );
        assert_eq!(TransportError::Closed.to_string(), "Connection closed by broker");
    }
}
