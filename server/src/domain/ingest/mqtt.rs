//! MQTT message source
//!
//! Subscribes with QoS 0 on a clean session; delivery guarantees are those of
//! the broker at that level.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeFilter,
    SubscribeReasonCode,
};

use super::source::{InboundMessage, MessageSource, TransportError};
use crate::core::config::MqttConfig;
use crate::core::constants::{APP_NAME_LOWER, MQTT_REQUEST_CHANNEL_CAPACITY};

pub struct MqttSource {
    config: MqttConfig,
    client_id: String,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
    /// Publishes that arrived while waiting for subscription acks
    pending: VecDeque<InboundMessage>,
}

impl MqttSource {
    pub fn new(config: MqttConfig) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", APP_NAME_LOWER, uuid::Uuid::new_v4().simple()));
        Self {
            config,
            client_id,
            client: None,
            eventloop: None,
            pending: VecDeque::new(),
        }
    }

    fn options(&self) -> MqttOptions {
        let mut options =
            MqttOptions::new(self.client_id.clone(), self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        options.set_clean_session(true);
        options.set_max_packet_size(self.config.max_packet_bytes, self.config.max_packet_bytes);
        if let Some(username) = &self.config.username {
            options.set_credentials(
                username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        options
    }
}

fn to_inbound(publish: rumqttc::Publish) -> InboundMessage {
    InboundMessage {
        topic: publish.topic,
        payload: publish.payload.to_vec(),
    }
}

fn subscribe_filters(topics: &[String]) -> Vec<SubscribeFilter> {
    topics
        .iter()
        .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtMostOnce))
        .collect()
}

/// First filter the broker refused; return codes follow filter order
fn rejected_filter(topics: &[String], codes: &[SubscribeReasonCode]) -> Option<String> {
    codes
        .iter()
        .position(|c| matches!(c, SubscribeReasonCode::Failure))
        .map(|i| topics.get(i).cloned().unwrap_or_default())
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(TransportError::Connect(format!("{:?}", ack.code)))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(TransportError::Connect(e.to_string())),
        }
    }
}

#[async_trait]
impl MessageSource for MqttSource {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.disconnect().await;

        let (client, mut eventloop) =
            AsyncClient::new(self.options(), MQTT_REQUEST_CHANNEL_CAPACITY);
        await_connack(&mut eventloop).await?;

        if !self.config.topics.is_empty() {
            // One SUBSCRIBE packet, so the request channel never fills
            client
                .subscribe_many(subscribe_filters(&self.config.topics))
                .await
                .map_err(|e| TransportError::Subscribe {
                    topic: self.config.topics.join(","),
                    reason: e.to_string(),
                })?;

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        if let Some(topic) = rejected_filter(&self.config.topics, &ack.return_codes)
                        {
                            return Err(TransportError::Subscribe {
                                topic,
                                reason: "rejected by broker".into(),
                            });
                        }
                        break;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.pending.push_back(to_inbound(publish));
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(TransportError::Connection(e.to_string())),
                }
            }
        }

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            client_id = %self.client_id,
            topics = ?self.config.topics,
            "Subscribed to MQTT broker"
        );

        self.client = Some(client);
        self.eventloop = Some(eventloop);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<InboundMessage, TransportError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }
        let eventloop = self
            .eventloop
            .as_mut()
            .ok_or_else(|| TransportError::Connection("not connected".into()))?;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => return Ok(to_inbound(publish)),
                Ok(Event::Incoming(Packet::Disconnect)) => return Err(TransportError::Closed),
                Ok(_) => continue,
                Err(e) => return Err(TransportError::Connection(e.to_string())),
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            // Best effort: the connection may already be gone
            if let Err(e) = client.try_disconnect() {
                tracing::debug!(error = %e, "MQTT disconnect request not sent");
            }
        }
        self.eventloop = None;
        self.pending.clear();
    }
}
