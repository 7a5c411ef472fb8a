use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message as returned by the management API's "get" action. The broker
/// decides which fields are present (payload, properties, routing keys, ...);
/// this crate only counts and accumulates them.
pub type Message = Map<String, Value>;

pub const DEFAULT_VHOST: &str = "/";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Consume destructively: acknowledged, not requeued.
    AckRequeueFalse,
    /// Peek: acknowledged but put back on the queue.
    AckRequeueTrue,
    RejectRequeueFalse,
    RejectRequeueTrue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    Auto,
    Base64,
}

/// Body of `POST /queues/{vhost}/{queue}/get`.
#[derive(Clone, Debug, Serialize)]
pub struct GetMessagesRequest {
    pub vhost: String,
    pub truncate: u32,
    pub ackmode: AckMode,
    pub encoding: PayloadEncoding,
    pub count: u32,
}

impl Default for GetMessagesRequest {
    fn default() -> Self {
        Self {
            vhost: DEFAULT_VHOST.to_string(),
            truncate: 50_000,
            ackmode: AckMode::AckRequeueFalse,
            encoding: PayloadEncoding::Auto,
            count: 100,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PurgeRequest {
    pub vhost: String,
    pub name: String,
    pub mode: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishRequest {
    pub properties: PublishProperties,
    pub routing_key: String,
    pub payload: String,
    pub payload_encoding: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishProperties {
    pub delivery_mode: u8,
}

/// Point-in-time queue snapshot from `GET /queues/{vhost}/{queue}`.
/// Never cached; every call re-fetches from the broker.
#[derive(Clone, Debug, Deserialize)]
pub struct QueueInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub queue_type: String,
    pub vhost: String,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub messages: u64,
    #[serde(default)]
    pub messages_ready: u64,
    #[serde(default)]
    pub messages_unacknowledged: u64,
    #[serde(default)]
    pub consumers: u32,
}
