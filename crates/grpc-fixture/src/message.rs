//! # Recorded Messages
//!
//! Types describing one captured RPC call: which method it targeted and the
//! ordered client/server messages that made up its exchange. These mirror the
//! JSON dump format read by [`DumpReader`](crate::dump::DumpReader).

use std::collections::HashMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Which side of the stream produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Client,
    Server,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Client => write!(f, "client"),
            Origin::Server => write!(f, "server"),
        }
    }
}

/// A single message as it appears inside a dumped RPC record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpedMessage {
    pub message_origin: Origin,
    /// Wire bytes, base64 in the dump.
    #[serde(
        default,
        serialize_with = "serialize_base64",
        deserialize_with = "deserialize_base64"
    )]
    pub raw_message: Vec<u8>,
    /// Decoded form, when the recorder could decode it.
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One complete recorded call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRecord {
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub messages: Vec<DumpedMessage>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Vec<String>>,
}

impl RpcRecord {
    /// Full method name used to key fixtures, e.g. `/pkg.Service/Method`.
    pub fn stream_name(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

/// A message stored in the trie. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMessage {
    pub origin: Origin,
    pub raw_bytes: Bytes,
    pub decoded: Option<Value>,
    /// Position within the recorded call it first appeared in.
    pub sequence_index: usize,
}

impl RecordedMessage {
    pub fn new(origin: Origin, raw_bytes: impl Into<Bytes>, sequence_index: usize) -> Self {
        Self {
            origin,
            raw_bytes: raw_bytes.into(),
            decoded: None,
            sequence_index,
        }
    }

    pub fn with_decoded(mut self, decoded: Option<Value>) -> Self {
        self.decoded = decoded;
        self
    }

    /// Same origin and byte-identical payload.
    pub fn matches(&self, origin: Origin, raw_bytes: &[u8]) -> bool {
        self.origin == origin && self.raw_bytes.as_ref() == raw_bytes
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

fn deserialize_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    match encoded {
        Some(encoded) => BASE64.decode(encoded).map_err(serde::de::Error::custom),
        None => Ok(Vec::new()),
    }
}
