//! Wire framing for replayed calls.
//!
//! Each connection carries exactly one call. Frames are JSON documents inside
//! length-delimited frames; message payloads travel base64 encoded.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::{Bytes, BytesMut};
use grpc_fixture::{RpcStatus, StatusCode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest frame either side will accept (32MB).
pub const MAX_FRAME_LENGTH: usize = 32 * 1024 * 1024;

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First frame from the client, naming the stream (`/service/method`).
    Open { method: String },
    /// One RPC message in either direction.
    Message {
        #[serde(serialize_with = "serialize_data", deserialize_with = "deserialize_data")]
        data: Bytes,
    },
    /// The client has nothing more to send.
    HalfClose,
    /// The client abandons the call.
    Cancel,
    /// Last frame from the server.
    Status { code: StatusCode, message: String },
}

impl Frame {
    pub fn message(data: impl Into<Bytes>) -> Self {
        Frame::Message { data: data.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Open { .. } => "open",
            Frame::Message { .. } => "message",
            Frame::HalfClose => "half_close",
            Frame::Cancel => "cancel",
            Frame::Status { .. } => "status",
        }
    }
}

impl From<RpcStatus> for Frame {
    fn from(status: RpcStatus) -> Self {
        Frame::Status {
            code: status.code,
            message: status.message,
        }
    }
}

fn serialize_data<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(data))
}

fn deserialize_data<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    BASE64
        .decode(encoded)
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}

/// Length-delimited JSON codec for [`Frame`]s.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new() -> Self {
        let mut inner = LengthDelimitedCodec::new();
        inner.set_max_frame_length(MAX_FRAME_LENGTH);
        Self { inner }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let serialized = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize frame: {}", e),
            )
        })?;
        self.inner.encode(Bytes::from(serialized), dst)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(frame_bytes) => serde_json::from_slice(&frame_bytes).map(Some).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to deserialize frame: {}", e),
                )
            }),
            None => Ok(None),
        }
    }
}
