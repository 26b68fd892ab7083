//! # Stream Transport
//!
//! The replay engine talks to a live call through [`ReplayStream`]: one handle
//! per call that can send a payload to the client and wait for the client's
//! next payload. Framing and connection handling belong to the implementor.
//!
//! [`ChannelStream`] is an in-process implementation over tokio channels, used
//! to drive the engine without a network and in tests.

use std::future::Future;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;

/// The server side of one live streaming call.
pub trait ReplayStream: Send {
    /// Deliver one message to the client.
    fn send(&mut self, payload: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the client's next message. Returns [`TransportError::Closed`]
    /// once the client half-closes or disconnects.
    fn recv(&mut self) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}

/// Server half of an in-process call.
#[derive(Debug)]
pub struct ChannelStream {
    inbound: mpsc::Receiver<Bytes>,
    outbound: mpsc::Sender<Bytes>,
}

/// Client half of an in-process call.
#[derive(Debug)]
pub struct ChannelPeer {
    outbound: Option<mpsc::Sender<Bytes>>,
    inbound: mpsc::Receiver<Bytes>,
}

impl ChannelStream {
    /// Create a connected server/client pair with the given buffer capacity.
    pub fn pair(capacity: usize) -> (ChannelStream, ChannelPeer) {
        let (client_tx, server_rx) = mpsc::channel(capacity);
        let (server_tx, client_rx) = mpsc::channel(capacity);
        (
            ChannelStream {
                inbound: server_rx,
                outbound: server_tx,
            },
            ChannelPeer {
                outbound: Some(client_tx),
                inbound: client_rx,
            },
        )
    }
}

impl ReplayStream for ChannelStream {
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        debug!("Channel stream sending {} bytes", payload.len());
        self.outbound
            .send(payload)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }
}

impl ChannelPeer {
    pub async fn send(&mut self, payload: impl Into<Bytes>) -> Result<(), TransportError> {
        match &self.outbound {
            Some(tx) => tx
                .send(payload.into())
                .await
                .map_err(|_| TransportError::Closed),
            None => Err(TransportError::Protocol(
                "send after half-close".to_string(),
            )),
        }
    }

    /// Next message from the server, `None` once the server side has finished.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.recv().await
    }

    /// Stop sending; the server observes [`TransportError::Closed`].
    pub fn half_close(&mut self) {
        self.outbound = None;
    }
}
