//! # Fixture Client
//!
//! Drives one call against a [`FixtureServer`](crate::FixtureServer): open a
//! method, exchange messages, and read the terminal status.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use grpc_fixture::{RpcStatus, StatusCode};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::frame_codec::{Frame, FrameCodec};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server closed the call without a status")]
    ClosedWithoutStatus,

    #[error("Unexpected {kind} frame from server")]
    UnexpectedFrame { kind: &'static str },
}

/// Something the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Message(Bytes),
    Status(RpcStatus),
}

pub struct FixtureClient {
    method: String,
    framed: Framed<TcpStream, FrameCodec>,
}

impl FixtureClient {
    /// Connect and open a call on `method` (`/service/method`).
    pub async fn connect(address: SocketAddr, method: impl Into<String>) -> Result<Self, ClientError> {
        let method = method.into();
        info!("Connecting to fixture server at {} for {}", address, method);
        let socket = TcpStream::connect(address).await?;
        let mut framed = Framed::new(socket, FrameCodec::new());
        framed
            .send(Frame::Open {
                method: method.clone(),
            })
            .await?;
        Ok(Self { method, framed })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub async fn send(&mut self, payload: impl Into<Bytes>) -> Result<(), ClientError> {
        let payload = payload.into();
        debug!("Sending {} bytes on {}", payload.len(), self.method);
        self.framed.send(Frame::message(payload)).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<ClientEvent, ClientError> {
        match self.framed.next().await {
            Some(Ok(Frame::Message { data })) => Ok(ClientEvent::Message(data)),
            Some(Ok(Frame::Status { code, message })) => {
                Ok(ClientEvent::Status(RpcStatus::new(code, message)))
            }
            Some(Ok(other)) => Err(ClientError::UnexpectedFrame { kind: other.kind() }),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::ClosedWithoutStatus),
        }
    }

    /// Tell the server no more messages are coming.
    pub async fn half_close(&mut self) -> Result<(), ClientError> {
        self.framed.send(Frame::HalfClose).await?;
        Ok(())
    }

    /// Abandon the call.
    pub async fn cancel(&mut self) -> Result<(), ClientError> {
        self.framed.send(Frame::Cancel).await?;
        Ok(())
    }

    /// Read until the status frame, returning the messages seen on the way.
    pub async fn finish(mut self) -> Result<(Vec<Bytes>, RpcStatus), ClientError> {
        let mut messages = Vec::new();
        loop {
            match self.recv().await? {
                ClientEvent::Message(data) => messages.push(data),
                ClientEvent::Status(status) => {
                    if status.code != StatusCode::Ok {
                        debug!("Call on {} ended with {}", self.method, status);
                    }
                    return Ok((messages, status));
                }
            }
        }
    }
}
