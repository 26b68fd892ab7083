use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use grpc_fixture::{ReplayStream, RpcStatus, TransportError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::frame_codec::{Frame, FrameCodec};

/// Server side of one call carried over a framed byte stream.
pub struct FramedStream<T> {
    framed: Framed<T, FrameCodec>,
    half_closed: bool,
}

impl<T> FramedStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: T) -> Self {
        Self {
            framed: Framed::new(io, FrameCodec::new()),
            half_closed: false,
        }
    }

    /// Read the opening frame and return the stream name it names.
    pub async fn open(&mut self) -> Result<String, TransportError> {
        match self.framed.next().await {
            Some(Ok(Frame::Open { method })) => Ok(method),
            Some(Ok(other)) => Err(TransportError::Protocol(format!(
                "expected open frame, got {}",
                other.kind()
            ))),
            Some(Err(e)) => Err(TransportError::Io(e)),
            None => Err(TransportError::Closed),
        }
    }

    /// Send the terminal status frame.
    pub async fn finish(&mut self, status: RpcStatus) -> Result<(), TransportError> {
        debug!("Sending status {}", status);
        self.framed.send(Frame::from(status)).await?;
        Ok(())
    }

    pub fn is_half_closed(&self) -> bool {
        self.half_closed
    }
}

impl<T> ReplayStream for FramedStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.framed.send(Frame::message(payload)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        if self.half_closed {
            return Err(TransportError::Closed);
        }
        match self.framed.next().await {
            Some(Ok(Frame::Message { data })) => Ok(data),
            Some(Ok(Frame::HalfClose)) => {
                self.half_closed = true;
                Err(TransportError::Closed)
            }
            Some(Ok(Frame::Cancel)) => Err(TransportError::Cancelled),
            Some(Ok(other)) => Err(TransportError::Protocol(format!(
                "unexpected {} frame mid-call",
                other.kind()
            ))),
            Some(Err(e)) => Err(TransportError::Io(e)),
            None => Err(TransportError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grpc_fixture::StatusCode;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_open_then_messages_then_half_close() {
        let (client, server) = duplex(4096);
        let mut peer = Framed::new(client, FrameCodec::new());
        let mut stream = FramedStream::new(server);

        peer.send(Frame::Open {
            method: "/pkg.Svc/Chat".to_string(),
        })
        .await
        .unwrap();
        peer.send(Frame::message(&b"hello"[..])).await.unwrap();
        peer.send(Frame::HalfClose).await.unwrap();

        assert_eq!(stream.open().await.unwrap(), "/pkg.Svc/Chat");
        assert_eq!(stream.recv().await.unwrap(), Bytes::from_static(b"hello"));
        assert!(matches!(stream.recv().await, Err(TransportError::Closed)));
        assert!(stream.is_half_closed());
        // stays closed without touching the wire again
        assert!(matches!(stream.recv().await, Err(TransportError::Closed)));

        stream.send(Bytes::from_static(b"hi")).await.unwrap();
        stream.finish(RpcStatus::ok()).await.unwrap();
        assert_eq!(
            peer.next().await.unwrap().unwrap(),
            Frame::message(&b"hi"[..])
        );
        assert_eq!(
            peer.next().await.unwrap().unwrap(),
            Frame::Status {
                code: StatusCode::Ok,
                message: String::new()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_open_is_protocol_error() {
        let (client, server) = duplex(4096);
        let mut peer = Framed::new(client, FrameCodec::new());
        let mut stream = FramedStream::new(server);

        peer.send(Frame::message(&b"hello"[..])).await.unwrap();
        assert!(matches!(
            stream.open().await,
            Err(TransportError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_and_disconnect() {
        let (client, server) = duplex(4096);
        let mut peer = Framed::new(client, FrameCodec::new());
        let mut stream = FramedStream::new(server);

        peer.send(Frame::Cancel).await.unwrap();
        assert!(matches!(stream.recv().await, Err(TransportError::Cancelled)));

        drop(peer);
        assert!(matches!(stream.recv().await, Err(TransportError::Closed)));
    }
}
