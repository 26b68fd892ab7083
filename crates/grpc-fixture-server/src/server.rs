use anyhow::Result;
use grpc_fixture::{StreamReplayEngine, TransportError};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::stream::FramedStream;

/// Serves recorded calls over TCP, one call per connection.
pub struct FixtureServer {
    engine: StreamReplayEngine,
    listener: TcpListener,
}

impl FixtureServer {
    pub async fn bind(address: SocketAddr, engine: StreamReplayEngine) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { engine, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        info!(
            "Fixture server starting on {:?} with {} recorded methods",
            self.listener.local_addr()?,
            self.engine.fixtures().len()
        );

        loop {
            let (socket, addr) = self.listener.accept().await?;
            debug!("New connection from {}", addr);
            let engine = self.engine.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(socket, engine).await {
                    error!("Error handling connection from {}: {}", addr, e);
                }
            });
        }
    }

    async fn handle_connection(
        socket: TcpStream,
        engine: StreamReplayEngine,
    ) -> Result<(), TransportError> {
        let mut stream = FramedStream::new(socket);
        let method = stream.open().await?;
        let status = engine.handle(&method, &mut stream).await;
        stream.finish(status).await
    }
}
