//! Transport seam between the exchange and the peers it talks to.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use vantage_wire::{read_frame, write_frame, Request, Response};

use crate::error::{Error, Result};

/// Carries one request to a peer address and returns the reply.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform one request/reply round trip with `addr`.
    async fn call(&self, addr: &str, request: Request) -> Result<Response>;
}

/// One-connection-per-call TCP transport.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport with the given connect timeout.
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, addr: &str, request: Request) -> Result<Response> {
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(addr.to_string()))??;
        write_frame(&mut stream, &request).await?;
        match read_frame(&mut stream).await? {
            Some(Response::Error { message }) => Err(Error::Peer(message)),
            Some(response) => Ok(response),
            None => Err(Error::Closed),
        }
    }
}
