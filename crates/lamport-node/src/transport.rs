//! TCP transport.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use lamport_core::Transport;
use tokio::net::{TcpListener, TcpStream};

/// Tokio TCP listener plus outbound connects.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind the listening endpoint.
    ///
    /// # Errors
    ///
    /// Fails if the address is in use or does not resolve.
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }

    /// Address actually bound, useful after binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<Self::Stream> {
        let (stream, _addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn connect(&self, address: &str) -> io::Result<Self::Stream> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
