//! Turmoil-based Transport implementation using TCP streams.

use std::io;

use async_trait::async_trait;
use lamport_core::Transport;
use turmoil::net::{TcpListener, TcpStream};

/// Simulation transport over turmoil's deterministic TCP.
///
/// - **Deterministic delivery**: turmoil controls segment ordering and timing
/// - **Fault injection**: links can be delayed, held or partitioned
/// - **Stream semantics**: reliable, ordered bytes per connection, which is
///   exactly the per-pair FIFO property the protocol depends on
///
/// Peers are addressed by turmoil host name, e.g. `"node1:7000"`.
pub struct SimTransport {
    listener: TcpListener,
}

impl SimTransport {
    /// Bind the listening endpoint, e.g. `"0.0.0.0:7000"`.
    ///
    /// # Errors
    ///
    /// Fails if the address is in use or malformed.
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl Transport for SimTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<Self::Stream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    async fn connect(&self, address: &str) -> io::Result<Self::Stream> {
        TcpStream::connect(address).await
    }
}
