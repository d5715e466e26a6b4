//! Transport abstraction for the peer mesh.
//!
//! Production uses tokio TCP, tests use turmoil (simulated TCP) or in-memory
//! duplex streams. The mesh only needs ordered, reliable byte streams; each
//! stream is used in one direction only.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Listening endpoint that can also dial out.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Byte stream of one connection.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Accept the next incoming connection.
    async fn accept(&self) -> io::Result<Self::Stream>;

    /// Connect to `address` (`host:port`).
    ///
    /// Fails if nothing is listening there yet; the mesh retries.
    async fn connect(&self, address: &str) -> io::Result<Self::Stream>;
}
