//! Full-mesh peer channels.
//!
//! Every process holds one outbound stream per peer, used only to send, and
//! one inbound stream per peer, used only to receive. The outbound stream to
//! peer B is opened by dialing B's listening address and sending a
//! [`Handshake`] frame with our id; B indexes the accepted stream by that id.
//!
//! Bootstrap runs connects (with retry), accepts and handshake reads
//! concurrently until the [`Session`] reaches
//! [`SessionState::Established`], optionally bounded by
//! [`SessionConfig::handshake_timeout`].
//!
//! After bootstrap, [`Mesh::send`] frames and writes one message and
//! [`Mesh::try_receive`] returns at most one decoded message without blocking.

use std::{
    collections::{BTreeMap, BTreeSet},
    future, io,
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use futures::{FutureExt, StreamExt, stream::FuturesUnordered};
use lamport_proto::{
    Handshake, Message, PeerAddr, ProcessId, ProtocolError,
    frame::{self, LENGTH_PREFIX_SIZE},
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use crate::{
    env::Environment,
    error::SessionError,
    session::{Session, SessionConfig, SessionState},
    transport::Transport,
};

/// Receive side of one peer channel.
#[derive(Debug)]
struct Inbox<S> {
    stream: S,
    buffer: BytesMut,
}

/// Established channels to every peer.
#[derive(Debug)]
pub struct Mesh<S> {
    id: ProcessId,
    session: Session,
    outbound: BTreeMap<ProcessId, S>,
    inbound: BTreeMap<ProcessId, Inbox<S>>,
    /// Peers whose channel failed; no further I/O is attempted on them
    broken: BTreeSet<ProcessId>,
}

impl<S> Mesh<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Bootstrap the mesh for process `id` over `transport`.
    ///
    /// `peers` is the full address table; index `i` is process `i`.
    ///
    /// # Errors
    ///
    /// - `HandshakeTimeout` if the mesh is not complete within
    ///   `config.handshake_timeout`
    /// - `Handshake`, `DuplicateHandshake` or `UnknownPeer` if an inbound
    ///   connection announces an invalid identity
    /// - `Transport` if the listener fails
    pub async fn establish<T, E>(
        transport: &T,
        env: &E,
        peers: &[PeerAddr],
        id: ProcessId,
        config: &SessionConfig,
    ) -> Result<Self, SessionError>
    where
        T: Transport<Stream = S>,
        E: Environment,
    {
        let start = env.now();
        let mut session = Session::new(id, peers.len());
        let mut outbound = BTreeMap::new();
        let mut inbound = BTreeMap::new();

        let mut handshake = BytesMut::new();
        frame::encode_frame(&Handshake::new(id).to_bytes(), &mut handshake)
            .map_err(SessionError::Handshake)?;
        let handshake = handshake.freeze();

        let mut connects: FuturesUnordered<_> = peers
            .iter()
            .enumerate()
            .map(|(peer, address)| (peer as ProcessId, address.to_string()))
            .filter(|(peer, _)| *peer != id)
            .map(|(peer, address)| {
                let retry = config.connect_retry_interval;
                connect_with_retry(transport, env, id, peer, address, handshake.clone(), retry)
            })
            .collect();
        let mut handshakes = FuturesUnordered::new();

        let timeout = config.handshake_timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => env.sleep(timeout).await,
                None => future::pending().await,
            }
        };
        tokio::pin!(deadline);

        while session.state() != SessionState::Established {
            tokio::select! {
                Some((peer, stream)) = connects.next(), if !connects.is_empty() => {
                    session.record_outbound(peer)?;
                    outbound.insert(peer, stream);
                    debug!(process = id, peer, "outbound channel open");
                },
                accepted = transport.accept(), if !session.inbound_complete() => {
                    handshakes.push(read_handshake(accepted?));
                },
                Some(result) = handshakes.next(), if !handshakes.is_empty() => {
                    match result {
                        Ok((peer, stream)) => {
                            session.record_handshake(peer)?;
                            inbound.insert(peer, Inbox::new(stream));
                            debug!(process = id, peer, "inbound channel open");
                        },
                        Err(err) if err.is_connection_loss() => {
                            warn!(process = id, error = %err, "dropping connection without handshake");
                        },
                        Err(err) => return Err(err),
                    }
                },
                () = &mut deadline => {
                    return Err(SessionError::HandshakeTimeout {
                        elapsed: env.now() - start,
                        missing_outbound: session.missing_outbound(),
                        missing_inbound: session.missing_inbound(),
                    });
                },
            }
        }

        info!(process = id, peers = outbound.len(), elapsed = ?(env.now() - start), "mesh established");

        Ok(Self { id, session, outbound, inbound, broken: BTreeSet::new() })
    }

    /// Build a mesh from already connected streams.
    ///
    /// # Errors
    ///
    /// Fails on duplicate or unknown peers, or if the channels do not cover
    /// every peer in both directions.
    pub fn from_channels(
        id: ProcessId,
        cluster_size: usize,
        outbound: impl IntoIterator<Item = (ProcessId, S)>,
        inbound: impl IntoIterator<Item = (ProcessId, S)>,
    ) -> Result<Self, SessionError> {
        let mut session = Session::new(id, cluster_size);
        let mut out = BTreeMap::new();
        let mut inb = BTreeMap::new();

        for (peer, stream) in outbound {
            session.record_outbound(peer)?;
            out.insert(peer, stream);
        }
        for (peer, stream) in inbound {
            session.record_handshake(peer)?;
            inb.insert(peer, Inbox::new(stream));
        }

        if session.state() != SessionState::Established {
            return Err(SessionError::InvalidState {
                state: session.state(),
                operation: "build a mesh from partial channels",
            });
        }

        Ok(Self { id, session, outbound: out, inbound: inb, broken: BTreeSet::new() })
    }

    /// Own id
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Every peer, ascending.
    pub fn peers(&self) -> Vec<ProcessId> {
        self.session.peers().collect()
    }

    /// True once the channel to or from `peer` has failed.
    pub fn is_broken(&self, peer: ProcessId) -> bool {
        self.broken.contains(&peer)
    }

    /// Peers whose channel has failed.
    pub fn broken_peers(&self) -> Vec<ProcessId> {
        self.broken.iter().copied().collect()
    }

    /// Stop all I/O with `peer`.
    pub fn mark_broken(&mut self, peer: ProcessId) {
        self.broken.insert(peer);
    }

    /// Frame and write `message` on the outbound channel to `to`.
    ///
    /// # Errors
    ///
    /// A write failure marks the peer broken and returns `Transport`.
    pub async fn send(&mut self, to: ProcessId, message: &Message) -> Result<(), SessionError> {
        if self.broken.contains(&to) {
            return Err(SessionError::ChannelClosed(to));
        }
        let stream = self.outbound.get_mut(&to).ok_or(SessionError::UnknownPeer(to))?;

        let text = message.encode().map_err(|source| SessionError::Codec { peer: to, source })?;
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + text.len());
        frame::encode_frame(text.as_bytes(), &mut buf)
            .map_err(|source| SessionError::Codec { peer: to, source })?;

        if let Err(err) = write_flush(stream, &buf).await {
            self.broken.insert(to);
            return Err(err.into());
        }

        trace!(process = self.id, peer = to, %message, "sent");
        Ok(())
    }

    /// Read one message from `from` without blocking.
    ///
    /// Returns `Ok(None)` if no complete frame is buffered yet.
    ///
    /// # Errors
    ///
    /// - `ChannelClosed` once the peer closed its side (the peer is marked
    ///   broken; frames buffered before the close are still returned first)
    /// - `Transport` on a read failure
    /// - `Codec` on a corrupt frame or record; the stream cannot be
    ///   resynchronised
    pub fn try_receive(&mut self, from: ProcessId) -> Result<Option<Message>, SessionError> {
        let inbox = self.inbound.get_mut(&from).ok_or(SessionError::UnknownPeer(from))?;
        let codec = |source| SessionError::Codec { peer: from, source };

        loop {
            if let Some(frame) = frame::decode_frame(&mut inbox.buffer).map_err(codec)? {
                return Message::decode_bytes(&frame).map(Some).map_err(codec);
            }
            if self.broken.contains(&from) {
                return Err(SessionError::ChannelClosed(from));
            }

            match inbox.stream.read_buf(&mut inbox.buffer).now_or_never() {
                None => return Ok(None),
                Some(Ok(0)) => {
                    self.broken.insert(from);
                    return Err(SessionError::ChannelClosed(from));
                },
                Some(Ok(_)) => {},
                Some(Err(err)) => {
                    self.broken.insert(from);
                    return Err(err.into());
                },
            }
        }
    }

    /// Shut down every outbound channel and close the session.
    pub async fn close(&mut self) {
        for (peer, stream) in &mut self.outbound {
            if let Err(err) = stream.shutdown().await {
                debug!(process = self.id, peer, error = %err, "shutdown failed");
            }
        }
        self.session.close();
    }
}

impl<S> Inbox<S> {
    fn new(stream: S) -> Self {
        Self { stream, buffer: BytesMut::new() }
    }
}

async fn write_flush<S: AsyncWrite + Unpin>(stream: &mut S, bytes: &[u8]) -> io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Dial `address` until it accepts, then send our handshake.
async fn connect_with_retry<T: Transport, E: Environment>(
    transport: &T,
    env: &E,
    id: ProcessId,
    peer: ProcessId,
    address: String,
    handshake: Bytes,
    retry_interval: Duration,
) -> (ProcessId, T::Stream) {
    loop {
        match transport.connect(&address).await {
            Ok(mut stream) => match write_flush(&mut stream, &handshake).await {
                Ok(()) => return (peer, stream),
                Err(err) => trace!(process = id, peer, %address, error = %err, "handshake write failed"),
            },
            Err(err) => trace!(process = id, peer, %address, error = %err, "connect failed"),
        }
        env.sleep(retry_interval).await;
    }
}

/// Read the handshake frame from a freshly accepted stream.
async fn read_handshake<S: AsyncRead + Unpin>(mut stream: S) -> Result<(ProcessId, S), SessionError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    stream.read_exact(&mut prefix).await?;

    let length = frame::parse_length(prefix).map_err(SessionError::Handshake)?;
    if length != Handshake::SIZE {
        return Err(SessionError::Handshake(ProtocolError::InvalidHandshake(length)));
    }

    let mut payload = [0u8; Handshake::SIZE];
    stream.read_exact(&mut payload).await?;

    let handshake = Handshake::from_bytes(&payload).map_err(SessionError::Handshake)?;
    Ok((handshake.process, stream))
}
