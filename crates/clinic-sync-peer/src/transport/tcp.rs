//! TCP transport.
//!
//! The offerer binds a listener and publishes its address in the offer. The
//! answerer connects and sends the session token as its first frame; the
//! offerer only accepts a connection presenting the right token. Frames are
//! a `u32` big-endian length followed by that many bytes.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use super::{link, Frame, Link, LinkDriver, LinkEvent, Result, Transport};
use crate::descriptor::{Descriptor, DescriptorKind};
use crate::error::SyncError;
use crate::messages::limits::MAX_FRAME_LEN;

/// Default time allowed for the connect/token handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Time one inbound connection gets to present its token.
const TOKEN_TIMEOUT: Duration = Duration::from_secs(5);

type FrameReader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;
type FrameWriter = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;

/// Length-delimited framing capped at [`MAX_FRAME_LEN`].
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

fn framed(stream: TcpStream) -> io::Result<(FrameReader, FrameWriter)> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    Ok((
        FramedRead::new(reader, frame_codec()),
        FramedWrite::new(writer, frame_codec()),
    ))
}

/// Drive an established connection: one task writes frames, one reads.
fn spawn_link(driver: LinkDriver, mut reader: FrameReader, mut writer: FrameWriter) {
    driver.mark_open();
    let LinkDriver {
        mut frames,
        events,
        open,
    } = driver;

    let writer_open = open.clone();
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            match frame {
                Frame::Data(bytes) => match writer.send(bytes).await {
                    Ok(()) => {}
                    // Rejected by the encoder before anything hit the wire.
                    Err(error) if error.kind() == io::ErrorKind::InvalidInput => {
                        tracing::warn!(%error, "dropping oversized frame");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "tcp write failed");
                        break;
                    }
                },
                Frame::Close => break,
            }
        }
        writer_open.store(false, Ordering::SeqCst);
        let _ = SinkExt::<Bytes>::close(&mut writer).await;
    });

    tokio::spawn(async move {
        while let Some(frame) = reader.next().await {
            match frame {
                Ok(bytes) => {
                    if events.send(LinkEvent::Message(bytes.freeze())).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "tcp read failed");
                    break;
                }
            }
        }
        open.store(false, Ordering::SeqCst);
        let _ = events.send(LinkEvent::Closed);
    });
}

/// Offer state: the bound listener and the token the answerer must present.
pub struct TcpPending {
    session: String,
    listener: TcpListener,
}

impl TcpPending {
    /// The address peers connect to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until one presents the session token.
    async fn accept_peer(&self) -> Result<(FrameReader, FrameWriter)> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let (mut reader, writer) = framed(stream)?;
            match tokio::time::timeout(TOKEN_TIMEOUT, reader.next()).await {
                Ok(Some(Ok(token))) if token.as_ref() == self.session.as_bytes() => {
                    tracing::debug!(%peer, "peer presented session token");
                    return Ok((reader, writer));
                }
                Ok(Some(Err(error))) => {
                    tracing::warn!(%peer, %error, "dropping connection with unreadable handshake");
                }
                Err(_) => tracing::warn!(%peer, "dropping connection that sent no token"),
                Ok(_) => tracing::warn!(%peer, "dropping connection with wrong session token"),
            }
        }
    }
}

/// TCP transport implementation.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind_addr: SocketAddr,
    handshake_timeout: Duration,
}

impl TcpTransport {
    /// A transport whose offers listen on `bind_addr` (port 0 picks a free port).
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Listen on loopback with an ephemeral port.
    pub fn localhost() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    /// Set the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    async fn within<F, T>(&self, what: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.handshake_timeout, fut)
            .await
            .map_err(|_| SyncError::Transport(format!("timed out {}", what)))?
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::localhost()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Pending = TcpPending;

    async fn create_offer(&self) -> Result<(Descriptor, TcpPending)> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let endpoint = listener.local_addr()?;
        let session = Descriptor::new_session();
        tracing::debug!(%endpoint, "listening for answer");

        Ok((
            Descriptor::offer(session.clone(), endpoint.to_string()),
            TcpPending { session, listener },
        ))
    }

    async fn accept_offer(&self, offer: &Descriptor) -> Result<(Descriptor, Link)> {
        offer.expect_kind(DescriptorKind::Offer)?;
        let addr: SocketAddr = offer
            .endpoint
            .parse()
            .map_err(|_| SyncError::Setup(format!("bad endpoint: {}", offer.endpoint)))?;

        let session = offer.session.clone();
        let (local, reader, writer) = self
            .within("connecting", async {
                let stream = TcpStream::connect(addr).await?;
                let local = stream.local_addr()?;
                let (reader, mut writer) = framed(stream)?;
                writer.send(Bytes::from(session.clone().into_bytes())).await?;
                Ok::<_, SyncError>((local, reader, writer))
            })
            .await?;

        let (link, driver) = link();
        spawn_link(driver, reader, writer);
        Ok((Descriptor::answer(session, local.to_string()), link))
    }

    async fn accept_answer(&self, pending: TcpPending, answer: &Descriptor) -> Result<Link> {
        answer.expect_kind(DescriptorKind::Answer)?;
        if answer.session != pending.session {
            return Err(SyncError::Setup("answer is for a different offer".into()));
        }

        let (reader, writer) = self.within("waiting for peer", pending.accept_peer()).await?;
        let (link, driver) = link();
        spawn_link(driver, reader, writer);
        Ok(link)
    }
}
