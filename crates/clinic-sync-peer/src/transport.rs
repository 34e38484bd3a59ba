//! Transport abstraction for the sync protocol.
//!
//! A transport turns an offer/answer descriptor exchange into a [`Link`]:
//! an ordered, bidirectional byte channel that reports `Open`, `Message`
//! and `Closed` events. A reconnect is always a new link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::descriptor::Descriptor;
use crate::error::SyncError;

pub mod tcp;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Transport trait for establishing peer links.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// State the offerer keeps between `create_offer` and `accept_answer`.
    type Pending: Send + 'static;

    /// Start a connection. Returns the offer descriptor to hand to the peer.
    async fn create_offer(&self) -> Result<(Descriptor, Self::Pending)>;

    /// Accept a peer's offer. Returns the answer descriptor and the link.
    async fn accept_offer(&self, offer: &Descriptor) -> Result<(Descriptor, Link)>;

    /// Complete an offer with the peer's answer.
    async fn accept_answer(&self, pending: Self::Pending, answer: &Descriptor) -> Result<Link>;
}

/// Events reported by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The channel is open; sends are delivered from now on.
    Open,
    /// A message arrived.
    Message(Bytes),
    /// The channel closed. No further events follow.
    Closed,
}

/// Outbound frames consumed by a transport driver.
#[derive(Debug)]
pub(crate) enum Frame {
    Data(Bytes),
    Close,
}

/// Sending half of a link. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LinkSender {
    frames: mpsc::UnboundedSender<Frame>,
    open: Arc<AtomicBool>,
}

impl LinkSender {
    /// Queue bytes for delivery. Returns false (and drops the bytes) when the
    /// link is not open.
    pub fn send(&self, bytes: Bytes) -> bool {
        if !self.is_open() {
            return false;
        }
        self.frames.send(Frame::Data(bytes)).is_ok()
    }

    /// Close the link. Idempotent.
    pub fn close(&self) {
        let _ = self.frames.send(Frame::Close);
    }

    /// Whether sends are currently delivered.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// One peer connection: a sender plus the event stream.
#[derive(Debug)]
pub struct Link {
    sender: LinkSender,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Link {
    /// A handle for sending and closing.
    pub fn sender(&self) -> LinkSender {
        self.sender.clone()
    }

    /// Wait for the next event. A finished driver reads as `Closed`.
    pub async fn next_event(&mut self) -> LinkEvent {
        self.events.recv().await.unwrap_or(LinkEvent::Closed)
    }

    /// Split into sender and event stream.
    pub fn into_parts(self) -> (LinkSender, mpsc::UnboundedReceiver<LinkEvent>) {
        (self.sender, self.events)
    }
}

/// The transport-facing half of a link.
#[derive(Debug)]
pub(crate) struct LinkDriver {
    pub frames: mpsc::UnboundedReceiver<Frame>,
    pub events: mpsc::UnboundedSender<LinkEvent>,
    pub open: Arc<AtomicBool>,
}

impl LinkDriver {
    /// Mark the link open and report it.
    pub fn mark_open(&self) {
        self.open.store(true, Ordering::SeqCst);
        let _ = self.events.send(LinkEvent::Open);
    }
}

/// Create a link and the driver that feeds it.
pub(crate) fn link() -> (Link, LinkDriver) {
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(false));

    let link = Link {
        sender: LinkSender {
            frames: frames_tx,
            open: open.clone(),
        },
        events: events_rx,
    };
    let driver = LinkDriver {
        frames: frames_rx,
        events: events_tx,
        open,
    };
    (link, driver)
}

/// An in-process transport for tests and single-process demos.
///
/// Offers are registered on a shared [`memory::MemoryNetwork`] under their
/// session token; the answerer claims them from there.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    use crate::descriptor::DescriptorKind;

    const ENDPOINT: &str = "memory";

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        /// Answer-side links waiting to be claimed, by session.
        offers: RwLock<HashMap<String, Link>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport connected to this network.
        pub fn transport(self: &Arc<Self>) -> MemoryTransport {
            MemoryTransport {
                network: Arc::clone(self),
            }
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                offers: RwLock::new(HashMap::new()),
            }
        }
    }

    /// Handles kept by one end of a memory link.
    #[derive(Clone)]
    struct Side {
        events: mpsc::UnboundedSender<LinkEvent>,
        open: Arc<AtomicBool>,
    }

    impl Side {
        fn open(&self) {
            self.open.store(true, Ordering::SeqCst);
            let _ = self.events.send(LinkEvent::Open);
        }
    }

    /// Forward one side's frames to the other side's events.
    fn spawn_pipe(
        mut frames: mpsc::UnboundedReceiver<Frame>,
        local: Side,
        remote: Side,
        closed: Arc<AtomicBool>,
    ) {
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                match frame {
                    Frame::Data(bytes) => {
                        let _ = remote.events.send(LinkEvent::Message(bytes));
                    }
                    Frame::Close => break,
                }
            }

            local.open.store(false, Ordering::SeqCst);
            remote.open.store(false, Ordering::SeqCst);
            if !closed.swap(true, Ordering::SeqCst) {
                let _ = local.events.send(LinkEvent::Closed);
                let _ = remote.events.send(LinkEvent::Closed);
            }
        });
    }

    /// Offer state: the offerer's link and both sides to open on answer.
    pub struct MemoryPending {
        session: String,
        link: Link,
        local: Side,
        remote: Side,
    }

    /// In-memory transport implementation.
    #[derive(Clone)]
    pub struct MemoryTransport {
        network: Arc<MemoryNetwork>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        type Pending = MemoryPending;

        async fn create_offer(&self) -> Result<(Descriptor, MemoryPending)> {
            let session = Descriptor::new_session();
            let (offer_link, offer_driver) = link();
            let (answer_link, answer_driver) = link();

            let local = Side {
                events: offer_driver.events,
                open: offer_driver.open,
            };
            let remote = Side {
                events: answer_driver.events,
                open: answer_driver.open,
            };
            let closed = Arc::new(AtomicBool::new(false));
            spawn_pipe(offer_driver.frames, local.clone(), remote.clone(), closed.clone());
            spawn_pipe(answer_driver.frames, remote.clone(), local.clone(), closed);

            self.network
                .offers
                .write()
                .await
                .insert(session.clone(), answer_link);

            let pending = MemoryPending {
                session: session.clone(),
                link: offer_link,
                local,
                remote,
            };
            Ok((Descriptor::offer(session, ENDPOINT), pending))
        }

        async fn accept_offer(&self, offer: &Descriptor) -> Result<(Descriptor, Link)> {
            offer.expect_kind(DescriptorKind::Offer)?;
            let link = self
                .network
                .offers
                .write()
                .await
                .remove(&offer.session)
                .ok_or_else(|| SyncError::Transport("no such offer on this network".into()))?;

            Ok((Descriptor::answer(offer.session.clone(), ENDPOINT), link))
        }

        async fn accept_answer(&self, pending: MemoryPending, answer: &Descriptor) -> Result<Link> {
            answer.expect_kind(DescriptorKind::Answer)?;
            if answer.session != pending.session {
                return Err(SyncError::Setup("answer is for a different offer".into()));
            }
            if self.network.offers.read().await.contains_key(&pending.session) {
                return Err(SyncError::Setup("offer has not been accepted".into()));
            }

            pending.local.open();
            pending.remote.open();
            Ok(pending.link)
        }
    }
}
