//! The sync engine: pairing negotiation and the per-session dispatch loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use clinic_sync_core::{ChangeRecord, Clock, DeviceId, SystemClock, Timestamp};
use clinic_sync_crypto::{PairingKey, DEFAULT_KDF_ITERATIONS};
use clinic_sync_store::{ApplyOutcome, ChangeLog, ReplaySink};

use crate::activity::{ActivityKind, ActivityLog, DEFAULT_ACTIVITY_CAPACITY};
use crate::descriptor::{Descriptor, DescriptorKind};
use crate::error::{Result, SyncError};
use crate::messages::limits::MAX_FRAME_LEN;
use crate::messages::{SyncMessage, PROTOCOL_VERSION};
use crate::replay::replay_record;
use crate::retry::{RetryDecision, DEFAULT_MAX_REPLAY_ATTEMPTS};
use crate::session::{PairSession, SessionReport};
use crate::transport::{Link, LinkEvent, LinkSender, Transport};

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often local log entries are pushed to the peer.
    pub publish_interval: Duration,
    /// Maximum records in one outgoing `changes` message.
    pub max_batch_size: usize,
    /// Maximum sealed size of one outgoing message. Larger batches are split.
    pub max_frame_len: usize,
    /// Failed replays of one record before it is dead-lettered.
    pub max_replay_attempts: u32,
    /// Entries kept in the activity log.
    pub activity_capacity: usize,
    /// PBKDF2 iterations for the pairing key. Both devices must agree.
    pub kdf_iterations: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            publish_interval: Duration::from_millis(1200),
            max_batch_size: 200,
            max_frame_len: MAX_FRAME_LEN,
            max_replay_attempts: DEFAULT_MAX_REPLAY_ATTEMPTS,
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
        }
    }
}

impl SyncConfig {
    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len.min(MAX_FRAME_LEN);
        self
    }

    pub fn with_max_replay_attempts(mut self, attempts: u32) -> Self {
        self.max_replay_attempts = attempts.max(1);
        self
    }

    pub fn with_activity_capacity(mut self, capacity: usize) -> Self {
        self.activity_capacity = capacity;
        self
    }

    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }
}

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No pairing in progress.
    Idle,
    /// Descriptors are being exchanged, or the link is not open yet.
    Negotiating,
    /// The session is live.
    Connected,
    /// The link closed; the engine returns to `Idle` once the loop exits.
    Disconnected,
}

/// Negotiation progress between `create_offer`/`accept_offer` and `start`.
enum Negotiation<P> {
    Offering {
        key: PairingKey,
        session: String,
        pending: P,
    },
    Linked {
        key: PairingKey,
        link: Link,
    },
}

/// Handle to a running session.
pub struct SessionHandle {
    sender: LinkSender,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Close the link. The session ends once the transport reports it.
    pub fn close(&self) {
        self.sender.close();
    }

    /// Whether the session task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end.
    pub async fn finish(self) -> Result<SessionReport> {
        self.task
            .await
            .map_err(|e| SyncError::Transport(format!("session task failed: {}", e)))
    }
}

/// Pairs with one peer at a time and replicates the change log over an
/// encrypted link.
pub struct SyncEngine<S, T: Transport> {
    store: Arc<S>,
    transport: T,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    activity: ActivityLog,
    state: Arc<watch::Sender<EngineState>>,
    running: Arc<AtomicBool>,
    negotiation: Option<Negotiation<T::Pending>>,
    current: Option<LinkSender>,
}

impl<S, T> SyncEngine<S, T>
where
    S: ChangeLog + ReplaySink + 'static,
    T: Transport,
{
    /// Create an idle engine.
    pub fn new(store: Arc<S>, transport: T, config: SyncConfig) -> Self {
        Self::with_clock(store, transport, config, Arc::new(SystemClock))
    }

    /// Create an idle engine reading wall time from `clock`.
    pub fn with_clock(store: Arc<S>, transport: T, config: SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let activity = ActivityLog::with_clock(config.activity_capacity, clock.clone());
        let (state, _) = watch::channel(EngineState::Idle);
        Self {
            store,
            transport,
            config,
            clock,
            activity,
            state: Arc::new(state),
            running: Arc::new(AtomicBool::new(false)),
            negotiation: None,
            current: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// The operator-facing activity log.
    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// The replicated store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Negotiation
    // ─────────────────────────────────────────────────────────────────────────

    /// Begin pairing as the offering side. Returns the offer descriptor to
    /// hand to the peer.
    pub async fn create_offer(&mut self, secret: &str) -> Result<String> {
        self.ensure_not_running()?;
        let key = derive_key(secret, self.config.kdf_iterations).await?;

        let (offer, pending) = match self.transport.create_offer().await {
            Ok(offered) => offered,
            Err(error) => {
                self.reset();
                return Err(error);
            }
        };
        let text = offer.encode()?;

        self.negotiation = Some(Negotiation::Offering {
            key,
            session: offer.session,
            pending,
        });
        self.set_state(EngineState::Negotiating);
        tracing::debug!("offer created");
        Ok(text)
    }

    /// Join a pairing from the peer's offer. Returns the answer descriptor.
    pub async fn accept_offer(&mut self, secret: &str, offer: &str) -> Result<String> {
        self.ensure_not_running()?;
        let offer = Descriptor::parse(offer)?;
        offer.expect_kind(DescriptorKind::Offer)?;
        let key = derive_key(secret, self.config.kdf_iterations).await?;

        let (answer, link) = match self.transport.accept_offer(&offer).await {
            Ok(accepted) => accepted,
            Err(error) => {
                self.reset();
                return Err(error);
            }
        };
        let text = answer.encode()?;

        self.negotiation = Some(Negotiation::Linked { key, link });
        self.set_state(EngineState::Negotiating);
        tracing::debug!("offer accepted");
        Ok(text)
    }

    /// Complete pairing with the peer's answer.
    pub async fn accept_answer(&mut self, answer: &str) -> Result<()> {
        let session = match &self.negotiation {
            Some(Negotiation::Offering { session, .. }) => session.clone(),
            _ => return Err(SyncError::Setup("no offer is pending".into())),
        };
        let answer = Descriptor::parse(answer)?;
        answer.expect_kind(DescriptorKind::Answer)?;
        if answer.session != session {
            return Err(SyncError::Setup("answer is for a different offer".into()));
        }

        let Some(Negotiation::Offering { key, pending, .. }) = self.negotiation.take() else {
            return Err(SyncError::Setup("no offer is pending".into()));
        };
        match self.transport.accept_answer(pending, &answer).await {
            Ok(link) => {
                self.negotiation = Some(Negotiation::Linked { key, link });
                Ok(())
            }
            Err(error) => {
                self.reset();
                Err(error)
            }
        }
    }

    /// Abandon a pending negotiation, or close the running session.
    pub fn disconnect(&mut self) {
        if let Some(sender) = self.current.take() {
            sender.close();
        }
        if self.negotiation.take().is_some() {
            self.reset();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────

    /// Spawn the session loop on the negotiated link.
    pub fn start(&mut self) -> Result<SessionHandle> {
        let Some(Negotiation::Linked { key, link }) = self.negotiation.take() else {
            return Err(SyncError::Setup("engine is not negotiating".into()));
        };

        let (sender, events) = link.into_parts();
        let session = PairSession::new(key, sender.clone(), self.config.max_replay_attempts);
        let session_loop = SessionLoop {
            store: self.store.clone(),
            device: self.store.device_id(),
            session,
            config: self.config.clone(),
            clock: self.clock.clone(),
            activity: self.activity.clone(),
            state: self.state.clone(),
        };

        self.running.store(true, Ordering::SeqCst);
        self.current = Some(sender.clone());
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let report = session_loop.run(events).await;
            running.store(false, Ordering::SeqCst);
            report
        });

        Ok(SessionHandle { sender, task })
    }

    /// Run the session until the link closes.
    pub async fn run(&mut self) -> Result<SessionReport> {
        let report = self.start()?.finish().await;
        self.current = None;
        report
    }

    fn ensure_not_running(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SyncError::Setup("a session is already running".into()));
        }
        Ok(())
    }

    fn set_state(&self, state: EngineState) {
        self.state.send_replace(state);
    }

    fn reset(&mut self) {
        self.negotiation = None;
        self.set_state(EngineState::Idle);
    }
}

/// Derive the pairing key on the blocking pool.
async fn derive_key(secret: &str, iterations: u32) -> Result<PairingKey> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(SyncError::Setup("a pairing secret is required".into()));
    }
    let secret = secret.to_owned();
    let key = tokio::task::spawn_blocking(move || PairingKey::derive_with_iterations(&secret, iterations))
        .await
        .map_err(|e| SyncError::Setup(format!("key derivation task failed: {}", e)))??;
    Ok(key)
}

/// Everything the dispatch loop owns for one session.
struct SessionLoop<S> {
    store: Arc<S>,
    device: DeviceId,
    session: PairSession,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    activity: ActivityLog,
    state: Arc<watch::Sender<EngineState>>,
}

/// Wait for the next tick, or forever without a ticker.
async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl<S> SessionLoop<S>
where
    S: ChangeLog + ReplaySink + 'static,
{
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<LinkEvent>) -> SessionReport {
        let mut ticker: Option<Interval> = None;

        loop {
            tokio::select! {
                event = events.recv() => match event.unwrap_or(LinkEvent::Closed) {
                    LinkEvent::Open => {
                        self.on_open();
                        let period = self.config.publish_interval;
                        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        ticker = Some(interval);
                    }
                    LinkEvent::Message(bytes) => self.on_message(&bytes).await,
                    LinkEvent::Closed => break,
                },
                _ = tick(&mut ticker) => {
                    self.retry_pending().await;
                    self.publish().await;
                }
            }
        }

        self.on_closed();
        self.session.finish_report()
    }

    fn on_open(&mut self) {
        tracing::info!(device = %self.device, "peer connected");
        self.state.send_replace(EngineState::Connected);
        self.activity.record(ActivityKind::Connected, "peer connected");

        let since = self.session.last_applied.get();
        self.session.send(&SyncMessage::Hello {
            ts: self.clock.now(),
            since,
            device: self.device,
            protocol_version: PROTOCOL_VERSION,
        });
        self.session.send(&SyncMessage::ReqState { since });
    }

    fn on_closed(&mut self) {
        self.session.close();
        let report = self.session.finish_report();
        tracing::info!(
            sent = report.records_sent,
            applied = report.records_applied,
            last_applied = %report.last_applied,
            "peer disconnected"
        );
        self.state.send_replace(EngineState::Disconnected);
        self.activity.record(ActivityKind::Disconnected, "peer disconnected");
        self.state.send_replace(EngineState::Idle);
    }

    async fn on_message(&mut self, bytes: &[u8]) {
        let message = match self.session.open(bytes) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%error, "dropping message");
                self.session.report.messages_dropped += 1;
                self.activity
                    .record(ActivityKind::Error, format!("dropped message: {}", error));
                return;
            }
        };
        tracing::debug!(kind = message.kind(), "received");

        match message {
            SyncMessage::Hello {
                device,
                protocol_version,
                ..
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    tracing::warn!(local = PROTOCOL_VERSION, peer = protocol_version, "protocol version mismatch");
                    self.activity.record(
                        ActivityKind::Error,
                        format!(
                            "protocol version mismatch: local {}, peer {}",
                            PROTOCOL_VERSION, protocol_version
                        ),
                    );
                }
                self.session.peer = Some(device);
                self.session.send(&SyncMessage::Ack {
                    since: self.session.last_applied.get(),
                });
            }
            SyncMessage::ReqState { since } => self.answer_state(since).await,
            SyncMessage::Changes { data } => {
                self.apply_changes(data).await;
                self.publish().await;
            }
            SyncMessage::Ack { since } => {
                tracing::debug!(%since, "peer acknowledged");
            }
            SyncMessage::Noop => {}
        }
    }

    /// Reply to `req_state`. Entries up to `lastSentTs` already went out on
    /// this link ahead of the reply.
    async fn answer_state(&mut self, since: Timestamp) {
        let from = since.max(self.session.last_sent.get());
        let records = match self.store.changes_since(from).await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(%error, "failed to read change log");
                return;
            }
        };
        let newest = records.iter().map(|r| r.timestamp).max();

        let outgoing = self.without_echoes(records);
        if outgoing.is_empty() {
            self.session.send(&SyncMessage::Noop);
        } else {
            self.send_batches(outgoing);
        }
        if let Some(newest) = newest {
            self.session.last_sent.advance(newest);
        }
    }

    async fn apply_changes(&mut self, data: Vec<ChangeRecord>) {
        for record in data {
            if record.timestamp <= self.session.last_applied.get() {
                continue;
            }
            self.replay(record, 1).await;
        }
    }

    /// Replay one record, updating counters and the watermark.
    async fn replay(&mut self, record: ChangeRecord, attempt: u32) {
        match replay_record(self.store.as_ref(), &record).await {
            Ok(outcome) => {
                match outcome {
                    ApplyOutcome::Applied => self.session.report.records_applied += 1,
                    ApplyOutcome::Stale | ApplyOutcome::Absent => {
                        self.session.report.records_stale += 1
                    }
                }
                self.session.last_applied.advance(record.timestamp);
            }
            Err(error) => {
                let (collection, ts) = (record.collection.clone(), record.timestamp);
                match self.session.retry.fail(record, attempt, error.to_string()) {
                    RetryDecision::AlreadyQueued => {
                        tracing::debug!(%collection, %ts, "record already queued for retry");
                        return;
                    }
                    RetryDecision::Requeued => {}
                    RetryDecision::DeadLettered(dead) => {
                        self.session.report.dead_lettered += 1;
                        tracing::warn!(
                            collection = %dead.record.collection,
                            ts = %dead.record.timestamp,
                            attempts = dead.attempts,
                            error = %dead.last_error,
                            "giving up on record"
                        );
                    }
                }
                self.session.report.records_failed += 1;
                tracing::warn!(%collection, %ts, attempt, %error, "failed to replay record");
            }
        }
    }

    async fn retry_pending(&mut self) {
        for pending in self.session.retry.drain() {
            self.replay(pending.record, pending.attempts + 1).await;
        }
    }

    /// Push log entries newer than `lastSentTs`.
    async fn publish(&mut self) {
        let records = match self.store.changes_since(self.session.last_sent.get()).await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(%error, "failed to read change log");
                return;
            }
        };
        let Some(newest) = records.iter().map(|r| r.timestamp).max() else {
            return;
        };

        let outgoing = self.without_echoes(records);
        self.send_batches(outgoing);
        self.session.last_sent.advance(newest);
    }

    /// Drop records the peer authored.
    fn without_echoes(&self, records: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
        match self.session.peer {
            Some(peer) => records.into_iter().filter(|r| r.origin() != peer).collect(),
            None => records,
        }
    }

    /// Send `records` in `changes` messages of at most `max_batch_size`
    /// records and `max_frame_len` sealed bytes each.
    fn send_batches(&mut self, records: Vec<ChangeRecord>) {
        let mut batches: VecDeque<&[ChangeRecord]> =
            records.chunks(self.config.max_batch_size.max(1)).collect();

        while let Some(batch) = batches.pop_front() {
            let message = SyncMessage::Changes { data: batch.to_vec() };
            let frame = match self.session.seal(&message) {
                Ok(frame) => frame,
                Err(error) => {
                    tracing::warn!(%error, records = batch.len(), "failed to seal batch");
                    continue;
                }
            };

            if frame.len() <= self.config.max_frame_len {
                if self.session.send_frame(message.kind(), frame) {
                    self.session.report.records_sent += batch.len();
                }
            } else if let [record] = batch {
                self.skip_oversized(record, frame.len());
            } else {
                let (head, tail) = batch.split_at(batch.len() / 2);
                batches.push_front(tail);
                batches.push_front(head);
            }
        }
    }

    fn skip_oversized(&mut self, record: &ChangeRecord, size: usize) {
        self.session.report.records_skipped += 1;
        tracing::warn!(
            collection = %record.collection,
            ts = %record.timestamp,
            size,
            limit = self.config.max_frame_len,
            "record too large to send"
        );
        self.activity.record(
            ActivityKind::Error,
            format!(
                "{} record at {} is too large to send ({} bytes)",
                record.collection, record.timestamp, size
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryNetwork, MemoryTransport};
    use clinic_sync_core::{DocKey, Document, ManualClock, Schema};
    use clinic_sync_store::{MemoryStore, Store};
    use serde_json::json;

    type Engine = SyncEngine<MemoryStore, MemoryTransport>;

    fn config() -> SyncConfig {
        SyncConfig::default()
            .with_kdf_iterations(1_000)
            .with_publish_interval(Duration::from_millis(25))
    }

    fn device(network: &Arc<MemoryNetwork>, id: u8, start: i64) -> (Engine, Arc<MemoryStore>, ManualClock) {
        device_with(network, id, start, config())
    }

    fn device_with(
        network: &Arc<MemoryNetwork>,
        id: u8,
        start: i64,
        config: SyncConfig,
    ) -> (Engine, Arc<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(start);
        let store = Arc::new(MemoryStore::with_clock(
            Schema::clinic(),
            DeviceId::from_bytes([id; 16]),
            Arc::new(clock.clone()),
        ));
        let engine = SyncEngine::with_clock(store.clone(), network.transport(), config, Arc::new(clock.clone()));
        (engine, store, clock)
    }

    async fn pair(a: &mut Engine, b: &mut Engine, secret_a: &str, secret_b: &str) {
        let offer = a.create_offer(secret_a).await.unwrap();
        let answer = b.accept_offer(secret_b, &offer).await.unwrap();
        a.accept_answer(&answer).await.unwrap();
    }

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    async fn wait_for<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !check().await {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_empty_secret_rejected() {
        let network = MemoryNetwork::new();
        let (mut a, _, _) = device(&network, 1, 1_000);

        let result = a.create_offer("   ").await;
        assert!(matches!(result, Err(SyncError::Setup(_))));
        assert_eq!(a.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_setup_requires_negotiation() {
        let network = MemoryNetwork::new();
        let (mut a, _, _) = device(&network, 1, 1_000);

        assert!(matches!(a.accept_answer("{}").await, Err(SyncError::Setup(_))));
        assert!(matches!(a.run().await, Err(SyncError::Setup(_))));
    }

    #[tokio::test]
    async fn test_descriptor_validation() {
        let network = MemoryNetwork::new();
        let (mut a, _, _) = device(&network, 1, 1_000);
        let (mut b, _, _) = device(&network, 2, 1_000);

        assert!(matches!(b.accept_offer("1234", "").await, Err(SyncError::Setup(_))));
        assert!(matches!(b.accept_offer("1234", "{not json").await, Err(SyncError::Setup(_))));

        let offer = a.create_offer("1234").await.unwrap();
        // An offer is not an answer.
        assert!(matches!(a.accept_answer(&offer).await, Err(SyncError::Setup(_))));
        assert_eq!(a.state(), EngineState::Negotiating);

        let foreign = Descriptor::answer("another-session", "memory").encode().unwrap();
        assert!(matches!(a.accept_answer(&foreign).await, Err(SyncError::Setup(_))));
        assert_eq!(a.state(), EngineState::Negotiating);
    }

    #[tokio::test]
    async fn test_initial_sync_and_live_publish() {
        let network = MemoryNetwork::new();
        let (mut a, store_a, clock_a) = device(&network, 1, 100);
        let (mut b, store_b, _) = device(&network, 2, 50);

        store_a.put("patients", doc(json!({"id": 1, "name": "Rao"}))).await.unwrap();
        clock_a.set(200);
        store_a.put("patients", doc(json!({"id": 1, "name": "Rao K"}))).await.unwrap();

        pair(&mut a, &mut b, "1234", "1234").await;
        let session_a = a.start().unwrap();
        let session_b = b.start().unwrap();

        wait_for(|| async {
            store_b
                .get("patients", &DocKey::Int(1))
                .await
                .unwrap()
                .and_then(|d| d.get("name").cloned())
                == Some(json!("Rao K"))
        })
        .await;
        assert_eq!(b.state(), EngineState::Connected);

        // Live edits flow without a new handshake.
        clock_a.set(300);
        store_a.insert("appointments", doc(json!({"patientId": 1}))).await.unwrap();
        wait_for(|| async { store_b.list("appointments").await.unwrap().len() == 1 }).await;

        session_a.close();
        let report_a = session_a.finish().await.unwrap();
        let report_b = session_b.finish().await.unwrap();

        assert_eq!(report_b.last_applied, Timestamp(300));
        assert_eq!(report_b.peer, Some(DeviceId::from_bytes([1; 16])));
        assert!(report_a.records_sent >= 3);
        assert_eq!(a.state(), EngineState::Idle);
        assert_eq!(b.state(), EngineState::Idle);
        assert_eq!(a.activity().of_kind(ActivityKind::Connected).len(), 1);
        assert_eq!(a.activity().of_kind(ActivityKind::Disconnected).len(), 1);
    }

    #[tokio::test]
    async fn test_log_is_sent_once_per_session() {
        let network = MemoryNetwork::new();
        let (mut a, store_a, _) = device(&network, 1, 100);
        let (mut b, store_b, _) = device(&network, 2, 100);

        store_a.put("patients", doc(json!({"id": 1, "name": "Rao"}))).await.unwrap();

        pair(&mut a, &mut b, "1234", "1234").await;
        let session_a = a.start().unwrap();
        let session_b = b.start().unwrap();

        wait_for(|| async { store_b.get("patients", &DocKey::Int(1)).await.unwrap().is_some() }).await;
        // Several publish ticks with nothing new to say.
        tokio::time::sleep(Duration::from_millis(150)).await;

        session_a.close();
        let report_a = session_a.finish().await.unwrap();
        session_b.finish().await.unwrap();

        assert_eq!(report_a.records_sent, 1);
        assert_eq!(report_a.last_sent, Timestamp(100));
    }

    #[tokio::test]
    async fn test_batches_split_to_fit_frames() {
        let network = MemoryNetwork::new();
        let small_frames = config().with_max_frame_len(16 * 1024);
        let (mut a, store_a, clock_a) = device_with(&network, 1, 100, small_frames);
        let (mut b, store_b, _) = device(&network, 2, 100);

        let note = "x".repeat(1_000);
        for i in 0..30 {
            clock_a.set(100 + i);
            store_a
                .put("patients", doc(json!({"id": i, "note": note})))
                .await
                .unwrap();
        }
        // Too large for any frame on its own.
        clock_a.set(500);
        store_a
            .put("patients", doc(json!({"id": 99, "note": "y".repeat(20_000)})))
            .await
            .unwrap();

        pair(&mut a, &mut b, "1234", "1234").await;
        let session_a = a.start().unwrap();
        let session_b = b.start().unwrap();

        wait_for(|| async { store_b.list("patients").await.unwrap().len() == 30 }).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        session_a.close();
        let report_a = session_a.finish().await.unwrap();
        let report_b = session_b.finish().await.unwrap();

        assert_eq!(report_a.records_sent, 30);
        assert_eq!(report_a.records_skipped, 1);
        assert_eq!(report_b.records_applied, 30);
        assert_eq!(report_b.messages_dropped, 0);
        assert!(store_b.get("patients", &DocKey::Int(99)).await.unwrap().is_none());
        assert_eq!(a.activity().of_kind(ActivityKind::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_records_are_not_echoed() {
        let network = MemoryNetwork::new();
        let (mut a, store_a, _) = device(&network, 1, 100);
        let (mut b, store_b, _) = device(&network, 2, 500);

        store_a.put("patients", doc(json!({"id": 1, "name": "Rao"}))).await.unwrap();

        pair(&mut a, &mut b, "1234", "1234").await;
        let session_a = a.start().unwrap();
        let session_b = b.start().unwrap();

        wait_for(|| async { store_b.get("patients", &DocKey::Int(1)).await.unwrap().is_some() }).await;
        // Let a few publish ticks pass.
        tokio::time::sleep(Duration::from_millis(120)).await;

        session_b.close();
        let report_a = session_a.finish().await.unwrap();
        let report_b = session_b.finish().await.unwrap();

        assert_eq!(report_b.records_sent, 0);
        assert_eq!(report_a.records_applied, 0);
        assert_eq!(store_a.changes_since(Timestamp::ZERO).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_secret_drops_messages() {
        let network = MemoryNetwork::new();
        let (mut a, store_a, _) = device(&network, 1, 100);
        let (mut b, store_b, _) = device(&network, 2, 100);

        store_a.put("patients", doc(json!({"id": 1, "name": "Rao"}))).await.unwrap();

        pair(&mut a, &mut b, "1234", "4321").await;
        let session_a = a.start().unwrap();
        let session_b = b.start().unwrap();

        wait_for(|| async { !b.activity().of_kind(ActivityKind::Error).is_empty() }).await;
        session_a.close();
        session_a.finish().await.unwrap();
        let report_b = session_b.finish().await.unwrap();

        assert!(report_b.messages_dropped > 0);
        assert_eq!(report_b.records_applied, 0);
        assert_eq!(report_b.last_applied, Timestamp::ZERO);
        assert!(store_b.list("patients").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cannot_negotiate_while_running() {
        let network = MemoryNetwork::new();
        let (mut a, _, _) = device(&network, 1, 100);
        let (mut b, _, _) = device(&network, 2, 100);

        pair(&mut a, &mut b, "1234", "1234").await;
        let session_a = a.start().unwrap();
        let session_b = b.start().unwrap();

        assert!(matches!(a.create_offer("1234").await, Err(SyncError::Setup(_))));

        a.disconnect();
        session_a.finish().await.unwrap();
        session_b.finish().await.unwrap();
        assert!(a.create_offer("1234").await.is_ok());
    }
}
