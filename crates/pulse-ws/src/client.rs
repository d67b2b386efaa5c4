//! Feed client: connection lifecycle, sending, and inbound dispatch.
//!
//! One `FeedClient` owns one connection. An IO task per connection session
//! runs the read/write/heartbeat select loop; callers interact through
//! non-blocking methods and the typed event stream. Reconnection after a
//! transport drop is automatic with exponential backoff up to a ceiling;
//! a failed explicit `connect()` is never retried by the client.

use crate::cache::LatestCache;
use crate::error::{WsError, WsResult};
use crate::events::{EventBus, FeedEvent};
use crate::heartbeat::Heartbeat;
use crate::message::{decode_frame, ClientFrame, ServerFrame};
use crate::queue::SendQueue;
use crate::state::{ConnectionState, StateEvent, StateMachine};
use crate::stats::{ClientStats, StatsSnapshot};
use crate::subscription::{Channel, Subscription, SubscriptionSet};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use pulse_core::{CandleSeries, DataKind, Quote};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Close code reported when the transport died without a close frame.
const ABNORMAL_CLOSE: u16 = 1006;

/// Capacity of the live outbound channel between callers and the IO task.
const OUTBOUND_CHANNEL_CAPACITY: usize = 128;

/// Feed client configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket URL of the market data server.
    pub url: String,
    /// Handshake timeout.
    pub connect_timeout_ms: u64,
    /// Quiet-link interval before an application-level ping is sent.
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this after a ping.
    pub heartbeat_timeout_ms: u64,
    /// Reconnect attempt ceiling (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Ceiling for a single backoff delay.
    pub reconnect_max_delay_ms: u64,
    /// Maximum serialized outbound frame size.
    pub max_frame_bytes: usize,
    /// Capacity of the offline outbound queue.
    pub outbound_queue_limit: usize,
    /// Event broadcast channel capacity.
    pub event_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 10_000,
            max_reconnect_attempts: 10,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_frame_bytes: 64 * 1024,
            outbound_queue_limit: 256,
            event_capacity: 1_024,
        }
    }
}

impl FeedConfig {
    /// Delay before reconnect attempt `attempt`: `base * 2^attempt`, capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(20);
        let delay = self
            .reconnect_base_delay_ms
            .saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.reconnect_max_delay_ms))
    }
}

/// How one connection's select loop ended.
enum LoopExit {
    /// Session token cancelled (explicit disconnect or superseded session).
    Shutdown,
    /// Server sent a close frame, or the stream ended.
    Closed { code: u16, reason: String },
}

struct ClientShared {
    config: FeedConfig,
    machine: RwLock<StateMachine>,
    subscriptions: SubscriptionSet,
    queue: SendQueue,
    cache: LatestCache,
    heartbeat: Heartbeat,
    events: EventBus,
    stats: ClientStats,
    /// Live outbound path to the IO task.
    outbound_tx: mpsc::Sender<String>,
    /// Consumed by the IO task; survives reconnects.
    outbound_rx: TokioMutex<mpsc::Receiver<String>>,
    /// Cancellation token for the current connection session.
    session: RwLock<CancellationToken>,
}

/// Realtime market data client.
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct FeedClient {
    shared: Arc<ClientShared>,
}

impl FeedClient {
    /// Create a client. No connection is made until [`connect`](Self::connect).
    pub fn new(config: FeedConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(ClientShared {
                machine: RwLock::new(StateMachine::new(config.max_reconnect_attempts)),
                subscriptions: SubscriptionSet::new(),
                queue: SendQueue::new(config.outbound_queue_limit),
                cache: LatestCache::new(),
                heartbeat: Heartbeat::new(
                    Duration::from_millis(config.heartbeat_interval_ms),
                    Duration::from_millis(config.heartbeat_timeout_ms),
                ),
                events: EventBus::new(config.event_capacity),
                stats: ClientStats::default(),
                outbound_tx,
                outbound_rx: TokioMutex::new(outbound_rx),
                session: RwLock::new(CancellationToken::new()),
                config,
            }),
        }
    }

    /// Connect to the feed server.
    ///
    /// Resolves once the handshake completes; queue drain and subscription
    /// replay are the first writes on the new socket. A no-op when already
    /// connected. A failed handshake is returned to the caller and never
    /// retried; automatic reconnection only follows post-connect drops.
    pub async fn connect(&self) -> WsResult<()> {
        {
            let mut machine = self.shared.machine.write();
            match machine.state() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => return Err(WsError::ConnectInProgress),
                _ => {
                    machine.apply(StateEvent::ConnectRequested)?;
                }
            }
        }

        // Supersede any pending backoff session before dialing.
        let token = self.replace_session();

        match self.handshake().await {
            Ok(stream) => {
                self.shared
                    .machine
                    .write()
                    .apply(StateEvent::HandshakeSucceeded)?;
                info!(url = %self.shared.config.url, "Feed connected");
                self.shared.events.emit(FeedEvent::Connected);
                let client = self.clone();
                tokio::spawn(async move { client.run_session(stream, token).await });
                Ok(())
            }
            Err(e) => {
                let _ = self.shared.machine.write().apply(StateEvent::HandshakeFailed);
                Err(e)
            }
        }
    }

    /// Disconnect and stay disconnected.
    ///
    /// Cancels the session token, which stops the heartbeat and any pending
    /// backoff timer; the IO task sends a normal close frame on its way out.
    pub fn disconnect(&self) {
        info!("Feed disconnect requested");
        self.shared.session.read().cancel();
        let _ = self
            .shared
            .machine
            .write()
            .apply(StateEvent::DisconnectRequested);
    }

    /// Send an application message.
    ///
    /// Returns `true` when handed to the live connection, `false` when the
    /// message was queued for replay, rejected (oversized, queue full), or
    /// failed to serialize. Never blocks, never panics.
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound message");
                return false;
            }
        };
        self.send_frame(frame)
    }

    fn send_frame(&self, frame: String) -> bool {
        if frame.len() > self.shared.config.max_frame_bytes {
            self.shared.stats.record_oversized_rejected();
            warn!(
                bytes = frame.len(),
                limit = self.shared.config.max_frame_bytes,
                "Rejected oversized outbound message"
            );
            return false;
        }

        let frame = if self.is_connected() {
            match self.shared.outbound_tx.try_send(frame) {
                Ok(()) => return true,
                // Channel full or IO task gone: fall back to the queue.
                Err(TrySendError::Full(frame)) | Err(TrySendError::Closed(frame)) => frame,
            }
        } else {
            frame
        };

        match self.shared.queue.push(frame) {
            Ok(()) => false,
            Err(_) => {
                self.shared.stats.record_queue_rejected();
                warn!(
                    limit = self.shared.config.outbound_queue_limit,
                    "Outbound queue full; message rejected"
                );
                false
            }
        }
    }

    /// Add a subscription. Returns `false` when already subscribed.
    ///
    /// The control frame is sent immediately when connected; otherwise the
    /// set mutation alone is remembered and the whole desired state is
    /// re-derived on the next successful connect.
    pub fn subscribe(&self, channel: Channel, symbol: impl Into<Option<String>>) -> bool {
        let sub = Subscription::new(channel, symbol);
        if !self.shared.subscriptions.insert(sub.clone()) {
            debug!(%sub, "Already subscribed");
            return false;
        }
        if self.is_connected() {
            self.push_control(ClientFrame::subscribe(&sub));
        }
        true
    }

    /// Remove a subscription. Returns `false` when it was not present.
    pub fn unsubscribe(&self, channel: Channel, symbol: impl Into<Option<String>>) -> bool {
        let sub = Subscription::new(channel, symbol);
        if !self.shared.subscriptions.remove(&sub) {
            return false;
        }
        if self.is_connected() {
            self.push_control(ClientFrame::unsubscribe(&sub));
        }
        true
    }

    // Control frames are re-derived from the subscription set on reconnect,
    // never queued as raw messages.
    fn push_control(&self, frame: ClientFrame) {
        match serde_json::to_string(&frame) {
            Ok(text) => {
                if let Err(e) = self.shared.outbound_tx.try_send(text) {
                    warn!(
                        error = %e,
                        "Failed to push control frame; desired state is restored on reconnect"
                    );
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize control frame"),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.machine.read().state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.machine.read().is_connected()
    }

    /// Open a receiver on the typed event stream.
    pub fn events(&self) -> broadcast::Receiver<FeedEvent> {
        self.shared.events.subscribe()
    }

    /// Protocol statistics snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Latest cached quote for a symbol.
    pub fn quote(&self, symbol: &str) -> Option<Quote> {
        self.shared.cache.quote(symbol)
    }

    /// Latest cached candle series for a symbol.
    pub fn candles(&self, symbol: &str) -> Option<CandleSeries> {
        self.shared.cache.candles(symbol)
    }

    /// True when no cached entry exists or it is older than `max_age`.
    pub fn is_stale(&self, kind: DataKind, symbol: &str, max_age: Duration) -> bool {
        self.shared.cache.is_stale(kind, symbol, max_age)
    }

    /// Drop all cached values.
    pub fn clear_cache(&self) {
        self.shared.cache.clear();
    }

    /// Current desired subscription set.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.shared.subscriptions.snapshot()
    }

    /// Frames waiting in the offline queue.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }

    fn replace_session(&self) -> CancellationToken {
        let mut session = self.shared.session.write();
        session.cancel();
        let token = CancellationToken::new();
        *session = token.clone();
        token
    }

    async fn handshake(&self) -> WsResult<WsStream> {
        let timeout = Duration::from_millis(self.shared.config.connect_timeout_ms);
        match tokio::time::timeout(
            timeout,
            connect_async_tls_with_config(self.shared.config.url.as_str(), None, true, None),
        )
        .await
        {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(WsError::ConnectTimeout {
                timeout_ms: self.shared.config.connect_timeout_ms,
            }),
        }
    }

    /// Run connections until shutdown, normal close, or retry exhaustion.
    async fn run_session(&self, mut stream: WsStream, token: CancellationToken) {
        loop {
            let exit = self.run_connection(stream, &token).await;

            if token.is_cancelled() {
                // disconnect() or a superseding connect() owns the state.
                return;
            }

            let (code, reason, reconnect) = match exit {
                Ok(LoopExit::Shutdown) => return,
                Ok(LoopExit::Closed { code, reason }) => {
                    let abnormal = code != 1000;
                    (code, reason, abnormal)
                }
                Err(e) => {
                    warn!(error = %e, "Feed connection lost");
                    (ABNORMAL_CLOSE, e.to_string(), true)
                }
            };

            if self
                .shared
                .machine
                .write()
                .apply(StateEvent::TransportLost)
                .is_err()
            {
                return;
            }
            self.shared
                .events
                .emit(FeedEvent::Disconnected { code, reason });

            if !reconnect {
                info!("Feed closed normally; not reconnecting");
                return;
            }

            stream = match self.reconnect(&token).await {
                Some(stream) => stream,
                None => return,
            };
        }
    }

    /// Backoff-reconnect loop. Returns a fresh stream, or `None` when the
    /// session was cancelled or retries were exhausted.
    async fn reconnect(&self, token: &CancellationToken) -> Option<WsStream> {
        loop {
            let scheduled = match self.shared.machine.write().apply(StateEvent::BackoffScheduled) {
                Ok(state) => state,
                Err(e) => {
                    debug!(error = %e, "Reconnect scheduling stopped");
                    return None;
                }
            };

            let attempt = match scheduled {
                ConnectionState::Backoff { attempt } => attempt,
                ConnectionState::Exhausted => {
                    let attempts = self.shared.machine.read().attempts();
                    error!(attempts, "Reconnect attempts exhausted");
                    self.shared
                        .events
                        .emit(FeedEvent::ReconnectExhausted { attempts });
                    return None;
                }
                state => {
                    debug!(%state, "Unexpected state after scheduling");
                    return None;
                }
            };

            self.shared.stats.record_reconnect_attempt();
            let delay = self.shared.config.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = token.cancelled() => {
                    debug!("Session cancelled during backoff");
                    return None;
                }
            }

            if self
                .shared
                .machine
                .write()
                .apply(StateEvent::BackoffElapsed)
                .is_err()
            {
                return None;
            }

            match self.handshake().await {
                Ok(stream) => {
                    if token.is_cancelled() {
                        return None;
                    }
                    if self
                        .shared
                        .machine
                        .write()
                        .apply(StateEvent::HandshakeSucceeded)
                        .is_err()
                    {
                        return None;
                    }
                    info!("Feed reconnected");
                    self.shared.events.emit(FeedEvent::Connected);
                    return Some(stream);
                }
                Err(e) => {
                    warn!(error = %e, "Reconnect attempt failed");
                    let _ = self.shared.machine.write().apply(StateEvent::HandshakeFailed);
                }
            }
        }
    }

    /// One connection's lifetime: replay, then the select loop.
    async fn run_connection(
        &self,
        stream: WsStream,
        token: &CancellationToken,
    ) -> WsResult<LoopExit> {
        let (mut write, mut read) = stream.split();

        // Queued frames go out first, in FIFO order, before the current
        // subscription set is re-derived and replayed.
        self.flush_queue(&mut write).await?;
        self.replay_subscriptions(&mut write).await?;

        self.shared.heartbeat.reset();
        let mut heartbeat_tick = tokio::time::interval(self.shared.heartbeat.check_period());
        heartbeat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let outbound_recv = async { self.shared.outbound_rx.lock().await.recv().await };

            tokio::select! {
                () = token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Failed to send close frame during shutdown");
                    }
                    return Ok(LoopExit::Shutdown);
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = self.handle_text_frame(&text) {
                                write.send(Message::Text(reply)).await?;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.shared.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "normal close".to_string()));
                            warn!(code, %reason, "Feed closed by server");
                            return Ok(LoopExit::Closed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Feed read error");
                            return Err(e.into());
                        }
                        None => {
                            return Ok(LoopExit::Closed {
                                code: ABNORMAL_CLOSE,
                                reason: "stream ended".to_string(),
                            });
                        }
                        _ => {}
                    }
                }

                outbound = outbound_recv => {
                    if let Some(frame) = outbound {
                        write.send(Message::Text(frame)).await?;
                    }
                }

                _ = heartbeat_tick.tick() => {
                    if self.shared.heartbeat.timed_out() {
                        error!("Heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.shared.heartbeat.should_ping() {
                        let ping = serde_json::to_string(&ClientFrame::Ping)?;
                        write.send(Message::Text(ping)).await?;
                        self.shared.heartbeat.record_ping();
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        }
    }

    /// Dispatch one inbound text frame. Returns an optional reply frame.
    fn handle_text_frame(&self, text: &str) -> Option<String> {
        self.shared.stats.record_frame();
        self.shared.heartbeat.record_activity();

        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.shared.stats.record_decode_error(e.class());
                debug!(error = %e, "Dropped inbound frame");
                return None;
            }
        };

        match frame {
            ServerFrame::Ping => {
                return serde_json::to_string(&ClientFrame::Pong).ok();
            }
            ServerFrame::Pong => self.shared.heartbeat.record_pong(),
            ServerFrame::Subscribed(sub) => {
                self.shared.events.emit(FeedEvent::Subscribed(sub));
            }
            ServerFrame::Unsubscribed(sub) => {
                self.shared.events.emit(FeedEvent::Unsubscribed(sub));
            }
            ServerFrame::Quote(quote) => {
                self.shared.cache.insert_quote(quote.clone());
                self.shared.events.emit(FeedEvent::Quote(quote));
            }
            ServerFrame::Candles(series) => {
                self.shared.cache.insert_candles(series.clone());
                self.shared.events.emit(FeedEvent::Candles(series));
            }
            ServerFrame::Error { message } => {
                self.shared.stats.record_server_error();
                warn!(%message, "Server reported error");
                self.shared.events.emit(FeedEvent::ServerError { message });
            }
        }
        None
    }

    async fn flush_queue(&self, write: &mut WsSink) -> WsResult<()> {
        let frames = self.shared.queue.drain();
        if frames.is_empty() {
            return Ok(());
        }
        info!(count = frames.len(), "Draining outbound queue");
        for frame in frames {
            write.send(Message::Text(frame)).await?;
        }
        Ok(())
    }

    async fn replay_subscriptions(&self, write: &mut WsSink) -> WsResult<()> {
        let subs = self.shared.subscriptions.snapshot();
        if subs.is_empty() {
            return Ok(());
        }
        info!(count = subs.len(), "Replaying subscriptions");
        for sub in subs {
            let frame = serde_json::to_string(&ClientFrame::subscribe(&sub))?;
            write.send(Message::Text(frame)).await?;
        }
        Ok(())
    }
}
