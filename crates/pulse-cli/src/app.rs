//! Main application orchestration.
//!
//! Owns the feed client, wires the typed event stream into logs and
//! Prometheus metrics, and reports staleness and protocol statistics on a
//! fixed interval.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use pulse_core::DataKind;
use pulse_telemetry::metrics;
use pulse_ws::{Channel, FeedClient, FeedEvent, StatsSnapshot};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    client: FeedClient,
    // Last stats snapshot, for turning cumulative counters into deltas.
    last_stats: StatsSnapshot,
}

impl Application {
    /// Create the application and its feed client. No connection yet.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let client = FeedClient::new(config.feed_config());
        Ok(Self {
            config,
            client,
            last_stats: StatsSnapshot::default(),
        })
    }

    /// The owned client, for callers that need direct access.
    pub fn client(&self) -> &FeedClient {
        &self.client
    }

    /// Connect, subscribe the configured symbols, and run until ctrl-c.
    pub async fn run(&mut self) -> AppResult<()> {
        let mut events = self.client.events();

        metrics::set_feed_state("connecting");
        self.client.connect().await.map_err(Box::new)?;

        for symbol in &self.config.symbols {
            self.client
                .subscribe(Channel::Quotes, Some(symbol.clone()));
            if self.config.subscribe_candles {
                self.client
                    .subscribe(Channel::Candles, Some(symbol.clone()));
            }
        }
        info!(count = self.config.symbols.len(), "Symbols subscribed");

        let mut report =
            tokio::time::interval(Duration::from_secs(self.config.report_interval_secs));
        report.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    self.client.disconnect();
                    metrics::set_feed_state("disconnected");
                    return Ok(());
                }

                event = events.recv() => {
                    match event {
                        Ok(event) => self.handle_event(event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Event stream lagged; events were dropped");
                        }
                        Err(RecvError::Closed) => return Err(AppError::EventStreamClosed),
                    }
                }

                _ = report.tick() => {
                    self.report_status();
                }
            }
        }
    }

    fn handle_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Connected => {
                metrics::set_feed_state("connected");
                info!("Feed connected");
            }
            FeedEvent::Disconnected { code, reason } => {
                metrics::set_feed_state("disconnected");
                metrics::FEED_RECONNECTS_TOTAL
                    .with_label_values(&["transport_loss"])
                    .inc();
                warn!(code, %reason, "Feed disconnected");
            }
            FeedEvent::Subscribed(sub) => info!(%sub, "Subscribed"),
            FeedEvent::Unsubscribed(sub) => info!(%sub, "Unsubscribed"),
            FeedEvent::Quote(quote) => {
                metrics::FRAMES_TOTAL.with_label_values(&["quote"]).inc();
                info!(
                    symbol = %quote.symbol,
                    price = %quote.price,
                    bid = %quote.bid,
                    ask = %quote.ask,
                    "Quote"
                );
            }
            FeedEvent::Candles(series) => {
                metrics::FRAMES_TOTAL.with_label_values(&["candles"]).inc();
                debug!(symbol = %series.symbol, count = series.len(), "Candles");
            }
            FeedEvent::ServerError { message } => {
                metrics::SERVER_ERRORS_TOTAL
                    .with_label_values(&["feed"])
                    .inc();
                warn!(%message, "Feed server error");
            }
            FeedEvent::ReconnectExhausted { attempts } => {
                metrics::set_feed_state("exhausted");
                error!(attempts, "Reconnect attempts exhausted; manual reconnect required");
            }
        }
    }

    fn report_status(&mut self) {
        let stats = self.client.stats();
        self.publish_error_deltas(&stats);

        let stale_after = Duration::from_millis(self.config.stale_after_ms);
        let stale: Vec<&str> = self
            .config
            .symbols
            .iter()
            .filter(|symbol| self.client.is_stale(DataKind::Quote, symbol, stale_after))
            .map(String::as_str)
            .collect();

        info!(
            state = %self.client.state(),
            frames = stats.frames_received,
            dropped = stats.dropped_frames(),
            reconnects = stats.reconnect_attempts,
            queued = self.client.queued(),
            stale_symbols = ?stale,
            "Feed status"
        );

        self.last_stats = stats;
    }

    // Protocol counters are cumulative; Prometheus counters move by delta.
    fn publish_error_deltas(&self, stats: &StatsSnapshot) {
        let deltas = [
            (
                "malformed",
                stats.malformed_frames - self.last_stats.malformed_frames,
            ),
            (
                "unknown_kind",
                stats.unknown_kinds - self.last_stats.unknown_kinds,
            ),
            (
                "invalid_shape",
                stats.invalid_shapes - self.last_stats.invalid_shapes,
            ),
            (
                "oversized",
                stats.oversized_rejected - self.last_stats.oversized_rejected,
            ),
            (
                "queue_full",
                stats.queue_rejected - self.last_stats.queue_rejected,
            ),
        ];
        for (reason, delta) in deltas {
            if delta > 0 {
                metrics::FRAME_ERRORS_TOTAL
                    .with_label_values(&[reason])
                    .inc_by(delta as f64);
            }
        }
    }
}
