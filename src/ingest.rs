//! # Ingestion Loop
//!
//! Ties the transport, decoder, store and broadcaster together and owns the
//! reconnect policy.
//!
//! ## Link States
//!
//! ```text
//! Disconnected ──> Connecting ──> Streaming
//!      ^               │              │
//!      └── open failed ┘              │ read error / end of stream
//!                      ^──────────────┘
//! any state ──shutdown──> Closed
//! ```
//!
//! Open failures back off exponentially (doubling, capped). Before the first
//! successful open the number of attempts is bounded by
//! `reconnect.max_startup_attempts`; once the link has streamed, the loop
//! keeps retrying until shutdown.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::config::ReconnectConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::{DecodeOutcome, Protocol};
use crate::server::ClientRegistry;
use crate::telemetry::TelemetryStore;
use crate::transport::{Connector, RawRecord, RecordSource};

/// Number of records between status log messages
pub const LOG_INTERVAL_RECORDS: u64 = 1000;

/// Connection state of the sensor link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Streaming,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Streaming => "streaming",
            LinkState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Running counters for the ingestion loop
#[derive(Debug, Default)]
pub struct IngestStats {
    open_attempts: AtomicU64,
    records: AtomicU64,
    decoded: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
    read_errors: AtomicU64,
    broadcasts: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatsSnapshot {
    pub open_attempts: u64,
    pub records: u64,
    pub decoded: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub read_errors: u64,
    pub broadcasts: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            open_attempts: self.open_attempts.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Capped exponential backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self { initial, max, next: initial }
    }

    /// Delay to wait now; doubles the following one up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

impl From<&ReconnectConfig> for Backoff {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(config.initial_backoff(), config.max_backoff())
    }
}

enum StreamEnd {
    Shutdown,
    Failed(BridgeError),
}

/// The single task reading the sensor
pub struct IngestionLoop<C> {
    connector: C,
    protocol: Protocol,
    store: Arc<TelemetryStore>,
    registry: Arc<ClientRegistry>,
    reconnect: ReconnectConfig,
    state_tx: watch::Sender<LinkState>,
    stats: Arc<IngestStats>,
}

impl<C: Connector> IngestionLoop<C> {
    pub fn new(
        connector: C,
        protocol: Protocol,
        store: Arc<TelemetryStore>,
        registry: Arc<ClientRegistry>,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        Self {
            connector,
            protocol,
            store,
            registry,
            reconnect,
            state_tx,
            stats: Arc::new(IngestStats::default()),
        }
    }

    /// Receiver observing link state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    fn set_state(&self, state: LinkState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!("Link state: {} -> {}", current, state);
            *current = state;
            true
        });
    }

    /// Run until `shutdown` turns true (or its sender is dropped)
    ///
    /// # Errors
    ///
    /// Returns `OpenAttemptsExhausted` if the transport never opened within
    /// `max_startup_attempts`. Read errors never end the loop.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut backoff = Backoff::from(&self.reconnect);
        let mut has_streamed = false;
        let mut failed_opens: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(LinkState::Connecting);
            IngestStats::bump(&self.stats.open_attempts);

            let opened = tokio::select! {
                opened = self.connector.open() => opened,
                _ = shutdown.changed() => break,
            };

            let mut source = match opened {
                Ok(source) => source,
                Err(e) => {
                    failed_opens += 1;
                    self.set_state(LinkState::Disconnected);

                    let limit = self.reconnect.max_startup_attempts;
                    if !has_streamed && limit > 0 && failed_opens >= limit {
                        error!("Giving up on sensor after {} attempts: {}", failed_opens, e);
                        self.set_state(LinkState::Closed);
                        return Err(BridgeError::OpenAttemptsExhausted { attempts: failed_opens });
                    }

                    let delay = backoff.next_delay();
                    warn!("Sensor open failed ({}), retrying in {} ms", e, delay.as_millis());
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            has_streamed = true;
            failed_opens = 0;
            self.set_state(LinkState::Streaming);
            info!("Streaming telemetry from {}", source.endpoint());

            let end = self.stream(source.as_mut(), &mut backoff, &mut shutdown).await;
            let endpoint = source.endpoint().to_string();
            drop(source);

            match end {
                StreamEnd::Shutdown => break,
                StreamEnd::Failed(e) => {
                    IngestStats::bump(&self.stats.read_errors);
                    if e.is_transient() {
                        warn!("Lost sensor link on {}: {}", endpoint, e);
                    } else {
                        error!("Sensor link on {} failed: {}", endpoint, e);
                    }

                    self.set_state(LinkState::Connecting);
                    let delay = backoff.next_delay();
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.set_state(LinkState::Closed);
        info!("Ingestion stopped: {:?}", self.stats.snapshot());
        Ok(())
    }

    async fn stream(
        &self,
        source: &mut dyn RecordSource,
        backoff: &mut Backoff,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        loop {
            let record = tokio::select! {
                record = source.next_record() => record,
                _ = shutdown.changed() => return StreamEnd::Shutdown,
            };

            match record {
                Ok(record) => {
                    backoff.reset();
                    self.handle_record(&record);
                }
                Err(e) => return StreamEnd::Failed(e),
            }
        }
    }

    /// Decode one record; on success merge it and broadcast the snapshot
    pub fn handle_record(&self, record: &RawRecord) -> DecodeOutcome {
        let records = IngestStats::bump(&self.stats.records);
        let outcome = self.protocol.decode(record);

        match &outcome {
            DecodeOutcome::Decoded(delta) => {
                IngestStats::bump(&self.stats.decoded);
                let snapshot = self.store.apply_update(delta);
                match self.registry.broadcast_snapshot(&snapshot) {
                    Ok(report) => {
                        IngestStats::bump(&self.stats.broadcasts);
                        trace!("Broadcast {:?} to clients: {:?}", delta.categories(), report);
                    }
                    Err(e) => warn!("Failed to serialize snapshot: {}", e),
                }
            }
            DecodeOutcome::Ignored => {
                IngestStats::bump(&self.stats.ignored);
                trace!("Ignored record: {:?}", record);
            }
            DecodeOutcome::Malformed(reason) => {
                IngestStats::bump(&self.stats.malformed);
                debug!("Dropped malformed record ({}): {:?}", reason, record);
            }
        }

        if records % LOG_INTERVAL_RECORDS == 0 {
            let stats = self.stats.snapshot();
            info!(
                "Read {} records ({} decoded, {} ignored, {} malformed), {} clients",
                stats.records,
                stats.decoded,
                stats.ignored,
                stats.malformed,
                self.registry.len()
            );
        }

        outcome
    }
}

/// Sleep for `delay`; returns true if shutdown was requested meanwhile
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        _ = shutdown.changed() => true,
    }
}
