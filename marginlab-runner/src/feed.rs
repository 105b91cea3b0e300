//! Live kline feed boundary.
//!
//! A single updater thread owns the connection and is the only writer of the
//! [`PriceBoard`]; any number of readers take snapshots through cloned handles.
//! Subscriptions can be added while the feed runs: they are sent at once when
//! connected and queued otherwise. On disconnect the updater waits with
//! exponential backoff, reconnects, and replays every registered subscription.
//!
//! The network itself sits behind [`FeedTransport`]; no concrete socket
//! implementation lives in this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Latest close seen for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub close: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
}

/// Per-symbol single-slot store of the latest price.
#[derive(Debug, Clone, Default)]
pub struct PriceBoard {
    inner: Arc<RwLock<HashMap<String, PriceSnapshot>>>,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `snapshot` unless the slot already holds a newer event.
    /// Returns whether the slot changed.
    pub fn publish(&self, snapshot: PriceSnapshot) -> bool {
        let mut slots = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match slots.get(&snapshot.symbol) {
            Some(current) if current.event_time > snapshot.event_time => false,
            _ => {
                slots.insert(snapshot.symbol.clone(), snapshot);
                true
            }
        }
    }

    pub fn latest(&self, symbol: &str) -> Option<PriceSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned()
    }

    /// Copy of every slot.
    pub fn snapshot(&self) -> HashMap<String, PriceSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reconnect delay: doubles after each failure up to `max`, reset on success.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns double (capped).
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// One kline stream, e.g. `btcusdt@kline_15m`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub symbol: String,
    pub interval: String,
}

impl Subscription {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
        }
    }

    pub fn stream_name(&self) -> String {
        format!("{}@kline_{}", self.symbol.to_lowercase(), self.interval)
    }

    /// The `SUBSCRIBE` request for this stream.
    pub fn payload(&self, id: u64) -> Value {
        json!({
            "method": "SUBSCRIBE",
            "params": [self.stream_name()],
            "id": id,
        })
    }
}

/// Parse a kline event. Anything else (acks, other event types, garbage) is `None`.
pub fn parse_kline_message(text: &str) -> Option<PriceSnapshot> {
    let msg: Value = serde_json::from_str(text).ok()?;
    if msg.get("e")?.as_str()? != "kline" {
        return None;
    }
    let symbol = msg.get("s")?.as_str()?.to_string();
    let close = number_or_string(msg.get("k")?.get("c")?)?;
    let event_time = msg
        .get("E")
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);
    Some(PriceSnapshot {
        symbol,
        close,
        event_time,
    })
}

fn number_or_string(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::String(s) => s.parse::<f64>().ok(),
        other => other.as_f64(),
    };
    parsed.filter(|c| c.is_finite())
}

/// Transport failures. Any of these triggers a reconnect.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("connection closed: {0}")]
    Closed(String),
}

/// A message-oriented connection to the market-data source.
pub trait FeedTransport: Send {
    /// (Re)open the connection.
    fn connect(&mut self) -> Result<(), FeedError>;
    fn send(&mut self, text: &str) -> Result<(), FeedError>;
    /// Next text message, `Ok(None)` if none arrived within `timeout`.
    fn recv(&mut self, timeout: Duration) -> Result<Option<String>, FeedError>;
}

/// Tuning for the updater loop.
#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    pub backoff: Backoff,
    /// How long a single `recv` may block before the stop flag is rechecked.
    pub poll: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            poll: Duration::from_millis(250),
        }
    }
}

/// Running updater thread. Dropping the handle without [`FeedHandle::stop`]
/// leaves the thread running until the process exits.
#[derive(Debug)]
pub struct FeedHandle {
    board: PriceBoard,
    requests: Sender<Subscription>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Start the updater on a named thread.
    pub fn spawn<T>(
        transport: T,
        subscriptions: Vec<Subscription>,
        board: PriceBoard,
        config: FeedConfig,
    ) -> std::io::Result<Self>
    where
        T: FeedTransport + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (requests, pending) = mpsc::channel();
        let updater = Updater {
            transport,
            subscriptions,
            pending,
            board: board.clone(),
            stop: Arc::clone(&stop),
            config,
            next_id: 1,
        };
        let thread = std::thread::Builder::new()
            .name("marginlab-feed".into())
            .spawn(move || updater.run())?;
        Ok(Self {
            board,
            requests,
            stop,
            thread: Some(thread),
        })
    }

    pub fn board(&self) -> &PriceBoard {
        &self.board
    }

    /// Register a kline stream with the running updater.
    ///
    /// It is sent immediately if connected, otherwise on the next connect, and
    /// replayed after every reconnect. Registering a stream twice is a no-op.
    pub fn subscribe(
        &self,
        symbol: impl Into<String>,
        interval: impl Into<String>,
    ) -> Result<(), FeedError> {
        self.requests
            .send(Subscription::new(symbol, interval))
            .map_err(|_| FeedError::Closed("feed updater has exited".into()))
    }

    /// Signal the updater and wait for it to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("feed updater thread panicked");
            }
        }
    }
}

struct Updater<T> {
    transport: T,
    subscriptions: Vec<Subscription>,
    pending: Receiver<Subscription>,
    board: PriceBoard,
    stop: Arc<AtomicBool>,
    config: FeedConfig,
    next_id: u64,
}

impl<T: FeedTransport> Updater<T> {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(mut self) {
        let mut backoff = self.config.backoff;
        while !self.stopped() {
            match self.session(&mut backoff) {
                Ok(()) => break,
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "feed disconnected; reconnecting"
                    );
                    self.sleep(delay);
                }
            }
        }
        tracing::debug!("feed updater stopped");
    }

    /// One connection lifetime. `Ok` only when asked to stop.
    fn session(&mut self, backoff: &mut Backoff) -> Result<(), FeedError> {
        self.transport.connect()?;
        backoff.reset();
        // Requests queued while disconnected join the replay.
        self.take_pending();
        tracing::info!(streams = self.subscriptions.len(), "feed connected");

        for index in 0..self.subscriptions.len() {
            self.send_subscription(index)?;
        }

        while !self.stopped() {
            let start = self.subscriptions.len();
            self.take_pending();
            for index in start..self.subscriptions.len() {
                tracing::info!(
                    stream = %self.subscriptions[index].stream_name(),
                    "subscribing"
                );
                self.send_subscription(index)?;
            }
            if let Some(text) = self.transport.recv(self.config.poll)? {
                if let Some(snapshot) = parse_kline_message(&text) {
                    self.board.publish(snapshot);
                }
            }
        }
        Ok(())
    }

    /// Move queued requests into the registry, skipping streams already in it.
    fn take_pending(&mut self) {
        while let Ok(sub) = self.pending.try_recv() {
            if !self.subscriptions.contains(&sub) {
                self.subscriptions.push(sub);
            }
        }
    }

    fn send_subscription(&mut self, index: usize) -> Result<(), FeedError> {
        let payload = self.subscriptions[index].payload(self.next_id);
        self.next_id += 1;
        self.transport.send(&payload.to_string())
    }

    /// Sleep in short slices so `stop()` is not held up by a long backoff.
    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        let slice = self.config.poll.max(Duration::from_millis(1));
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(slice.min(deadline - now));
        }
    }
}
