//! # Upstream Manager
//!
//! Tracks the operating mode of the streaming ticker and decides what to do
//! after each connection event. The manager holds no I/O; the ticker ingestor
//! drives it and acts on the returned `FeedDecision`.
//!
//! ```text
//! Connecting --open--> Streaming --error/close--> Degrading --5s--> Connecting
//!                                      |
//!                         3 consecutive errors
//!                                      v
//!                                   Polling (terminal)
//! ```

use tokio::sync::watch;

/// Operating states of the streaming ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// A connection attempt is in flight.
    Connecting,
    /// The stream is open and delivering frames.
    Streaming,
    /// The last connection failed or closed; a reconnect is scheduled.
    Degrading,
    /// Streaming was abandoned; the REST endpoint is polled for the rest of the session.
    Polling,
}

/// What the ingestor should do after a connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDecision {
    /// Wait the fixed reconnect delay, then connect again.
    Reconnect,
    /// Stop streaming and switch to REST polling.
    FallBackToPolling,
}

pub struct UpstreamManager {
    mode: watch::Sender<FeedMode>,
    failures: u32,
    max_failures: u32,
}

impl UpstreamManager {
    /// `max_failures` consecutive errors move the feed to `Polling`.
    pub fn new(max_failures: u32) -> Self {
        Self {
            mode: watch::Sender::new(FeedMode::Connecting),
            failures: 0,
            max_failures: max_failures.max(1),
        }
    }

    pub fn mode(&self) -> FeedMode {
        *self.mode.borrow()
    }

    /// Lets observers (health endpoint, logs) follow mode changes.
    pub fn watch_mode(&self) -> watch::Receiver<FeedMode> {
        self.mode.subscribe()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn transition(&self, next: FeedMode) {
        self.mode.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            log::info!("Ticker feed mode: {:?} -> {:?}", *current, next);
            *current = next;
            true
        });
    }

    /// Marks a connection attempt. Returns `false` once the feed is polling,
    /// in which case no attempt may be made.
    pub fn begin_connect(&mut self) -> bool {
        if self.mode() == FeedMode::Polling {
            return false;
        }
        self.transition(FeedMode::Connecting);
        true
    }

    /// A connection opened. Resets the consecutive failure count.
    pub fn on_open(&mut self) {
        self.failures = 0;
        self.transition(FeedMode::Streaming);
    }

    /// A connection attempt failed or an open stream errored.
    pub fn on_error(&mut self) -> FeedDecision {
        self.failures += 1;
        if self.failures >= self.max_failures {
            self.transition(FeedMode::Polling);
            FeedDecision::FallBackToPolling
        } else {
            self.transition(FeedMode::Degrading);
            FeedDecision::Reconnect
        }
    }

    /// The server closed the stream without an error.
    pub fn on_close(&mut self) -> FeedDecision {
        if self.mode() == FeedMode::Polling || self.failures >= self.max_failures {
            self.transition(FeedMode::Polling);
            return FeedDecision::FallBackToPolling;
        }
        self.transition(FeedMode::Degrading);
        FeedDecision::Reconnect
    }
}
