//! # Ticker Stream Ingestor
//!
//! Keeps `MarketStore::ticker` fresh from the Binance `btcusdt@ticker` stream.
//!
//! ## Lifecycle
//! - Each frame is validated and turned into a `TickerSnapshot`, carrying the
//!   previous price forward.
//! - A connection error counts as a failure. Below the threshold the ingestor
//!   waits a fixed delay and reconnects; at the threshold it switches to REST
//!   polling of `ticker/24hr` and never streams again for this run.
//! - A clean close from the server reconnects after the same fixed delay.
//! - A successful open resets the failure count.
//! - On cancellation a pending reconnect is abandoned and an open connection is
//!   closed. A connection that is already closed is left alone.
//!
//! The transport sits behind `FeedConnector` / `TickerFeed` and the REST
//! fallback behind `TickerQuotes`, so the state machine can be driven by
//! scripted feeds in tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::core::snapshots::TickerSnapshot;
use crate::core::store::MarketStore;
use crate::core::upstream_manager::{FeedDecision, FeedMode, UpstreamManager};
use crate::ingestors::polling::{run_polling, PollingSource};
use crate::ingestors::{SyncError, SyncSettings};
use crate::markets::{BinanceSpot, UpstreamError};
use crate::validation::{validate, TickerRestQuote, TickerStreamFrame};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("stream error: {0}")]
    Stream(String),
}

/// An open ticker connection.
pub trait TickerFeed: Send + 'static {
    /// Next text frame. `None` means the server closed the connection cleanly.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<String, FeedError>>> + Send;

    /// Closes the connection if it is still open or opening.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens ticker connections.
pub trait FeedConnector: Send + Sync + 'static {
    type Feed: TickerFeed;

    fn connect(&self) -> impl Future<Output = Result<Self::Feed, FeedError>> + Send;
}

/// The REST ticker used once streaming is abandoned.
pub trait TickerQuotes: Send + Sync + 'static {
    fn quote(&self, symbol: &str) -> impl Future<Output = Result<TickerRestQuote, UpstreamError>> + Send;
}

impl TickerQuotes for BinanceSpot {
    async fn quote(&self, symbol: &str) -> Result<TickerRestQuote, UpstreamError> {
        self.ticker_24h(symbol).await
    }
}

/// WebSocket transport over `tokio-tungstenite`.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl FeedConnector for WsConnector {
    type Feed = WsFeed;

    async fn connect(&self) -> Result<WsFeed, FeedError> {
        log::info!("Connecting to ticker stream: {}", self.url);
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;
        Ok(WsFeed { stream, closed: false })
    }
}

pub struct WsFeed {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl TickerFeed for WsFeed {
    async fn next_frame(&mut self) -> Option<Result<String, FeedError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                Some(Ok(Message::Close(frame))) => {
                    log::info!("Ticker stream closed by remote: {:?}", frame);
                    self.closed = true;
                    return None;
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.closed = true;
                    return Some(Err(FeedError::Stream(e.to_string())));
                }
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            log::debug!("Ticker stream close: {}", e);
        }
    }
}

/// Timing of the ticker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerSettings {
    pub reconnect_delay: Duration,
    pub max_failures: u32,
    pub poll_interval: Duration,
}

impl From<&SyncSettings> for TickerSettings {
    fn from(s: &SyncSettings) -> Self {
        Self {
            reconnect_delay: s.reconnect_delay,
            max_failures: s.max_stream_failures,
            poll_interval: s.ticker_poll_interval,
        }
    }
}

/// The streaming ticker synchronizer.
pub struct TickerSync<C: FeedConnector, Q: TickerQuotes = BinanceSpot> {
    connector: C,
    rest: Q,
    symbol: String,
    settings: TickerSettings,
    manager: UpstreamManager,
}

impl<C: FeedConnector, Q: TickerQuotes> TickerSync<C, Q> {
    pub fn new(connector: C, rest: Q, symbol: impl Into<String>, settings: TickerSettings) -> Self {
        Self {
            connector,
            rest,
            symbol: symbol.into(),
            settings,
            manager: UpstreamManager::new(settings.max_failures),
        }
    }

    /// Follows `Connecting` / `Streaming` / `Degrading` / `Polling`.
    pub fn mode(&self) -> watch::Receiver<FeedMode> {
        self.manager.watch_mode()
    }

    /// Streams until the failure threshold is hit, then polls until cancelled.
    pub async fn run(mut self, store: Arc<MarketStore>, cancel: CancellationToken) {
        if !self.stream(&store, &cancel).await {
            return;
        }

        log::warn!(
            "Ticker stream failed {} times, polling REST every {:?} from now on",
            self.settings.max_failures,
            self.settings.poll_interval
        );
        let source = RestTicker {
            client: self.rest,
            symbol: self.symbol,
        };
        run_polling(source, store, self.settings.poll_interval, cancel).await;
    }

    /// Returns `true` when streaming was given up, `false` when cancelled.
    async fn stream(&mut self, store: &MarketStore, cancel: &CancellationToken) -> bool {
        while self.manager.begin_connect() {
            let connected = tokio::select! {
                _ = cancel.cancelled() => return false,
                res = self.connector.connect() => res,
            };

            let decision = match connected {
                Err(e) => {
                    log::warn!("Ticker stream error: {}", e);
                    self.manager.on_error()
                }
                Ok(mut feed) => {
                    self.manager.on_open();
                    log::info!("Ticker stream open");
                    let decision = loop {
                        let frame = tokio::select! {
                            _ = cancel.cancelled() => None,
                            frame = feed.next_frame() => Some(frame),
                        };
                        let Some(frame) = frame else {
                            feed.close().await;
                            return false;
                        };
                        match frame {
                            Some(Ok(text)) => apply_frame(store, &text),
                            Some(Err(e)) => {
                                log::warn!("Ticker stream error: {}", e);
                                break self.manager.on_error();
                            }
                            None => break self.manager.on_close(),
                        }
                    };
                    feed.close().await;
                    decision
                }
            };

            match decision {
                FeedDecision::FallBackToPolling => return true,
                FeedDecision::Reconnect => {
                    log::info!("Reconnecting ticker stream in {:?}", self.settings.reconnect_delay);
                    tokio::select! {
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
                    }
                }
            }
        }
        true
    }
}

fn apply_frame(store: &MarketStore, text: &str) {
    let raw: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Ticker frame is not JSON: {}", e);
            return;
        }
    };
    match validate::<TickerStreamFrame>(&raw) {
        Ok(frame) => update_ticker(store, &frame.last_price, &frame.price_change, &frame.price_change_percent),
        Err(e) => log::warn!("Ticker frame failed schema {}: {}", e.schema, e.description),
    }
}

fn update_ticker(store: &MarketStore, last: &str, change: &str, percent: &str) {
    store.update_ticker(|prev| {
        let next = TickerSnapshot::next(prev, last, change, percent);
        if next.is_none() {
            log::warn!("Ticker values not numeric: c='{}' p='{}' P='{}'", last, change, percent);
        }
        next
    });
}

/// REST equivalent of the stream, polled once streaming is abandoned.
struct RestTicker<Q> {
    client: Q,
    symbol: String,
}

impl<Q: TickerQuotes> PollingSource for RestTicker<Q> {
    type Output = TickerRestQuote;
    const NAME: &'static str = "ticker-rest";

    async fn fetch(&self) -> Result<TickerRestQuote, SyncError> {
        Ok(self.client.quote(&self.symbol).await?)
    }

    fn apply(&self, store: &MarketStore, quote: TickerRestQuote) {
        update_ticker(store, &quote.last_price, &quote.price_change, &quote.price_change_percent);
    }
}
