//! # Live Feed Smoke Run
//!
//! Runs one cycle of every synchronizer against the real upstreams and prints
//! the resulting store snapshot. Nothing is mocked, so failures here usually
//! mean an upstream changed its payload or is blocking this network.
//!
//! Dominance and the market listing go through the terminal proxy when
//! `--proxy-base-url` is given, otherwise straight to CoinGecko.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::sync::Arc;

use clap::Parser;
use lib_common::core::{DominanceSnapshot, MarketCoin, MarketStore, TickerSnapshot};
use lib_common::ingestors::{DominanceSync, FundingSync, MarketListingSync, PollingSource, RatioSync, SentimentSync};
use lib_common::markets::{self, AlternativeMe, BinanceFutures, BinanceSpot, Bybit, CoinGecko, TerminalProxy};

#[derive(Parser, Debug)]
#[command(about = "One live cycle of every market data synchronizer")]
struct Args {
    /// Base URL of a running terminal proxy, e.g. http://127.0.0.1:3000/api/coingecko/
    #[arg(long)]
    proxy_base_url: Option<String>,

    /// Retries per HTTP request
    #[arg(long, default_value_t = 1)]
    retries: u32,
}

fn init_logging() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("[{}] {}", record.level(), message)))
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

/// One fetch-apply cycle, reporting the outcome.
async fn cycle<S: PollingSource>(source: &S, store: &MarketStore) -> bool {
    match source.fetch().await {
        Ok(output) => {
            source.apply(store, output);
            println!("[OK]   {}", S::NAME);
            true
        }
        Err(e) => {
            println!("[FAIL] {}: {}", S::NAME, e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let args = Args::parse();
    let store = Arc::new(MarketStore::new());
    let mut failures = 0;

    println!("--- Starting live feed run ---");

    // --- Ticker (REST path, the stream is exercised by the server) ---
    let spot = BinanceSpot::new(markets::binance::DEFAULT_REST_BASE_URL, args.retries)?;
    match spot.ticker_24h(markets::binance::TICKER_SYMBOL).await {
        Ok(quote) => {
            store.update_ticker(|prev| {
                TickerSnapshot::next(prev, &quote.last_price, &quote.price_change, &quote.price_change_percent)
            });
            println!("[OK]   ticker");
        }
        Err(e) => {
            failures += 1;
            println!("[FAIL] ticker: {}", e);
        }
    }

    // --- REST pollers ---
    let sentiment = SentimentSync::new(AlternativeMe::new(markets::alternative::DEFAULT_BASE_URL, args.retries)?);
    let ratio = RatioSync::new(
        Bybit::new(markets::bybit::DEFAULT_BASE_URL, args.retries)?,
        markets::binance::TICKER_SYMBOL,
    );
    let funding = FundingSync::new(
        BinanceFutures::new(markets::binance::DEFAULT_FUTURES_BASE_URL, args.retries)?,
        markets::binance::DEFAULT_FUNDING_SYMBOLS.iter().map(|s| s.to_string()).collect(),
    );
    failures += [
        cycle(&sentiment, &store).await,
        cycle(&ratio, &store).await,
        cycle(&funding, &store).await,
    ]
    .iter()
    .filter(|ok| !**ok)
    .count();

    // --- CoinGecko-backed domains ---
    match &args.proxy_base_url {
        Some(base) => {
            failures += usize::from(!cycle(&DominanceSync::new(TerminalProxy::new(base, args.retries)?), &store).await);
            failures += usize::from(!cycle(&MarketListingSync::new(TerminalProxy::new(base, args.retries)?), &store).await);
        }
        None => {
            let coingecko = CoinGecko::new(markets::coingecko::DEFAULT_BASE_URL, args.retries)?;
            match coingecko.global().await {
                Ok(global) => {
                    let shares = global.data.market_cap_percentage;
                    store.set_dominance(DominanceSnapshot::from_shares(shares.btc, shares.eth));
                    println!("[OK]   dominance (direct)");
                }
                Err(e) => {
                    failures += 1;
                    println!("[FAIL] dominance (direct): {}", e);
                }
            }
            match coingecko.markets().await {
                Ok(rows) => {
                    store.set_markets(rows.into_iter().map(MarketCoin::from).collect());
                    println!("[OK]   markets (direct)");
                }
                Err(e) => {
                    failures += 1;
                    println!("[FAIL] markets (direct): {}", e);
                }
            }
        }
    }

    println!("--- Store snapshot ---");
    println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
    println!("--- Live feed run finished with {} failure(s) ---", failures);

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
