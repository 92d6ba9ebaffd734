use anyhow::Result;
use lib_common::connections::RedisQuotaStore;
use lib_common::core::{MarketStore, QuotaStore, RateLimiter};
use lib_common::ingestors::{SyncSet, SyncSettings};
use lib_common::markets::CoinGecko;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod terminal_logic;
use terminal_logic::{config, downstream, logger, state};

/// Quota store from config. Without a Redis URL, or if Redis cannot be
/// reached at startup, the limiter runs without a store and admits everything.
async fn build_limiter(config: &config::Config) -> RateLimiter {
    let limit = config.quota_limit();
    let window = Duration::from_secs(config.quota_window_seconds());

    let store: Option<Arc<dyn QuotaStore>> = match &config.redis_url {
        None => {
            log::warn!("No Redis URL configured, proxy quota is not enforced.");
            None
        }
        Some(url) => match RedisQuotaStore::connect(url).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                log::error!("Quota store unavailable ({}), proxy quota is not enforced.", e);
                None
            }
        },
    };

    let limiter = RateLimiter::new(store, limit, window);
    if limiter.is_enforcing() {
        log::info!("Proxy quota: {} requests per {:?} per client and route.", limiter.limit(), window);
    }
    limiter
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    logger::setup_logging(&config.log_settings())?;

    let shutdown = CancellationToken::new();
    let store = Arc::new(MarketStore::new());

    let limiter = build_limiter(&config).await;
    let coingecko = CoinGecko::new(&config.coingecko_base_url(), config.http_retries())?;
    let mut app_state = state::AppState::new(store.clone(), state::ProxyState::new(limiter, coingecko));

    // Bind first: the dominance and market pollers call this server's proxy routes.
    let listener = downstream::bind(config.port()).await?;

    let sync = if config.disable_sync() {
        log::info!("Synchronizers disabled, serving the proxy only.");
        None
    } else {
        let set = SyncSet::spawn(store, &config.sync_endpoints(), &SyncSettings::default(), &shutdown)?;
        app_state = app_state.with_sync_status(set.markets_error(), set.feed_mode());
        Some(set)
    };

    let downstream_handle = tokio::spawn(downstream::run(listener, app_state, shutdown.clone()));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    shutdown.cancel();

    if let Some(set) = sync {
        set.shutdown().await;
    }
    downstream_handle.await??;

    log::info!("Shutdown complete.");
    Ok(())
}
