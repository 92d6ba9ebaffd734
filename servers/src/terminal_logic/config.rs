use crate::terminal_logic::logger::LogSettings;
use clap::Parser;
use lib_common::ingestors::SyncEndpoints;
use lib_common::markets::{alternative, binance, bybit, coingecko};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LOG_KEEP: usize = 5;
const DEFAULT_CONFIG_FILE: &str = "server_terminal.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Crypto market terminal: rate-limited CoinGecko proxy and live market-data synchronizers", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "TERMINAL_PORT", help = "Port to listen on for HTTP and WebSocket clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "TERMINAL_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "TERMINAL_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "TERMINAL_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "TERMINAL_LOG_KEEP", help = "Log files kept in the log directory, the current one included.")]
    pub log_keep: Option<usize>,

    #[clap(long, env = "TERMINAL_REDIS_URL", help = "Redis URL for the shared request quota. Unset means no quota is enforced.")]
    pub redis_url: Option<String>,

    #[clap(long, env = "TERMINAL_QUOTA_LIMIT", help = "Requests allowed per identity and window on each proxy route.")]
    pub quota_limit: Option<u32>,

    #[clap(long, env = "TERMINAL_QUOTA_WINDOW_SECONDS", help = "Length of the sliding quota window in seconds.")]
    pub quota_window_seconds: Option<u64>,

    #[clap(long, env = "TERMINAL_COINGECKO_BASE_URL", help = "CoinGecko API root used by the proxy.")]
    pub coingecko_base_url: Option<String>,

    #[clap(long, env = "TERMINAL_BINANCE_WS_URL", help = "Binance ticker stream URL.")]
    pub binance_ws_url: Option<String>,

    #[clap(long, env = "TERMINAL_BINANCE_REST_BASE_URL", help = "Binance spot REST root, polled when the stream is abandoned.")]
    pub binance_rest_base_url: Option<String>,

    #[clap(long, env = "TERMINAL_BINANCE_FUTURES_BASE_URL", help = "Binance futures REST root for funding rates.")]
    pub binance_futures_base_url: Option<String>,

    #[clap(long, env = "TERMINAL_ALTERNATIVE_BASE_URL", help = "alternative.me API root for the Fear & Greed index.")]
    pub alternative_base_url: Option<String>,

    #[clap(long, env = "TERMINAL_BYBIT_BASE_URL", help = "Bybit API root for the long/short ratio.")]
    pub bybit_base_url: Option<String>,

    #[clap(long, env = "TERMINAL_PROXY_BASE_URL", help = "Where the pollers reach the CoinGecko proxy. Defaults to this server.")]
    pub proxy_base_url: Option<String>,

    #[clap(long, env = "TERMINAL_FUNDING_SYMBOLS", value_delimiter = ',', help = "Comma separated perpetuals whose funding rates are tracked.")]
    pub funding_symbols: Option<Vec<String>>,

    #[clap(long, env = "TERMINAL_HTTP_RETRIES", help = "Retries of transient upstream failures per request.")]
    pub http_retries: Option<u32>,

    #[clap(long, env = "TERMINAL_DISABLE_SYNC", help = "Run the proxy only, without the synchronizers (true/false).")]
    pub disable_sync: Option<bool>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            log_keep: other.log_keep.or(self.log_keep),
            redis_url: other.redis_url.or(self.redis_url),
            quota_limit: other.quota_limit.or(self.quota_limit),
            quota_window_seconds: other.quota_window_seconds.or(self.quota_window_seconds),
            coingecko_base_url: other.coingecko_base_url.or(self.coingecko_base_url),
            binance_ws_url: other.binance_ws_url.or(self.binance_ws_url),
            binance_rest_base_url: other.binance_rest_base_url.or(self.binance_rest_base_url),
            binance_futures_base_url: other.binance_futures_base_url.or(self.binance_futures_base_url),
            alternative_base_url: other.alternative_base_url.or(self.alternative_base_url),
            bybit_base_url: other.bybit_base_url.or(self.bybit_base_url),
            proxy_base_url: other.proxy_base_url.or(self.proxy_base_url),
            funding_symbols: other.funding_symbols.or(self.funding_symbols),
            http_retries: other.http_retries.or(self.http_retries),
            disable_sync: other.disable_sync.or(self.disable_sync),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(DEFAULT_PORT),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            log_keep: Some(DEFAULT_LOG_KEEP),
            quota_limit: Some(10),
            quota_window_seconds: Some(10),
            coingecko_base_url: Some(coingecko::DEFAULT_BASE_URL.to_string()),
            binance_ws_url: Some(binance::DEFAULT_WS_URL.to_string()),
            binance_rest_base_url: Some(binance::DEFAULT_REST_BASE_URL.to_string()),
            binance_futures_base_url: Some(binance::DEFAULT_FUTURES_BASE_URL.to_string()),
            alternative_base_url: Some(alternative::DEFAULT_BASE_URL.to_string()),
            bybit_base_url: Some(bybit::DEFAULT_BASE_URL.to_string()),
            funding_symbols: Some(binance::DEFAULT_FUNDING_SYMBOLS.iter().map(|s| s.to_string()).collect()),
            http_retries: Some(0),
            disable_sync: Some(false),
            ..Default::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            dir: self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs")),
            level: self.log_level.clone().unwrap_or_else(|| "info".to_string()),
            keep: self.log_keep.unwrap_or(DEFAULT_LOG_KEEP),
        }
    }

    pub fn quota_limit(&self) -> u32 {
        self.quota_limit.unwrap_or(10)
    }

    pub fn quota_window_seconds(&self) -> u64 {
        self.quota_window_seconds.unwrap_or(10)
    }

    pub fn coingecko_base_url(&self) -> String {
        self.coingecko_base_url
            .clone()
            .unwrap_or_else(|| coingecko::DEFAULT_BASE_URL.to_string())
    }

    pub fn http_retries(&self) -> u32 {
        self.http_retries.unwrap_or(0)
    }

    pub fn disable_sync(&self) -> bool {
        self.disable_sync.unwrap_or(false)
    }

    /// The proxy routes on this very server unless pointed elsewhere.
    pub fn proxy_base_url(&self) -> String {
        self.proxy_base_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}/api/coingecko/", self.port()))
    }

    /// Upstream locations for the synchronizers.
    pub fn sync_endpoints(&self) -> SyncEndpoints {
        let defaults = SyncEndpoints::default();
        SyncEndpoints {
            binance_ws_url: self.binance_ws_url.clone().unwrap_or(defaults.binance_ws_url),
            binance_rest_base_url: self.binance_rest_base_url.clone().unwrap_or(defaults.binance_rest_base_url),
            binance_futures_base_url: self
                .binance_futures_base_url
                .clone()
                .unwrap_or(defaults.binance_futures_base_url),
            alternative_base_url: self.alternative_base_url.clone().unwrap_or(defaults.alternative_base_url),
            bybit_base_url: self.bybit_base_url.clone().unwrap_or(defaults.bybit_base_url),
            proxy_base_url: self.proxy_base_url(),
            ticker_symbol: defaults.ticker_symbol,
            funding_symbols: self.funding_symbols.clone().unwrap_or(defaults.funding_symbols),
            http_retries: self.http_retries(),
        }
    }
}

/// Reads a JSON config file, `None` (with a log line) when missing or unreadable.
fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Defaults, then the config file, then CLI arguments and environment.
fn resolve(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current = current.merge(file_config);
    }
    current.merge(cli)
}

pub fn load_config() -> Config {
    // clap::Parser handles both env vars and CLI args.
    resolve(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_nothing_given() {
        let cfg = resolve(Config {
            config_path: Some(PathBuf::from("/nonexistent/server_terminal.conf")),
            ..Default::default()
        });
        assert_eq!(cfg.port(), 3000);
        assert_eq!(cfg.quota_limit(), 10);
        assert_eq!(cfg.quota_window_seconds(), 10);
        assert!(cfg.redis_url.is_none());
        assert_eq!(cfg.proxy_base_url(), "http://127.0.0.1:3000/api/coingecko/");
        assert_eq!(cfg.sync_endpoints().funding_symbols.len(), 4);
    }

    #[test]
    fn test_file_then_cli_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 8080, "logLevel": "debug", "fundingSymbols": ["BTCUSDT"]}}"#).unwrap();

        let cfg = resolve(Config {
            config_path: Some(file.path().to_path_buf()),
            port: Some(9090),
            ..Default::default()
        });
        assert_eq!(cfg.port(), 9090);
        assert_eq!(cfg.log_settings().level, "debug");
        assert_eq!(cfg.log_settings().keep, 5);
        assert_eq!(cfg.sync_endpoints().funding_symbols, vec!["BTCUSDT".to_string()]);
        assert_eq!(cfg.proxy_base_url(), "http://127.0.0.1:9090/api/coingecko/");
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let cfg = resolve(Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        });
        assert_eq!(cfg.port(), 3000);
    }

    #[test]
    fn test_cli_parses_symbol_list() {
        let cli = Config::parse_from(["server_terminal", "--funding-symbols", "BTCUSDT,ETHUSDT", "--disable-sync", "true"]);
        assert_eq!(cli.funding_symbols, Some(vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]));
        assert_eq!(cli.disable_sync, Some(true));
    }
}
