//! # CoinGecko Proxy Routes
//!
//! `GET /api/coingecko/global` and `GET /api/coingecko/markets`.
//!
//! ## Behaviour
//! - Each route has its own quota bucket per client identity
//!   (`coingecko-global:<id>`, `coingecko-markets:<id>`). The identity is the
//!   `x-forwarded-for` header, else `x-real-ip`, else `anonymous`.
//! - Over quota: 429 with `{"error": "Too many requests"}` and the
//!   `X-RateLimit-*` headers.
//! - Live data (fresh or from the TTL cache): 200 with the headers.
//! - CoinGecko unavailable, non-JSON or off-schema: 200 with the frozen
//!   fallback payload and no rate-limit headers. Callers cannot tell it apart
//!   from live data.

use crate::terminal_logic::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use lib_common::core::{RateLimitDecision, RateLimiter};
use lib_common::markets::{coingecko, UpstreamError};
use serde::Serialize;
use serde_json::json;
use std::future::Future;

const ANONYMOUS: &str = "anonymous";

static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/coingecko/global", get(global_handler))
        .route("/api/coingecko/markets", get(markets_handler))
}

/// Forwarded address, then real IP, then the shared anonymous bucket.
pub fn client_identity(headers: &HeaderMap) -> String {
    ["x-forwarded-for", "x-real-ip"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

fn rate_limit_headers(decision: &RateLimitDecision) -> [(HeaderName, HeaderValue); 3] {
    [
        (X_RATELIMIT_LIMIT.clone(), HeaderValue::from(decision.limit)),
        (X_RATELIMIT_REMAINING.clone(), HeaderValue::from(decision.remaining)),
        (X_RATELIMIT_RESET.clone(), HeaderValue::from(decision.reset_at_ms)),
    ]
}

async fn relay<T, F, Fut>(
    limiter: &RateLimiter,
    route: &'static str,
    headers: &HeaderMap,
    fetch: F,
    fallback: fn() -> T,
) -> Response
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let identity = client_identity(headers);
    let decision = limiter.check(&format!("{}:{}", route, identity)).await;

    if !decision.allowed {
        log::info!("{}: quota exceeded for {}", route, identity);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            rate_limit_headers(&decision),
            Json(json!({ "error": "Too many requests" })),
        )
            .into_response();
    }

    match fetch().await {
        Ok(body) => (rate_limit_headers(&decision), Json(body)).into_response(),
        Err(UpstreamError::Invalid(e)) => {
            log::error!("{}: CoinGecko payload failed schema {}, using fallback data: {}", route, e.schema, e.description);
            Json(fallback()).into_response()
        }
        Err(e) => {
            log::warn!("{}: CoinGecko unavailable ({}), using fallback data", route, e);
            Json(fallback()).into_response()
        }
    }
}

async fn global_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let proxy = &state.proxy;
    relay(&proxy.limiter, "coingecko-global", &headers, || proxy.global(), coingecko::fallback_global).await
}

async fn markets_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let proxy = &state.proxy;
    relay(&proxy.limiter, "coingecko-markets", &headers, || proxy.markets(), coingecko::fallback_markets).await
}
