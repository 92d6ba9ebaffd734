use crate::terminal_logic::headers::with_security_headers;
use crate::terminal_logic::model::{ClientMessage, ServerMessage};
use crate::terminal_logic::proxy;
use crate::terminal_logic::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use lib_common::core::{MarketStore, StoreField, StoreSnapshot};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotBody {
    #[serde(flatten)]
    store: StoreSnapshot,
    markets_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    feed_mode: Option<String>,
}

pub fn router(app_state: AppState) -> Router {
    let app = Router::new()
        .route("/api/snapshot", get(snapshot_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .merge(proxy::routes())
        .with_state(app_state);
    with_security_headers(app)
}

/// Binds before anything starts polling the proxy routes on this server.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Downstream server listening on {}", addr);
    Ok(listener)
}

pub async fn run(listener: TcpListener, app_state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    axum::serve(listener, router(app_state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            log::info!("Downstream server shutting down.");
        })
        .await
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

impl SnapshotBody {
    fn current(state: &AppState) -> Self {
        SnapshotBody {
            store: state.store.snapshot(),
            markets_error: *state.markets_error.borrow(),
            feed_mode: state.feed_mode.as_ref().map(|rx| format!("{:?}", *rx.borrow())),
        }
    }
}

async fn snapshot_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(SnapshotBody::current(&state))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Current value of one store field as JSON (`null` until first write).
fn field_value(store: &MarketStore, field: StoreField) -> Value {
    let value = match field {
        StoreField::Ticker => serde_json::to_value(store.ticker()),
        StoreField::Sentiment => serde_json::to_value(store.sentiment()),
        StoreField::Ratio => serde_json::to_value(store.ratio()),
        StoreField::FundingRates => serde_json::to_value(store.funding_rates()),
        StoreField::Markets => serde_json::to_value(store.markets()),
        StoreField::Dominance => serde_json::to_value(store.dominance()),
    };
    value.unwrap_or(Value::Null)
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json_str) => socket.send(Message::Text(json_str.into())).await.is_ok(),
        Err(e) => {
            log::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    log::info!("Client {} connected", client_id);

    // Subscribe before the snapshot so no change slips in between.
    let mut changes = state.store.subscribe(&[]);
    let mut markets_error = state.markets_error.clone();
    markets_error.mark_unchanged();
    // Without a running market poller the flag never moves.
    let mut markets_error_live = markets_error.has_changed().is_ok();
    let snapshot = serde_json::to_value(SnapshotBody::current(&state)).unwrap_or(Value::Null);

    if send(&mut socket, &ServerMessage::snapshot(snapshot)).await {
        loop {
            tokio::select! {
                // Handle incoming messages from the client
                msg = socket.recv() => {
                    let reply = match msg {
                        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let mut fields = changes.fields().to_vec();
                                if let Some(add) = client_msg.subscribe {
                                    // An explicit subscribe narrows the feed to what was asked for.
                                    if fields.len() == StoreField::ALL.len() {
                                        fields.clear();
                                    }
                                    fields.extend(add);
                                }
                                if let Some(remove) = client_msg.unsubscribe {
                                    fields.retain(|f| !remove.contains(f));
                                    if fields.is_empty() {
                                        fields = StoreField::ALL.to_vec();
                                    }
                                }
                                changes.set_fields(&fields);
                                ServerMessage::subscribed(changes.fields())
                            }
                            Err(e) => ServerMessage::error(format!("Invalid message: {}", e)),
                        },
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };
                    if !send(&mut socket, &reply).await {
                        break;
                    }
                }
                // Market listing banner raised or lowered
                res = markets_error.changed(), if markets_error_live => {
                    if res.is_err() {
                        markets_error_live = false;
                        continue;
                    }
                    let flag = *markets_error.borrow_and_update();
                    if !send(&mut socket, &ServerMessage::status(flag)).await {
                        break;
                    }
                }
                // Handle store changes
                field = changes.changed() => {
                    let Some(field) = field else { break };
                    let update = ServerMessage::update(field, field_value(&state.store, field));
                    if !send(&mut socket, &update).await {
                        break; // client disconnected
                    }
                }
            }
        }
    }

    log::info!("Client {} disconnected", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal_logic::state::ProxyState;
    use axum::body::Body;
    use axum::http::Request;
    use futures_util::{SinkExt, Stream, StreamExt};
    use lib_common::core::{DominanceSnapshot, RateLimiter, RatioSnapshot};
    use lib_common::markets::CoinGecko;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tower::ServiceExt;

    fn state() -> AppState {
        let proxy = ProxyState::new(
            RateLimiter::new(None, 10, Duration::from_secs(10)),
            CoinGecko::new("http://127.0.0.1:9/", 0).unwrap(),
        );
        AppState::new(Arc::new(MarketStore::new()), proxy)
    }

    #[tokio::test]
    async fn test_snapshot_before_first_write() {
        let resp = router(state())
            .oneshot(Request::builder().uri("/api/snapshot").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-frame-options"], "DENY");
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({
                "ticker": null, "sentiment": null, "ratio": null, "fundingRates": null,
                "markets": null, "dominance": null, "marketsError": false
            })
        );
    }

    #[tokio::test]
    async fn test_health() {
        let resp = router(state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for server message")
                .unwrap()
                .unwrap();
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_ws_snapshot_then_filtered_updates() {
        let app_state = state();
        let store = app_state.store.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(run(listener, app_state, shutdown.clone()));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr)).await.unwrap();

        let first = next_json(&mut ws).await;
        assert_eq!(first["type"], "snapshot");
        assert_eq!(first["message"]["ticker"], Value::Null);

        ws.send(WsMessage::Text(r#"{"subscribe": ["ratio"]}"#.into())).await.unwrap();
        let ack = next_json(&mut ws).await;
        assert_eq!(ack["type"], "subscribed");
        assert_eq!(ack["message"], json!(["ratio"]));

        store.set_dominance(DominanceSnapshot::from_shares(56.8, 12.4));
        store.set_ratio(RatioSnapshot::from_fractions("0.65", "0.35").unwrap());

        let update = next_json(&mut ws).await;
        assert_eq!(update["type"], "update");
        assert_eq!(update["field"], "ratio");
        assert_eq!(update["message"]["longPercent"], 65.0);

        ws.close(None).await.ok();
        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ws_carries_markets_error_flag() {
        let (flag_tx, flag_rx) = tokio::sync::watch::channel(true);
        let (_feed_tx, feed_rx) = tokio::sync::watch::channel(lib_common::core::FeedMode::Streaming);
        let app_state = state().with_sync_status(flag_rx, feed_rx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(run(listener, app_state, shutdown.clone()));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr)).await.unwrap();

        let first = next_json(&mut ws).await;
        assert_eq!(first["type"], "snapshot");
        assert_eq!(first["message"]["marketsError"], true);
        assert_eq!(first["message"]["feedMode"], "Streaming");

        flag_tx.send(false).unwrap();
        let status = next_json(&mut ws).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["message"], json!({"marketsError": false}));

        ws.close(None).await.ok();
        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
