//! HTTP/WebSocket server
//!
//! Serves the embedded joystick UI and bridges two kinds of WebSocket peers:
//!
//! - `/ws/input`: browser surfaces. Each connection gets its own
//!   [`InputSession`] and therefore its own tracker.
//! - `/ws/device`: devices/backends. They receive every control and settings
//!   frame; their responses are relayed to all browser surfaces.
//!
//! ## Key Features
//!
//! - Hot-reloadable joystick settings pushed into live sessions
//! - `/keepalive` probe for devices that poll over plain HTTP
//! - `/api/health` and `/api/config` for diagnostics

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parking_lot::RwLock;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::control::BroadcastChannel;
use crate::joystick::DualTouchTracker;
use crate::protocol::{keep_alive_frame, DeviceMessage};
use crate::session::InputSession;

/// Frames buffered for browser surfaces (device responses)
const UI_BUFFER: usize = 64;

#[derive(RustEmbed)]
#[folder = "static/"]
struct Assets;

/// Shared state for all handlers
pub struct AppState {
    config: RwLock<AppConfig>,
    device: BroadcastChannel,
    ui_tx: broadcast::Sender<Arc<str>>,
    sessions: RwLock<HashMap<u64, DualTouchTracker>>,
    next_id: AtomicU64,
    started_at: chrono::DateTime<chrono::Local>,
}

/// GET /api/health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
    pub devices: usize,
    pub uptime_secs: i64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let (device_tx, _) = broadcast::channel(config.server.device_buffer);
        let (ui_tx, _) = broadcast::channel(UI_BUFFER);
        let device = BroadcastChannel::new(device_tx, config.control.labels);

        Arc::new(Self {
            config: RwLock::new(config),
            device,
            ui_tx,
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            started_at: chrono::Local::now(),
        })
    }

    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    pub fn device(&self) -> &BroadcastChannel {
        &self.device
    }

    /// Apply a reloaded configuration
    ///
    /// Joystick settings go to every live tracker, the label scheme switches
    /// at once. Server settings need a restart and are kept as they are.
    pub fn apply_config(&self, mut new_config: AppConfig) {
        let mut config = self.config.write();

        if new_config.server != config.server {
            warn!("Server settings changed; restart to apply them");
            new_config.server = config.server.clone();
        }

        self.device.set_labels(new_config.control.labels);
        for tracker in self.sessions.read().values() {
            tracker.update_config(new_config.joystick.clone());
        }

        *config = new_config;
        info!("Applied new configuration to {} session(s)", self.session_count());
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn device_count(&self) -> usize {
        self.device.receiver_count()
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            sessions: self.session_count(),
            devices: self.device_count(),
            uptime_secs: (chrono::Local::now() - self.started_at).num_seconds(),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn open_session(&self) -> InputSession {
        let session = InputSession::new(self.next_id(), &self.config.read(), self.device.clone());
        self.sessions
            .write()
            .insert(session.id(), session.tracker().clone());
        session
    }

    fn close_session(&self, session: &InputSession) {
        self.sessions.write().remove(&session.id());
        session.close();
    }

    /// Handle one text frame from a device; returns the reply, if any
    fn handle_device_text(&self, device_id: u64, text: &str) -> Option<String> {
        match DeviceMessage::parse(text) {
            Ok(DeviceMessage::KeepAlive) => {
                debug!("Device {}: keep-alive", device_id);
                Some(keep_alive_frame())
            }
            Ok(DeviceMessage::Response(envelope)) => {
                debug!("Device {}: {:?} response", device_id, envelope.action);
                // No receivers just means no surface is open
                let _ = self.ui_tx.send(Arc::from(text));
                None
            }
            Err(e) => {
                warn!("Device {}: ignoring frame: {}", device_id, e);
                None
            }
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/settings", get(settings))
        .route("/static/*path", get(static_asset))
        .route("/ws/input", get(input_ws))
        .route("/ws/device", get(device_ws))
        .route("/keepalive", get(keep_alive))
        .route("/api/health", get(health_check))
        .route("/api/config", get(get_config))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves
pub async fn serve(
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = {
        let config = state.config.read();
        format!("{}:{}", config.server.host, config.server.port)
    };

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind server to {}", addr))?;
    info!("🕹️  Joystick UI on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

fn asset_response(path: &str) -> Response {
    match Assets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.to_string())],
                file.data.into_owned(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

/// GET / - Joystick surface
async fn index() -> Response {
    match Assets::get("index.html") {
        Some(file) => Html(file.data.into_owned()).into_response(),
        None => (StatusCode::NOT_FOUND, "index.html missing").into_response(),
    }
}

/// GET /settings - Tuning and calibration page
async fn settings() -> Response {
    asset_response("settings.html")
}

/// GET /static/*path - Embedded assets
async fn static_asset(Path(path): Path<String>) -> Response {
    asset_response(&path)
}

/// GET /keepalive - Liveness probe for polling devices
async fn keep_alive() -> impl IntoResponse {
    debug!("Keep-alive probe");
    ([(header::CONTENT_TYPE, "application/json")], keep_alive_frame())
}

/// GET /api/health
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.health())
}

/// GET /api/config - Active configuration
async fn get_config(State(state): State<Arc<AppState>>) -> Json<AppConfig> {
    Json(state.config())
}

/// GET /ws/input - Browser surface
async fn input_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_input_socket(socket, state))
}

/// GET /ws/device - Device/backend link
async fn device_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_device_socket(socket, state))
}

async fn handle_input_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let session = state.open_session();
    let mut ui_rx = state.ui_tx.subscribe();
    debug!("Surface {} connected", session.id());

    loop {
        tokio::select! {
            // Device responses → surface
            result = ui_rx.recv() => {
                match result {
                    Ok(frame) => {
                        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Surface {} lagged by {} responses", session.id(), n);
                    }
                }
            }
            // Surface input → tracker
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = session.handle_text(text.as_str()) {
                            warn!("Surface {}: {}", session.id(), e);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Surface {} WebSocket error: {}", session.id(), e);
                        break;
                    }
                }
            }
        }
    }

    state.close_session(&session);
    debug!("Surface {} disconnected", session.id());
}

async fn handle_device_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let device_id = state.next_id();
    let mut frames = BroadcastStream::new(state.device.subscribe());
    info!("Device {} connected", device_id);

    loop {
        tokio::select! {
            // Control/settings frames → device
            frame = frames.next() => {
                match frame {
                    Some(Ok(frame)) => {
                        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(n))) => {
                        warn!("Device {} lagged, {} frames dropped", device_id, n);
                    }
                    None => break,
                }
            }
            // Device responses → surfaces
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = state.handle_device_text(device_id, text.as_str()) {
                            if socket.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Device {} WebSocket error: {}", device_id, e);
                        break;
                    }
                }
            }
        }
    }

    info!("Device {} disconnected", device_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::AxisLabels;
    use crate::joystick::PointSample;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let response = build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_counts_sessions_and_devices() {
        let state = AppState::new(AppConfig::default());
        let _device = state.device().subscribe();
        let session = state.open_session();

        let (status, body) = get_json(state.clone(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["sessions"], json!(1));
        assert_eq!(body["devices"], json!(1));

        state.close_session(&session);
        assert_eq!(state.session_count(), 0);
    }

    #[tokio::test]
    async fn test_config_and_keepalive_endpoints() {
        let state = AppState::new(AppConfig::default());

        let (status, body) = get_json(state.clone(), "/api/config").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["joystick"]["max_range"], json!(100.0));
        assert_eq!(body["control"]["labels"], json!("sticks"));

        let (_, body) = get_json(state, "/keepalive").await;
        assert_eq!(body, json!({ "event": "keep_alive" }));
    }

    #[tokio::test]
    async fn test_embedded_pages_are_served() {
        let state = AppState::new(AppConfig::default());

        for uri in ["/", "/settings", "/static/joystick.js"] {
            let response = build_router(state.clone())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }

        let response = build_router(state)
            .oneshot(Request::builder().uri("/static/nope.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_device_responses_reach_surfaces() {
        let state = AppState::new(AppConfig::default());
        let mut ui_rx = state.ui_tx.subscribe();

        let text = r#"{"event":"response","type":"tilt","data":{"pitch":1.5}}"#;
        assert_eq!(state.handle_device_text(7, text), None);
        assert_eq!(&*ui_rx.try_recv().unwrap(), text);

        assert_eq!(
            state.handle_device_text(7, r#"{"event":"keep_alive"}"#),
            Some(keep_alive_frame())
        );

        // Control frames from a device are not relayed
        assert_eq!(state.handle_device_text(7, r#"{"event":"control","type":"sticks"}"#), None);
        assert!(ui_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_apply_config_reaches_live_sessions() {
        let state = AppState::new(AppConfig::default());
        let mut device_rx = state.device().subscribe();
        let session = state.open_session();

        let mut new_config = AppConfig::default();
        new_config.server.port = 9999;
        new_config.joystick.max_range = 20.0;
        new_config.control.labels = AxisLabels::Legacy;
        state.apply_config(new_config);

        // Server section needs a restart
        assert_eq!(state.config().server.port, 8080);
        assert_eq!(state.config().joystick.max_range, 20.0);

        let tracker = session.tracker();
        tracker.touch_start(&[PointSample::new(200.0, 300.0)]);
        tracker.touch_move(&[PointSample::new(200.0, 250.0)]);
        // 50px is beyond the new range
        assert_eq!(tracker.control_vector().throttle, 0.0);

        let frame = device_rx.try_recv().unwrap();
        let frame: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(frame["event"], json!("power"));

        state.close_session(&session);
    }
}
