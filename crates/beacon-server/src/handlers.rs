//! Connection handlers for the Beacon server.
//!
//! This module handles the client connection lifecycle: registering the
//! connection with the hub, decoding client events and writing everything
//! queued in the connection's outbox back to the socket.

use crate::client_ip;
use crate::config::Config;
use crate::control::control_app;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::qr::{PngQrEncoder, QrEncoder};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use beacon_core::{ConnectionId, Hub, HubConfig, HubHandle, Message};
use beacon_protocol::{codec, EncodedFrame, Frame, WireFormat, PROTOCOL_VERSION};
use bytes::BytesMut;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

type OutboxSender = mpsc::UnboundedSender<Arc<Message>>;

/// Shared server state.
pub struct AppState {
    /// Handle to the hub actor.
    pub hub: HubHandle,
    /// Server configuration.
    pub config: Config,
    /// QR renderer for `qr_code_generator`.
    pub encoder: Arc<dyn QrEncoder>,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(hub: HubHandle, config: Config, encoder: Arc<dyn QrEncoder>) -> Self {
        Self {
            hub,
            config,
            encoder,
        }
    }
}

/// Query parameters accepted on the WebSocket upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// `json` selects JSON text messages; anything else MessagePack.
    pub format: Option<String>,
}

impl ConnectParams {
    fn wire_format(&self) -> WireFormat {
        match self.format.as_deref() {
            Some(f) if f.eq_ignore_ascii_case("json") => WireFormat::Json,
            _ => WireFormat::MessagePack,
        }
    }
}

/// Build the client-facing router.
pub fn client_app(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();
    Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the client and control-plane servers.
///
/// # Errors
///
/// Returns an error if a listener cannot be bound or a server fails.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let control_addr = config.control_addr()?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind client listener on {}", addr))?;
    let control_listener = TcpListener::bind(control_addr)
        .await
        .with_context(|| format!("Failed to bind control listener on {}", control_addr))?;

    serve(config, listener, control_listener).await
}

/// Serve both surfaces on already-bound listeners.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a server fails.
pub async fn serve(
    config: Config,
    listener: TcpListener,
    control_listener: TcpListener,
) -> Result<()> {
    let encoder: Arc<dyn QrEncoder> = Arc::new(PngQrEncoder::new(config.qr.options()?));

    let hub = Hub::with_config(HubConfig {
        presence_template: config.presence.message_template.clone(),
    });
    let (hub, _hub_task) = beacon_core::spawn(hub, config.presence.tick_interval());

    let mut presence = hub.presence();
    tokio::spawn(async move {
        while presence.changed().await.is_ok() {
            let snapshot = *presence.borrow_and_update();
            metrics::record_presence(snapshot);
        }
    });

    let state = Arc::new(AppState::new(hub.clone(), config, encoder));
    let app = client_app(state.clone());
    let control = control_app(hub);

    info!("Beacon server listening on {}", listener.local_addr()?);
    info!(
        "WebSocket endpoint: ws://{}{}",
        listener.local_addr()?,
        state.config.transport.websocket_path
    );
    info!("Control plane listening on {}", control_listener.local_addr()?);

    let client_server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    let control_server = axum::serve(control_listener, control);

    tokio::try_join!(
        async { client_server.await.context("Client server failed") },
        async { control_server.await.context("Control server failed") },
    )?;

    Ok(())
}

/// Health check handler.
///
/// Reports the last broadcast presence and live hub statistics; answers
/// 503 once the hub has stopped.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let presence = *state.hub.presence().borrow();
    match state.hub.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "protocol": PROTOCOL_VERSION,
                "presence": presence,
                "hub": stats,
            })),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                axum::Json(serde_json::json!({
                    "status": "unavailable",
                    "version": env!("CARGO_PKG_VERSION"),
                    "protocol": PROTOCOL_VERSION,
                    "presence": presence,
                })),
            )
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let client_ip = client_ip::resolve(&headers, peer);
    let format = params.wire_format();
    ws.max_message_size(state.config.transport.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, client_ip, format))
}

/// Per-connection context for event handling.
struct ConnectionContext {
    id: ConnectionId,
    client_ip: String,
    outbox: OutboxSender,
}

impl ConnectionContext {
    /// Queue a reply behind anything the hub already queued.
    fn reply(&self, frame: Frame) {
        let message = Arc::new(Message::direct(self.id.clone(), frame));
        if self.outbox.send(message).is_err() {
            debug!(connection = %self.id, "Outbox closed, reply dropped");
        }
    }
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    client_ip: String,
    mut format: WireFormat,
) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let id = ConnectionId::generate();
    let (outbox, mut inbox) = mpsc::unbounded_channel::<Arc<Message>>();

    if let Err(e) = state.hub.connect(id.clone(), Box::new(outbox.clone())) {
        error!(connection = %id, error = %e, "Failed to register connection");
        return;
    }

    debug!(connection = %id, client_ip = %client_ip, "WebSocket connected");

    let ctx = ConnectionContext {
        id: id.clone(),
        client_ip,
        outbox,
    };

    let (mut sender, mut receiver) = socket.split();

    if send_frame(&mut sender, format, &Frame::connected(id.as_str()))
        .await
        .is_err()
    {
        error!(connection = %id, "Failed to send Connected frame");
        disconnect(&state, &id);
        return;
    }

    // Read buffer for partial frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            // Frames queued by the hub or by our own replies
            Some(message) = inbox.recv() => {
                if send_frame(&mut sender, format, &message.frame).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Binary(data))) => {
                        format = WireFormat::MessagePack;
                        read_buffer.extend_from_slice(&data);

                        loop {
                            match codec::decode_from(&mut read_buffer) {
                                Ok(Some(frame)) => {
                                    metrics::record_message(data.len(), "inbound");
                                    handle_frame(frame, &ctx, &state).await;
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(connection = %id, error = %e, "Undecodable frame");
                                    metrics::record_error("decode");
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(WsMessage::Text(text))) => {
                        format = WireFormat::Json;
                        match codec::decode_json(&text) {
                            Ok(frame) => {
                                metrics::record_message(text.len(), "inbound");
                                handle_frame(frame, &ctx, &state).await;
                            }
                            Err(e) => {
                                warn!(connection = %id, error = %e, "Undecodable frame");
                                metrics::record_error("decode");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!(connection = %id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    disconnect(&state, &id);
    debug!(connection = %id, "WebSocket disconnected");
}

fn disconnect(state: &AppState, id: &ConnectionId) {
    if let Err(e) = state.hub.disconnect(id.clone()) {
        warn!(connection = %id, error = %e, "Disconnect not delivered");
    }
}

/// Handle a decoded client event.
async fn handle_frame(frame: Frame, ctx: &ConnectionContext, state: &AppState) {
    match frame {
        Frame::Login(uid) => {
            debug!(connection = %ctx.id, uid = %uid, "Login");
            metrics::record_login();
            if let Err(e) = state.hub.login(ctx.id.clone(), uid) {
                error!(connection = %ctx.id, error = %e, "Login not delivered");
            }
        }

        Frame::GetIp => {
            ctx.reply(Frame::GetIpFromServer(ctx.client_ip.clone()));
        }

        Frame::QrCodeGenerator(text) => {
            let encoder = state.encoder.clone();
            let start = Instant::now();
            let rendered = tokio::task::spawn_blocking(move || encoder.encode(&text)).await;
            metrics::record_qr_render(start.elapsed().as_secs_f64());

            match rendered {
                Ok(Ok(png)) => ctx.reply(Frame::QrCodeGeneratorFromServer(png)),
                Ok(Err(e)) => {
                    warn!(connection = %ctx.id, error = %e, "QR render failed");
                    metrics::record_error("qr");
                }
                Err(e) => {
                    error!(connection = %ctx.id, error = %e, "QR render task failed");
                    metrics::record_error("qr");
                }
            }
        }

        other => {
            warn!(connection = %ctx.id, event = other.event(), "Unexpected client event");
        }
    }
}

/// Send a frame to the WebSocket in the client's format.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    format: WireFormat,
    frame: &Frame,
) -> Result<()> {
    let encoded = codec::encode_as(format, frame)?;
    metrics::record_message(encoded.len(), "outbound");
    let message = match encoded {
        EncodedFrame::Binary(data) => WsMessage::Binary(data.to_vec()),
        EncodedFrame::Text(text) => WsMessage::Text(text),
    };
    sender.send(message).await?;
    Ok(())
}
