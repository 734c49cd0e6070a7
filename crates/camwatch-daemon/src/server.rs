//! WebSocket server for the camwatch daemon.
//!
//! One listener accepts TCP connections and upgrades them at the
//! configured path. Each connection gets a reader loop plus a send task
//! draining an unbounded channel into the sink, so notification fan-out
//! never blocks on a slow client inside the registry lock. Camera status
//! transitions arrive on an event channel from the monitor and are
//! broadcast to every registered connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, trace, warn};

use camwatch_core::{
    CameraMonitor, Config, DeviceTable, FfmpegExecutor, SessionManager, StatusUpdate, V4l2Probe,
};
use camwatch_rpc::protocol::{self, Message, Notification, Response, RpcError};

use crate::connection::ConnectionId;
use crate::error::Result;
use crate::handlers;
use crate::methods::MethodRegistry;
use crate::registry::ConnectionRegistry;

/// Shared state for every connection and handler.
pub struct ServerContext {
    pub config: Config,
    pub table: Arc<DeviceTable>,
    pub sessions: Arc<SessionManager>,
    pub connections: ConnectionRegistry,
    pub methods: MethodRegistry,
    pub started_at: DateTime<Utc>,
}

/// Build the context, start the monitor and scheduler, serve until
/// ctrl-c, then tear everything down in order: stop the scan loop, kill
/// active captures, drop the listener.
pub async fn run(config: Config) -> Result<()> {
    let table = Arc::new(DeviceTable::new(&config.monitor.device_paths()));
    let probe = Arc::new(V4l2Probe::new(config.monitor.probe_timeout()));
    let shutdown = Arc::new(AtomicBool::new(false));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<StatusUpdate>();

    let monitor = CameraMonitor::new(
        Arc::clone(&table),
        probe,
        event_tx,
        Arc::clone(&shutdown),
        config.monitor.clone(),
    );
    let monitor_handle = monitor.spawn();

    let sessions = Arc::new(SessionManager::new(
        Arc::new(FfmpegExecutor::new()),
        Arc::clone(&table),
        config.media.clone(),
    ));
    let scheduler_handle = Arc::clone(&sessions).run_scheduler();

    let ctx = Arc::new(ServerContext {
        table,
        sessions: Arc::clone(&sessions),
        connections: ConnectionRegistry::new(),
        methods: MethodRegistry::new(),
        started_at: Utc::now(),
        config,
    });

    // Fan transitions out to every client as they come off the monitor.
    let forward_ctx = Arc::clone(&ctx);
    let forward_handle = tokio::spawn(async move {
        while let Some(update) = event_rx.recv().await {
            trace!("forwarding transition: {} {}", update.device, update.status);
            let notification = Notification::new(
                protocol::CAMERA_STATUS_UPDATE,
                Some(update.notification_params()),
            );
            forward_ctx.connections.broadcast(&notification).await;
        }
    });

    let addr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "listening on ws://{}{} ({} methods)",
        addr,
        ctx.config.server.path,
        ctx.methods.len()
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {peer}");
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, ctx).await {
                                debug!("connection from {peer} ended with error: {e}");
                            }
                        });
                    }
                    Err(e) => warn!("accept failed: {e}"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("failed to listen for shutdown signal: {e}");
                }
                info!("shutdown signal received");
                break;
            }
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    let teardown = async {
        sessions.shutdown().await;
        let _ = monitor_handle.await;
        let _ = scheduler_handle.await;
        ctx.connections.close_all().await;
        // Give the per-connection send tasks a moment to drain their
        // queues and put the close frames on the wire.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    };
    if tokio::time::timeout(std::time::Duration::from_secs(5), teardown)
        .await
        .is_err()
    {
        warn!("teardown exceeded grace period, exiting anyway");
    }
    forward_handle.abort();

    info!("server stopped");
    Ok(())
}

/// Upgrade, register, and serve one connection until it closes.
async fn handle_connection(stream: TcpStream, ctx: Arc<ServerContext>) -> Result<()> {
    let expected_path = ctx.config.server.path.clone();
    let callback = move |req: &HandshakeRequest, response: HandshakeResponse| {
        if req.uri().path() == expected_path {
            Ok(response)
        } else {
            debug!("rejecting upgrade at {}", req.uri().path());
            let mut not_found = ErrorResponse::new(None);
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Err(not_found)
        }
    };
    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut sink, mut reader) = ws_stream.split();

    let id = ConnectionId::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    let devices = ctx.table.snapshot().await;
    ctx.connections
        .register(id.clone(), tx.clone(), &devices, &ctx.methods.names())
        .await;
    info!("client connected: {id}");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                debug!("send failed, dropping connection: {e}");
                break;
            }
        }
    });

    while let Some(frame) = reader.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if let Some(response) = process_text(&ctx, text.as_str()).await {
                    match serde_json::to_string(&response) {
                        Ok(json) => ctx.connections.unicast(&id, json).await,
                        Err(e) => error!("failed to serialize response: {e}"),
                    }
                }
            }
            Ok(WsMessage::Ping(payload)) => {
                let _ = tx.send(WsMessage::Pong(payload));
            }
            Ok(WsMessage::Close(_)) => {
                debug!("close frame from {id}");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("read error on {id}: {e}");
                break;
            }
        }
    }

    ctx.connections.unregister(&id).await;
    send_task.abort();
    info!("client disconnected: {id}");
    Ok(())
}

/// Turn one text frame into at most one response.
///
/// Malformed JSON answers `-32700` with no id; a batch array or a frame
/// that is not a JSON-RPC object answers `-32600`. Requests without an
/// id are notifications: executed, never answered. Inbound responses are
/// ignored.
pub async fn process_text(ctx: &Arc<ServerContext>, text: &str) -> Option<Response> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("unparseable frame: {e}");
            return Some(Response::error_without_id(RpcError::parse_error()));
        }
    };
    if value.is_array() {
        return Some(Response::error_without_id(RpcError::invalid_request()));
    }

    let message: Message = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            debug!("invalid envelope: {e}");
            return Some(Response::error_without_id(RpcError::invalid_request()));
        }
    };

    match message {
        Message::Request(request) => {
            if let Some(request_id) = request.id.clone() {
                trace!("dispatching {} (id {request_id:?})", request.method);
                Some(handlers::dispatch(ctx, &request, request_id).await)
            } else {
                run_notification(ctx, &request.method, request.params).await;
                None
            }
        }
        Message::Notification(notification) => {
            run_notification(ctx, &notification.method, notification.params).await;
            None
        }
        Message::Response(response) => {
            // Untagged parsing routes any object that is neither a
            // request nor a notification here (every Response field but
            // jsonrpc is optional). A frame with neither result nor
            // error is not a response, it is an invalid request.
            if response.result.is_none() && response.error.is_none() {
                return Some(Response::error_without_id(RpcError::invalid_request()));
            }
            debug!("ignoring response frame from client");
            None
        }
    }
}

/// Notifications run their handler for side effects only; failures and
/// unknown methods are logged and dropped per JSON-RPC.
async fn run_notification(
    ctx: &Arc<ServerContext>,
    method: &str,
    params: Option<serde_json::Value>,
) {
    match ctx.methods.get(method) {
        Some(def) => {
            if let Err(e) = (def.handler)(Arc::clone(ctx), params).await {
                debug!("notification {method} failed: {e}");
            }
        }
        None => debug!("notification for unknown method {method}"),
    }
}
