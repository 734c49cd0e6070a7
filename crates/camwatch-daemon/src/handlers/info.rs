//! Info methods: `ping`, `echo`, `get_server_info`, `get_supported_methods`.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Result;
use crate::handlers::parse_params;
use crate::server::ServerContext;

pub async fn ping(_ctx: Arc<ServerContext>, _params: Option<Value>) -> Result<Value> {
    Ok(json!("pong"))
}

#[derive(Debug, Deserialize)]
struct EchoParams {
    message: String,
}

/// Returns the message string exactly as received.
pub async fn echo(_ctx: Arc<ServerContext>, params: Option<Value>) -> Result<Value> {
    let params: EchoParams = parse_params(params)?;
    Ok(Value::String(params.message))
}

pub async fn get_server_info(ctx: Arc<ServerContext>, _params: Option<Value>) -> Result<Value> {
    let (cameras_total, cameras_connected) = ctx.table.counts().await;
    let (sessions_active, sessions_total) = ctx.sessions.counts().await;
    let uptime = (Utc::now() - ctx.started_at).num_seconds().max(0);

    Ok(json!({
        "server": "camwatch",
        "version": env!("CARGO_PKG_VERSION"),
        "startedAt": ctx.started_at,
        "uptimeSeconds": uptime,
        "activeConnections": ctx.connections.count().await,
        "cameras": {
            "total": cameras_total,
            "connected": cameras_connected,
        },
        "sessions": {
            "active": sessions_active,
            "total": sessions_total,
        },
        "pid": std::process::id(),
    }))
}

pub async fn get_supported_methods(
    ctx: Arc<ServerContext>,
    _params: Option<Value>,
) -> Result<Value> {
    Ok(json!(ctx.methods.names()))
}
