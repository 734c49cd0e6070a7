//! Camera methods: `get_camera_list`, `get_camera_status`.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{DaemonError, Result};
use crate::handlers::parse_params;
use crate::server::ServerContext;

pub async fn get_camera_list(ctx: Arc<ServerContext>, _params: Option<Value>) -> Result<Value> {
    let cameras = ctx.table.snapshot().await;
    let total = cameras.len();
    let connected = cameras.iter().filter(|r| r.is_connected()).count();

    Ok(json!({
        "cameras": cameras,
        "totalCount": total,
        "connectedCount": connected,
        "timestamp": Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
struct CameraStatusParams {
    device: String,
}

pub async fn get_camera_status(ctx: Arc<ServerContext>, params: Option<Value>) -> Result<Value> {
    let params: CameraStatusParams = parse_params(params)?;
    let record = ctx
        .table
        .get(&params.device)
        .await
        .ok_or(DaemonError::DeviceNotFound(params.device))?;
    Ok(serde_json::to_value(record)?)
}
