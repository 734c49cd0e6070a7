//! Request handlers for the daemon.
//!
//! Handlers for all RPC methods organized by category:
//! - Info methods (`ping`, `echo`, `get_server_info`, `get_supported_methods`)
//! - Camera methods (`get_camera_list`, `get_camera_status`)
//! - Media methods (`capture_snapshot`, `start_recording`, `stop_recording`,
//!   `schedule_recording`)

pub mod camera;
pub mod info;
pub mod media;

use std::sync::Arc;

use camwatch_rpc::protocol::{Request, RequestId, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DaemonError, Result};
use crate::server::ServerContext;

/// Look up and run the handler for a request that carries an id. Handler
/// errors become JSON-RPC error objects here; nothing escapes past this
/// boundary onto the connection.
pub async fn dispatch(ctx: &Arc<ServerContext>, request: &Request, id: RequestId) -> Response {
    let result = match ctx.methods.get(&request.method) {
        Some(def) => (def.handler)(Arc::clone(ctx), request.params.clone()).await,
        None => Err(DaemonError::MethodNotFound(request.method.clone())),
    };

    match result {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::error(id, e.into()),
    }
}

/// Deserialize the params object; missing or malformed params are an
/// `InvalidParams` error carrying the serde message.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    params
        .ok_or_else(|| DaemonError::InvalidParams("Missing params".to_string()))
        .and_then(|v| {
            serde_json::from_value(v).map_err(|e| DaemonError::InvalidParams(e.to_string()))
        })
}
