//! Media methods: `capture_snapshot`, `start_recording`, `stop_recording`,
//! `schedule_recording`.

use std::sync::Arc;

use camwatch_core::MediaSession;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Result;
use crate::handlers::parse_params;
use crate::server::ServerContext;

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    device: String,
    format: Option<String>,
}

pub async fn capture_snapshot(ctx: Arc<ServerContext>, params: Option<Value>) -> Result<Value> {
    let params: SnapshotParams = parse_params(params)?;
    let format = params
        .format
        .unwrap_or_else(|| ctx.config.media.snapshot_format.clone());

    let session = ctx.sessions.capture_snapshot(&params.device, &format).await?;
    let filename = filename(&session);
    Ok(json!({
        "snapshotId": session.id,
        "filename": filename,
        "device": session.device,
        "timestamp": session.started_at,
    }))
}

#[derive(Debug, Deserialize)]
struct StartRecordingParams {
    device: String,
    format: Option<String>,
    duration: Option<u64>,
}

pub async fn start_recording(ctx: Arc<ServerContext>, params: Option<Value>) -> Result<Value> {
    let params: StartRecordingParams = parse_params(params)?;
    let format = params
        .format
        .unwrap_or_else(|| ctx.config.media.recording_format.clone());

    let session = ctx
        .sessions
        .start_recording(&params.device, &format, params.duration)
        .await?;
    let filename = filename(&session);
    Ok(json!({
        "recordingId": session.id,
        "filename": filename,
        "device": session.device,
        "startedAt": session.started_at,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopRecordingParams {
    recording_id: String,
}

pub async fn stop_recording(ctx: Arc<ServerContext>, params: Option<Value>) -> Result<Value> {
    let params: StopRecordingParams = parse_params(params)?;
    let session = ctx
        .sessions
        .stop_recording(&params.recording_id.as_str().into())
        .await?;
    Ok(json!({
        "recordingId": session.id,
        "status": session.state,
        "stoppedAt": session.stopped_at,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleRecordingParams {
    device: String,
    start_time: DateTime<Utc>,
    duration: u64,
    format: Option<String>,
}

pub async fn schedule_recording(ctx: Arc<ServerContext>, params: Option<Value>) -> Result<Value> {
    let params: ScheduleRecordingParams = parse_params(params)?;
    let format = params
        .format
        .unwrap_or_else(|| ctx.config.media.recording_format.clone());

    let session = ctx
        .sessions
        .schedule_recording(&params.device, params.start_time, params.duration, &format)
        .await?;
    Ok(json!({
        "recordingId": session.id,
        "device": session.device,
        "scheduledFor": session.scheduled_at,
        "duration": session.duration_secs,
        "format": session.format,
        "status": session.state,
    }))
}

fn filename(session: &MediaSession) -> String {
    session
        .output_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}
