//! Shared JSON-RPC 2.0 protocol definitions for camwatch.
//!
//! This crate provides the message envelope types and error codes used on
//! the WebSocket wire between the camwatch server and its clients. It has
//! no I/O of its own; framing is the transport's job (one JSON object per
//! text frame, batch arrays unsupported).

pub mod protocol;

pub use protocol::{
    CAMERA_STATUS_UPDATE, DEVICE_BUSY, DEVICE_NOT_FOUND, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, Message, Notification, PARSE_ERROR,
    Request, RequestId, Response, RpcError, SERVER_WELCOME, SESSION_NOT_FOUND,
};
