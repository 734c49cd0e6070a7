//! Camwatch daemon library providing the WebSocket server and client
//! management.
//!
//! This crate wires the core camera monitor and media session manager to
//! a JSON-RPC 2.0 endpoint over WebSocket: a method registry for
//! request dispatch, a connection registry for notification fan-out, and
//! the server loop that owns both.

pub mod connection;
pub mod error;
pub(crate) mod handlers;
pub mod methods;
pub mod registry;
pub mod server;

pub use connection::ConnectionId;
pub use error::{DaemonError, Result};
pub use methods::{MethodDef, MethodRegistry};
pub use registry::ConnectionRegistry;
pub use server::{ServerContext, process_text, run};
