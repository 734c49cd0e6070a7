//! Explicit method registry.
//!
//! Every RPC method the daemon answers is registered here by name at
//! startup. Dispatch is a table lookup, `get_supported_methods` and the
//! welcome burst read the same table, and an unknown method falls out of
//! the lookup as `MethodNotFound` naming the method.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;
use crate::handlers::{camera, info, media};
use crate::server::ServerContext;

/// Boxed handler future; the fn-pointer shape keeps the table `'static`.
pub type MethodHandler = fn(Arc<ServerContext>, Option<Value>) -> BoxFuture<'static, Result<Value>>;

pub struct MethodDef {
    pub name: &'static str,
    pub summary: &'static str,
    pub handler: MethodHandler,
}

pub struct MethodRegistry {
    methods: HashMap<&'static str, MethodDef>,
}

impl MethodRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            methods: HashMap::new(),
        };

        registry.register("ping", "Liveness check, returns \"pong\"", |ctx, params| {
            Box::pin(info::ping(ctx, params))
        });
        registry.register("echo", "Returns the given message unchanged", |ctx, params| {
            Box::pin(info::echo(ctx, params))
        });
        registry.register(
            "get_server_info",
            "Process, uptime and resource summary",
            |ctx, params| Box::pin(info::get_server_info(ctx, params)),
        );
        registry.register(
            "get_supported_methods",
            "Names of every registered method",
            |ctx, params| Box::pin(info::get_supported_methods(ctx, params)),
        );
        registry.register(
            "get_camera_list",
            "Current device table with counts",
            |ctx, params| Box::pin(camera::get_camera_list(ctx, params)),
        );
        registry.register(
            "get_camera_status",
            "Status record for one device",
            |ctx, params| Box::pin(camera::get_camera_status(ctx, params)),
        );
        registry.register(
            "capture_snapshot",
            "Capture a single frame from a device",
            |ctx, params| Box::pin(media::capture_snapshot(ctx, params)),
        );
        registry.register(
            "start_recording",
            "Start recording a device, optionally time-limited",
            |ctx, params| Box::pin(media::start_recording(ctx, params)),
        );
        registry.register(
            "stop_recording",
            "Stop or cancel a recording session",
            |ctx, params| Box::pin(media::stop_recording(ctx, params)),
        );
        registry.register(
            "schedule_recording",
            "Arm a recording to start at a future time",
            |ctx, params| Box::pin(media::schedule_recording(ctx, params)),
        );

        registry
    }

    fn register(&mut self, name: &'static str, summary: &'static str, handler: MethodHandler) {
        self.methods.insert(
            name,
            MethodDef {
                name,
                summary,
                handler,
            },
        );
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MethodDef> {
        self.methods.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted for stable wire output.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.methods.keys().copied().collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_wire_method_is_registered() {
        let registry = MethodRegistry::new();
        for name in [
            "ping",
            "echo",
            "get_server_info",
            "get_camera_list",
            "get_camera_status",
            "get_supported_methods",
            "capture_snapshot",
            "start_recording",
            "stop_recording",
            "schedule_recording",
        ] {
            assert!(registry.contains(name), "missing method: {name}");
        }
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = MethodRegistry::new();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_unknown_method_misses_lookup() {
        let registry = MethodRegistry::new();
        assert!(registry.get("frobnicate").is_none());
    }
}
