mod settings;

pub use settings::{Config, MediaSettings, MonitorSettings, ServerSettings};
