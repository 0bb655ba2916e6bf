//! Library log configuration
//!
//! Lifecycle messages of the connection manager go through a [`LogConfig`]
//! injected at construction. When enabled they are emitted as `tracing`
//! events and, if a sink is installed, forwarded to it as well.

use std::{fmt, sync::Arc};

use tracing::Level;

/// Target used for forwarded library messages
pub const LOG_TARGET: &str = "wifi_association";

/// Receiver for forwarded library log messages
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, target: &str, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(Level, &str, &str) + Send + Sync,
{
    fn log(&self, level: Level, target: &str, message: &str) {
        self(level, target, message)
    }
}

/// Logging configuration for a connection manager
#[derive(Clone)]
pub struct LogConfig {
    enabled: bool,
    sink: Option<Arc<dyn LogSink>>,
}

impl LogConfig {
    /// Enabled, without forwarding
    pub fn new() -> Self {
        Self {
            enabled: true,
            sink: None,
        }
    }

    /// Disabled configuration; nothing is emitted or forwarded
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            sink: None,
        }
    }

    pub fn enable_log(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Forward library messages to `sink` in addition to `tracing`
    pub fn forward_log(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn emit(&self, level: Level, message: fmt::Arguments<'_>) {
        if !self.enabled {
            return;
        }

        match level {
            Level::ERROR => tracing::error!(target: LOG_TARGET, "{}", message),
            Level::WARN => tracing::warn!(target: LOG_TARGET, "{}", message),
            Level::INFO => tracing::info!(target: LOG_TARGET, "{}", message),
            Level::DEBUG => tracing::debug!(target: LOG_TARGET, "{}", message),
            _ => tracing::trace!(target: LOG_TARGET, "{}", message),
        }

        if let Some(sink) = &self.sink {
            sink.log(level, LOG_TARGET, &message.to_string());
        }
    }

    pub(crate) fn info(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::INFO, message)
    }

    pub(crate) fn debug(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::DEBUG, message)
    }

    pub(crate) fn warn(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::WARN, message)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogConfig")
            .field("enabled", &self.enabled)
            .field("forwarding", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capture() -> (Arc<Mutex<Vec<(Level, String)>>>, LogConfig) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let config = LogConfig::new().forward_log(move |level: Level, _: &str, msg: &str| {
            sink_lines.lock().unwrap().push((level, msg.to_string()));
        });
        (lines, config)
    }

    #[test]
    fn test_forward_log_receives_messages() {
        let (lines, config) = capture();

        config.info(format_args!("CONNECTED SUCCESSFULLY to {}", "Home"));
        config.warn(format_args!("timed out"));

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (Level::INFO, "CONNECTED SUCCESSFULLY to Home".into()));
        assert_eq!(lines[1].0, Level::WARN);
    }

    #[test]
    fn test_disabled_log_forwards_nothing() {
        let (lines, config) = capture();
        let config = config.enable_log(false);

        config.info(format_args!("ignored"));

        assert!(!config.is_enabled());
        assert!(lines.lock().unwrap().is_empty());
    }

    #[test]
    fn test_default_is_enabled_without_sink() {
        let config = LogConfig::default();
        assert!(config.is_enabled());
        assert!(!LogConfig::disabled().is_enabled());
        assert_eq!(
            format!("{:?}", config),
            "LogConfig { enabled: true, forwarding: false }"
        );
    }
}
