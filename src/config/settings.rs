//! Runtime settings

use std::time::Duration;

use crate::{
    config::CliArgs,
    core::{
        logging::LogConfig,
        manager::{ConcurrencyPolicy, ManagerConfig},
        probe::ProbeTarget,
        state_machine::ValidationPolicy,
    },
};

/// Runtime configuration settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub interface: String,
    pub socket_path: String,
    pub socket_mode: u32,
    pub manager: ManagerConfig,
    pub probe_timeout: Duration,
    pub validate_with_probe: bool,
    pub library_log: bool,
}

impl Settings {
    /// Probe run by the backend before reporting a link as validated
    pub fn validation_probe(&self) -> Option<ProbeTarget> {
        self.validate_with_probe
            .then(|| self.manager.probe_target.clone())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig::new().enable_log(self.library_log)
    }
}

impl From<CliArgs> for Settings {
    fn from(args: CliArgs) -> Self {
        // Parse octal socket mode
        let socket_mode = u32::from_str_radix(&args.socket_mode, 8).unwrap_or(0o660);

        let manager = ManagerConfig {
            default_timeout: Duration::from_millis(args.timeout_ms),
            wps_timeout: Duration::from_millis(args.wps_timeout_ms),
            disconnect_timeout: Duration::from_millis(args.disconnect_timeout_ms),
            concurrency: if args.reject_concurrent {
                ConcurrencyPolicy::Reject
            } else {
                ConcurrencyPolicy::Supersede
            },
            validation: if args.skip_open_validation {
                ValidationPolicy::SkipForOpen
            } else {
                ValidationPolicy::Always
            },
            probe_target: ProbeTarget {
                host: args.probe_host,
                port: args.probe_port,
            },
        };

        Settings {
            interface: args.interface,
            socket_path: args.socket_path,
            socket_mode,
            manager,
            probe_timeout: Duration::from_millis(args.probe_timeout_ms),
            validate_with_probe: args.validate_with_probe,
            library_log: !args.quiet_library_log,
        }
    }
}
