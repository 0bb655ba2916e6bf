//! Command-line argument parsing

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "wifi-association", version, author)]
#[clap(about = "WiFi association service with a Unix socket JSON-RPC interface")]
pub struct CliArgs {
    /// Wireless network interface name
    #[clap(short, long, default_value = "wlan0")]
    pub interface: String,

    /// Path for Unix socket
    #[clap(long, default_value = "/run/wifi-association.sock")]
    pub socket_path: String,

    /// Socket file permissions (octal, e.g., 660)
    #[clap(long, default_value = "660")]
    pub socket_mode: String,

    /// Default association timeout in milliseconds
    #[clap(short, long, default_value = "30000")]
    pub timeout_ms: u64,

    /// Default WPS association timeout in milliseconds
    #[clap(long, default_value = "30000")]
    pub wps_timeout_ms: u64,

    /// How long to wait for a disconnect to be confirmed, in milliseconds
    #[clap(long, default_value = "5000")]
    pub disconnect_timeout_ms: u64,

    /// Host probed by internet checks
    #[clap(long, default_value = "8.8.8.8")]
    pub probe_host: String,

    /// Port probed by internet checks
    #[clap(long, default_value = "53")]
    pub probe_port: u16,

    /// Default internet check timeout in milliseconds
    #[clap(long, default_value = "1500")]
    pub probe_timeout_ms: u64,

    /// Refuse new association requests while one is running
    #[clap(long)]
    pub reject_concurrent: bool,

    /// Treat open networks as connected as soon as the link is up
    #[clap(long)]
    pub skip_open_validation: bool,

    /// Require a successful internet probe before reporting a link as validated
    #[clap(long)]
    pub validate_with_probe: bool,

    /// Do not emit association lifecycle log lines
    #[clap(long)]
    pub quiet_library_log: bool,
}
