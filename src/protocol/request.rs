//! Request message types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::types::{NetworkDescriptor, WpsDescriptor};

/// Request messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "params")]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// Associate with a network and wait for the outcome
    Connect(ConnectParams),

    /// Associate through WPS and wait for the outcome
    ConnectWps(ConnectWpsParams),

    /// List access points in range
    Scan,

    /// Cancel the running association attempt
    Cancel,

    /// Drop the link to a network
    Disconnect(SsidParams),

    /// Disconnect if needed and delete the stored profile
    Remove(SsidParams),

    /// Whether the current link is the given network
    IsConnected(SsidParams),

    /// Current link and attempt state
    Status,

    /// Probe internet reachability
    CheckInternet(CheckInternetParams),
}

impl Request {
    /// Method names understood by the server
    pub const METHODS: [&'static str; 9] = [
        "connect",
        "connect_wps",
        "scan",
        "cancel",
        "disconnect",
        "remove",
        "is_connected",
        "status",
        "check_internet",
    ];
}

/// Parameters for connect request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectParams {
    #[serde(flatten)]
    pub network: NetworkDescriptor,

    /// Attempt timeout; the daemon default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ConnectParams {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Parameters for connect_wps request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectWpsParams {
    #[serde(flatten)]
    pub wps: WpsDescriptor,

    /// Attempt timeout; the daemon's WPS default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ConnectWpsParams {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Parameters naming a single network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SsidParams {
    pub ssid: String,
}

/// Parameters for check_internet request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckInternetParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl CheckInternetParams {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
