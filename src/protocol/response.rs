//! Response message types

use serde::{Deserialize, Serialize};

use crate::core::types::{Association, AssociationState, LinkStatus, ScanResult};

/// Response messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Response {
    /// Connect response
    Connect(ConnectResponse),

    /// Status response
    Status(StatusResponse),

    /// Cancel response
    Cancel(CancelResponse),

    /// is_connected response
    IsConnected(IsConnectedResponse),

    /// check_internet response
    Internet(InternetResponse),

    /// scan response
    Scan(ScanResponse),

    /// Plain acknowledgement (disconnect, remove)
    Ack(AckResponse),
}

/// Response for connect request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectResponse {
    pub status: String,
    #[serde(flatten)]
    pub association: Association,
}

/// Response for cancel request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelResponse {
    pub status: String,
    pub cancelled: bool,
}

/// Response for is_connected request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IsConnectedResponse {
    pub status: String,
    pub connected: bool,
}

/// Response for check_internet request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternetResponse {
    pub status: String,
    pub reachable: bool,
}

/// Response for status request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
    pub link: LinkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<AssociationState>,
}

/// Response for scan request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanResponse {
    pub status: String,
    pub networks: Vec<ScanResult>,
}

/// Response carrying no data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckResponse {
    pub status: String,
}

impl ConnectResponse {
    pub fn ok(association: Association) -> Self {
        Self {
            status: "ok".to_string(),
            association,
        }
    }
}

impl CancelResponse {
    pub fn ok(cancelled: bool) -> Self {
        Self {
            status: "ok".to_string(),
            cancelled,
        }
    }
}

impl IsConnectedResponse {
    pub fn ok(connected: bool) -> Self {
        Self {
            status: "ok".to_string(),
            connected,
        }
    }
}

impl InternetResponse {
    pub fn ok(reachable: bool) -> Self {
        Self {
            status: "ok".to_string(),
            reachable,
        }
    }
}

impl ScanResponse {
    pub fn ok(networks: Vec<ScanResult>) -> Self {
        Self {
            status: "ok".to_string(),
            networks,
        }
    }
}

impl StatusResponse {
    pub fn ok(link: LinkStatus, attempt: Option<AssociationState>) -> Self {
        Self {
            status: "ok".to_string(),
            link,
            attempt,
        }
    }
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
