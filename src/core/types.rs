//! Domain types for WiFi association

use serde::{Deserialize, Serialize};

/// Maximum SSID length in bytes (IEEE 802.11)
pub const MAX_SSID_LEN: usize = 32;

/// How the descriptor's SSID selects a network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// SSID must match exactly
    #[default]
    Exact,
    /// SSID is a prefix; the first (strongest) matching network is used
    Prefix,
}

/// Security type of the target network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityType {
    Open,
    WpaPsk,
    Eap,
}

/// Immutable description of the network a caller wants to join
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub ssid: String,
    #[serde(default)]
    pub match_mode: MatchMode,
    pub security: SecurityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    /// Only associate with this access point (`aa:bb:cc:dd:ee:ff`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bssid: Option<String>,
}

impl NetworkDescriptor {
    /// Open network matched by exact SSID
    pub fn open(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            match_mode: MatchMode::Exact,
            security: SecurityType::Open,
            password: None,
            hidden: false,
            bssid: None,
        }
    }

    /// WPA/WPA2 personal network matched by exact SSID
    pub fn wpa_psk(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            match_mode: MatchMode::Exact,
            security: SecurityType::WpaPsk,
            password: Some(password.into()),
            hidden: false,
            bssid: None,
        }
    }

    /// WPA enterprise network matched by exact SSID
    pub fn eap(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            match_mode: MatchMode::Exact,
            security: SecurityType::Eap,
            password: Some(password.into()),
            hidden: false,
            bssid: None,
        }
    }

    pub fn with_prefix_match(mut self) -> Self {
        self.match_mode = MatchMode::Prefix;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_bssid(mut self, bssid: impl Into<String>) -> Self {
        self.bssid = Some(bssid.into());
        self
    }

    /// Pin a scanned access point: its SSID, BSSID and security type
    ///
    /// `password` is ignored for open networks.
    pub fn from_scan_result(result: &ScanResult, password: Option<&str>) -> Self {
        let password = match result.security {
            SecurityType::Open => None,
            _ => password.map(str::to_string),
        };
        Self {
            ssid: result.ssid.clone(),
            match_mode: MatchMode::Exact,
            security: result.security,
            password,
            hidden: false,
            bssid: Some(result.bssid.clone()),
        }
    }
}

// Keep passwords out of logs.
impl std::fmt::Debug for NetworkDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkDescriptor")
            .field("ssid", &self.ssid)
            .field("match_mode", &self.match_mode)
            .field("security", &self.security)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("hidden", &self.hidden)
            .field("bssid", &self.bssid)
            .finish()
    }
}

/// One access point seen by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub ssid: String,
    pub bssid: String,
    /// Center frequency in MHz
    pub frequency: u32,
    /// Signal level in dBm
    pub signal: i32,
    pub security: SecurityType,
    /// Access point advertises WPS
    #[serde(default)]
    pub wps: bool,
}

/// WPS association through an access point's PIN or push button
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpsDescriptor {
    pub bssid: String,
    /// 4 or 8 digit PIN; push button mode when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

impl WpsDescriptor {
    pub fn pin(bssid: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            bssid: bssid.into(),
            pin: Some(pin.into()),
        }
    }

    pub fn push_button(bssid: impl Into<String>) -> Self {
        Self {
            bssid: bssid.into(),
            pin: None,
        }
    }
}

impl std::fmt::Debug for WpsDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WpsDescriptor")
            .field("bssid", &self.bssid)
            .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Reason code attached to a platform rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RejectCode {
    AuthenticationFailed = 1,
    NetworkNotFound = 2,
    CouldNotConnect = 3,
    Denied = 4,
}

impl RejectCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for RejectCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            1 => Ok(RejectCode::AuthenticationFailed),
            2 => Ok(RejectCode::NetworkNotFound),
            3 => Ok(RejectCode::CouldNotConnect),
            4 => Ok(RejectCode::Denied),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for RejectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectCode::AuthenticationFailed => "authentication failed",
            RejectCode::NetworkNotFound => "network not found",
            RejectCode::CouldNotConnect => "could not connect",
            RejectCode::Denied => "request denied",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

/// Asynchronous signals delivered by the platform network layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Link associated with the named network
    LinkUp { ssid: String },
    /// Link dropped
    LinkDown,
    /// Link has usable upstream connectivity
    Validated,
    /// Platform refused the association request
    RequestRejected { code: RejectCode },
}

/// Why an attempt ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "code", rename_all = "snake_case")]
pub enum FailureReason {
    Rejected(RejectCode),
    LinkLost,
    Superseded,
    Cancelled,
    PlatformUnavailable,
}

/// Association state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum AssociationState {
    Idle,
    Requesting,
    WaitingForLinkUp,
    WaitingForValidation,
    Connected,
    Failed(FailureReason),
    TimedOut,
}

impl AssociationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssociationState::Connected | AssociationState::Failed(_) | AssociationState::TimedOut
        )
    }
}

/// Successful association result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// SSID the link came up on (resolved name for prefix matches)
    pub ssid: String,
    /// Time from start to `Connected`
    #[serde(with = "duration_ms")]
    pub elapsed: std::time::Duration,
}

/// Current link as seen by the platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkStatus {
    pub connected: bool,
    pub ssid: Option<String>,
}

/// Identifier of one association attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(uuid::Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session identifier for transport connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
