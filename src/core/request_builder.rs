//! Translation of network descriptors into platform association requests

use crate::core::{
    error::{AssociationError, AssociationResult},
    types::{MAX_SSID_LEN, MatchMode, NetworkDescriptor, SecurityType, WpsDescriptor},
};

/// Which network(s) the platform should associate with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsidTarget {
    Exact(String),
    Prefix(String),
    /// Whatever network the access point hands out (WPS)
    Any,
}

impl SsidTarget {
    /// Whether a scanned SSID satisfies this target
    pub fn matches(&self, ssid: &str) -> bool {
        match self {
            SsidTarget::Exact(name) => ssid == name,
            SsidTarget::Prefix(prefix) => ssid.starts_with(prefix.as_str()),
            SsidTarget::Any => true,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SsidTarget::Exact(name) | SsidTarget::Prefix(name) => name,
            SsidTarget::Any => "*",
        }
    }
}

/// How a WPS exchange is authorized
#[derive(Clone, PartialEq, Eq)]
pub enum WpsMethod {
    PushButton,
    Pin(String),
}

/// Credential material handed to the platform
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    None,
    Passphrase(String),
    Eap { password: String },
    Wps(WpsMethod),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::None => write!(f, "None"),
            Credential::Passphrase(_) => write!(f, "Passphrase(<redacted>)"),
            Credential::Eap { .. } => write!(f, "Eap(<redacted>)"),
            Credential::Wps(WpsMethod::PushButton) => write!(f, "Wps(PushButton)"),
            Credential::Wps(WpsMethod::Pin(_)) => write!(f, "Wps(Pin(<redacted>))"),
        }
    }
}

/// Platform network request derived from a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRequest {
    pub target: SsidTarget,
    pub credential: Credential,
    /// Actively probe for the SSID (hidden networks)
    pub scan_ssid: bool,
    /// Restrict association to one access point, lowercase `aa:bb:cc:dd:ee:ff`
    pub bssid: Option<String>,
}

impl PlatformRequest {
    pub fn is_open(&self) -> bool {
        matches!(self.credential, Credential::None)
    }
}

/// Validates descriptors and builds platform requests
#[derive(Debug, Default, Clone, Copy)]
pub struct AssociationRequestBuilder;

impl AssociationRequestBuilder {
    /// Build a platform request
    ///
    /// Fails with `InvalidDescriptor` if the SSID is empty or too long, if the
    /// password is missing (or empty) for a secured network or present for an
    /// open one, if a hidden or BSSID-pinned network is addressed by prefix,
    /// or if the BSSID is malformed.
    pub fn build(descriptor: &NetworkDescriptor) -> AssociationResult<PlatformRequest> {
        if descriptor.ssid.is_empty() {
            return Err(invalid("SSID must not be empty"));
        }
        if descriptor.ssid.len() > MAX_SSID_LEN {
            return Err(invalid(format!(
                "SSID must be at most {} bytes, got {}",
                MAX_SSID_LEN,
                descriptor.ssid.len()
            )));
        }
        if descriptor.hidden && descriptor.match_mode == MatchMode::Prefix {
            return Err(invalid("hidden networks require exact SSID matching"));
        }
        if descriptor.bssid.is_some() && descriptor.match_mode == MatchMode::Prefix {
            return Err(invalid("a BSSID requires exact SSID matching"));
        }
        let bssid = descriptor.bssid.as_deref().map(normalize_bssid).transpose()?;

        let credential = match (descriptor.security, descriptor.password.as_deref()) {
            (SecurityType::Open, None) => Credential::None,
            (SecurityType::Open, Some(_)) => {
                return Err(invalid("open networks must not carry a password"));
            }
            (_, None) => return Err(invalid("password required for secured network")),
            (_, Some("")) => return Err(invalid("password must not be empty")),
            (SecurityType::WpaPsk, Some(password)) => Credential::Passphrase(password.to_string()),
            (SecurityType::Eap, Some(password)) => Credential::Eap {
                password: password.to_string(),
            },
        };

        let target = match descriptor.match_mode {
            MatchMode::Exact => SsidTarget::Exact(descriptor.ssid.clone()),
            MatchMode::Prefix => SsidTarget::Prefix(descriptor.ssid.clone()),
        };

        Ok(PlatformRequest {
            target,
            credential,
            scan_ssid: descriptor.hidden,
            bssid,
        })
    }

    /// Build a WPS request for the access point `descriptor.bssid`
    ///
    /// PINs are 4 or 8 decimal digits.
    pub fn build_wps(descriptor: &WpsDescriptor) -> AssociationResult<PlatformRequest> {
        let bssid = normalize_bssid(&descriptor.bssid)?;

        let method = match descriptor.pin.as_deref() {
            None => WpsMethod::PushButton,
            Some(pin) if matches!(pin.len(), 4 | 8) && pin.bytes().all(|b| b.is_ascii_digit()) => {
                WpsMethod::Pin(pin.to_string())
            }
            Some(_) => return Err(invalid("WPS PIN must be 4 or 8 digits")),
        };

        Ok(PlatformRequest {
            target: SsidTarget::Any,
            credential: Credential::Wps(method),
            scan_ssid: false,
            bssid: Some(bssid),
        })
    }
}

/// Lowercase `aa:bb:cc:dd:ee:ff`; anything else is invalid
fn normalize_bssid(bssid: &str) -> AssociationResult<String> {
    let octets: Vec<&str> = bssid.split(':').collect();
    let well_formed = octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && hex::decode(octet).is_ok());
    if !well_formed {
        return Err(invalid(format!("malformed BSSID {:?}", bssid)));
    }
    Ok(bssid.to_ascii_lowercase())
}

fn invalid(message: impl Into<String>) -> AssociationError {
    AssociationError::InvalidDescriptor(message.into())
}
