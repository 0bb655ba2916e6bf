//! Platform network layer trait definition

use tokio::sync::broadcast;
use trait_variant::make;

use crate::core::{
    error::PlatformResult,
    request_builder::PlatformRequest,
    types::{AttemptId, PlatformEvent, ScanResult},
};

/// Abstraction over the OS network stack (typically wpa_supplicant)
///
/// Association progress is reported asynchronously through the event stream
/// returned by [`WifiBackend::subscribe`]; the async methods only issue
/// requests.
#[make(Send)]
pub trait WifiBackend: Send + Sync + 'static {
    /// Scan for access points in range
    async fn scan(&self) -> PlatformResult<Vec<ScanResult>>;

    /// Ask the platform to associate with the requested network on behalf of
    /// `attempt`
    ///
    /// Resolves once the platform has taken up the request. A refusal is
    /// reported as `PlatformError::Rejected`.
    async fn request_association(
        &self,
        attempt: AttemptId,
        request: &PlatformRequest,
    ) -> PlatformResult<()>;

    /// Drop whatever `attempt` configured
    ///
    /// Configuration left by other attempts (a working link in particular)
    /// stays untouched.
    async fn abort_association(&self, attempt: AttemptId) -> PlatformResult<()>;

    /// Subscribe to link and validation events
    ///
    /// Only events emitted after the call are received.
    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent>;

    /// Ask the platform to drop the link to `ssid`
    ///
    /// Confirmation arrives as `PlatformEvent::LinkDown`.
    async fn request_disconnect(&self, ssid: &str) -> PlatformResult<()>;

    /// Delete the stored network profile for `ssid`
    async fn remove_profile(&self, ssid: &str) -> PlatformResult<()>;

    /// SSID of the current link, if any
    ///
    /// Must not block; implementations answer from cached link state.
    fn current_link(&self) -> Option<String>;
}
