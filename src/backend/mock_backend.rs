//! Mock platform backend for testing

use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};

use crate::backend::WifiBackend;
use crate::core::error::{PlatformError, PlatformResult};
use crate::core::request_builder::{PlatformRequest, SsidTarget};
use crate::core::types::{AttemptId, PlatformEvent, ScanResult};

const EVENT_CAPACITY: usize = 64;

/// Internal state for the mock backend
#[derive(Debug, Default)]
struct MockState {
    association_failure: Option<PlatformError>,
    disconnect_failure: Option<PlatformError>,
    events_on_request: Vec<PlatformEvent>,
    link_down_on_disconnect: bool,
    scan_failure: Option<PlatformError>,
    scan_results: Vec<ScanResult>,
    requests: Vec<PlatformRequest>,
    disconnect_requests: Vec<String>,
    aborts: Vec<AttemptId>,
    profiles: Vec<String>,
    denied_profiles: Vec<String>,
}

/// Scripted platform for tests
///
/// Records every request and lets tests emit platform events at will.
#[derive(Debug, Clone)]
pub struct MockWifiBackend {
    inner: Arc<Mutex<MockState>>,
    events: broadcast::Sender<PlatformEvent>,
    link: Arc<watch::Sender<Option<String>>>,
}

impl MockWifiBackend {
    /// Create a mock with no link and no stored profiles
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (link, _) = watch::channel(None);
        Self {
            inner: Arc::new(Mutex::new(MockState {
                link_down_on_disconnect: true,
                ..MockState::default()
            })),
            events,
            link: Arc::new(link),
        }
    }

    /// Emit a platform event, updating the cached link state first
    pub fn emit(&self, event: PlatformEvent) {
        match &event {
            PlatformEvent::LinkUp { ssid } => {
                self.link.send_replace(Some(ssid.clone()));
            }
            PlatformEvent::LinkDown => {
                self.link.send_replace(None);
            }
            _ => {}
        }
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Pretend the device is already linked to `ssid`
    pub fn set_link(&self, ssid: Option<&str>) {
        self.link.send_replace(ssid.map(str::to_string));
    }

    /// Fail the next association requests with `error`
    pub async fn set_association_failure(&self, error: Option<PlatformError>) {
        self.inner.lock().await.association_failure = error;
    }

    pub async fn set_disconnect_failure(&self, error: Option<PlatformError>) {
        self.inner.lock().await.disconnect_failure = error;
    }

    /// Access points reported by `scan`
    pub async fn set_scan_results(&self, results: Vec<ScanResult>) {
        self.inner.lock().await.scan_results = results;
    }

    pub async fn set_scan_failure(&self, error: Option<PlatformError>) {
        self.inner.lock().await.scan_failure = error;
    }

    /// Events emitted as soon as an association request is accepted
    pub async fn set_events_on_request(&self, events: Vec<PlatformEvent>) {
        self.inner.lock().await.events_on_request = events;
    }

    /// Whether a disconnect request is confirmed with `LinkDown`
    pub async fn set_link_down_on_disconnect(&self, enabled: bool) {
        self.inner.lock().await.link_down_on_disconnect = enabled;
    }

    pub async fn add_profile(&self, ssid: &str) {
        self.inner.lock().await.profiles.push(ssid.to_string());
    }

    /// Profiles that exist but may not be removed by us
    pub async fn deny_profile(&self, ssid: &str) {
        let mut state = self.inner.lock().await;
        state.profiles.push(ssid.to_string());
        state.denied_profiles.push(ssid.to_string());
    }

    pub async fn profiles(&self) -> Vec<String> {
        self.inner.lock().await.profiles.clone()
    }

    pub async fn requests(&self) -> Vec<PlatformRequest> {
        self.inner.lock().await.requests.clone()
    }

    pub async fn disconnect_requests(&self) -> Vec<String> {
        self.inner.lock().await.disconnect_requests.clone()
    }

    pub async fn abort_count(&self) -> usize {
        self.inner.lock().await.aborts.len()
    }

    /// Attempts that asked for their configuration to be dropped
    pub async fn aborts(&self) -> Vec<AttemptId> {
        self.inner.lock().await.aborts.clone()
    }
}

impl Default for MockWifiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiBackend for MockWifiBackend {
    async fn scan(&self) -> PlatformResult<Vec<ScanResult>> {
        let state = self.inner.lock().await;
        if let Some(error) = state.scan_failure.clone() {
            return Err(error);
        }
        Ok(state.scan_results.clone())
    }

    async fn request_association(
        &self,
        _attempt: AttemptId,
        request: &PlatformRequest,
    ) -> PlatformResult<()> {
        let events = {
            let mut state = self.inner.lock().await;
            state.requests.push(request.clone());
            if let Some(error) = state.association_failure.clone() {
                return Err(error);
            }
            if let SsidTarget::Exact(ssid) = &request.target {
                if !state.profiles.contains(ssid) {
                    state.profiles.push(ssid.clone());
                }
            }
            state.events_on_request.clone()
        };

        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    async fn abort_association(&self, attempt: AttemptId) -> PlatformResult<()> {
        self.inner.lock().await.aborts.push(attempt);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }

    async fn request_disconnect(&self, ssid: &str) -> PlatformResult<()> {
        let confirm = {
            let mut state = self.inner.lock().await;
            state.disconnect_requests.push(ssid.to_string());
            if let Some(error) = state.disconnect_failure.clone() {
                return Err(error);
            }
            state.link_down_on_disconnect
        };

        if confirm {
            self.emit(PlatformEvent::LinkDown);
        }
        Ok(())
    }

    async fn remove_profile(&self, ssid: &str) -> PlatformResult<()> {
        let mut state = self.inner.lock().await;
        if state.denied_profiles.iter().any(|p| p == ssid) {
            return Err(PlatformError::ProfileDenied(ssid.to_string()));
        }
        let before = state.profiles.len();
        state.profiles.retain(|p| p != ssid);
        if state.profiles.len() == before {
            return Err(PlatformError::ProfileNotFound(ssid.to_string()));
        }
        Ok(())
    }

    fn current_link(&self) -> Option<String> {
        self.link.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request_builder::Credential;

    fn request(ssid: &str) -> PlatformRequest {
        PlatformRequest {
            target: SsidTarget::Exact(ssid.to_string()),
            credential: Credential::None,
            scan_ssid: false,
            bssid: None,
        }
    }

    #[tokio::test]
    async fn test_mock_backend_records_requests() {
        let backend = MockWifiBackend::new();

        backend.request_association(AttemptId::new(), &request("Home")).await.unwrap();

        assert_eq!(backend.requests().await, vec![request("Home")]);
        assert_eq!(backend.profiles().await, vec!["Home".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_backend_association_failure() {
        let backend = MockWifiBackend::new();
        backend
            .set_association_failure(Some(PlatformError::BackendUnavailable("down".into())))
            .await;

        assert!(backend.request_association(AttemptId::new(), &request("Home")).await.is_err());
        assert!(backend.profiles().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_backend_emits_events_and_tracks_link() {
        let backend = MockWifiBackend::new();
        let mut events = backend.subscribe();
        backend
            .set_events_on_request(vec![PlatformEvent::LinkUp {
                ssid: "Home".to_string(),
            }])
            .await;

        backend.request_association(AttemptId::new(), &request("Home")).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            PlatformEvent::LinkUp {
                ssid: "Home".to_string()
            }
        );
        assert_eq!(backend.current_link(), Some("Home".to_string()));
    }

    #[tokio::test]
    async fn test_mock_backend_disconnect_confirms_with_link_down() {
        let backend = MockWifiBackend::new();
        backend.set_link(Some("Home"));
        let mut events = backend.subscribe();

        backend.request_disconnect("Home").await.unwrap();

        assert_eq!(events.recv().await.unwrap(), PlatformEvent::LinkDown);
        assert_eq!(backend.current_link(), None);
        assert_eq!(backend.disconnect_requests().await, vec!["Home".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_backend_scan() {
        let backend = MockWifiBackend::new();
        assert!(backend.scan().await.unwrap().is_empty());

        let lobby = ScanResult {
            ssid: "Lobby".to_string(),
            bssid: "aa:bb:cc:dd:ee:ff".to_string(),
            frequency: 2437,
            signal: -60,
            security: crate::core::types::SecurityType::Open,
            wps: false,
        };
        backend.set_scan_results(vec![lobby.clone()]).await;
        assert_eq!(backend.scan().await.unwrap(), vec![lobby]);

        backend
            .set_scan_failure(Some(PlatformError::BackendUnavailable("down".into())))
            .await;
        assert!(backend.scan().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_backend_remove_profile() {
        let backend = MockWifiBackend::new();
        backend.add_profile("Home").await;
        backend.deny_profile("Neighbour").await;

        backend.remove_profile("Home").await.unwrap();
        assert_eq!(
            backend.remove_profile("Home").await,
            Err(PlatformError::ProfileNotFound("Home".to_string()))
        );
        assert_eq!(
            backend.remove_profile("Neighbour").await,
            Err(PlatformError::ProfileDenied("Neighbour".to_string()))
        );
    }
}
