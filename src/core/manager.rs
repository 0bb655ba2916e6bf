//! Connection manager facade
//!
//! Serializes association attempts (at most one live attempt per manager) and
//! exposes disconnect, remove and link queries on top of the platform backend.

use std::{sync::Arc, time::Duration};

use tokio::sync::{Mutex, broadcast::error::RecvError};

use crate::{
    backend::WifiBackend,
    core::{
        attempt::{self, AttemptHandle, AttemptPlan, LiveAttempt},
        error::{AssociationError, AssociationResult, PlatformError},
        logging::LogConfig,
        probe::{ConnectivityProbe, ProbeTarget},
        request_builder::{AssociationRequestBuilder, PlatformRequest},
        state_machine::ValidationPolicy,
        types::{
            AssociationState, FailureReason, LinkStatus, NetworkDescriptor, PlatformEvent,
            RejectCode, ScanResult, WpsDescriptor,
        },
    },
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WPS_TIMEOUT: Duration = Duration::from_secs(30);

/// What `connect` does while another attempt is still running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// Cancel the running attempt with `Superseded`, then start the new one
    #[default]
    Supersede,
    /// Refuse the new request with `InProgress`
    Reject,
}

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub default_timeout: Duration,
    pub wps_timeout: Duration,
    pub disconnect_timeout: Duration,
    pub concurrency: ConcurrencyPolicy,
    pub validation: ValidationPolicy,
    pub probe_target: ProbeTarget,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_CONNECT_TIMEOUT,
            wps_timeout: DEFAULT_WPS_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            concurrency: ConcurrencyPolicy::default(),
            validation: ValidationPolicy::default(),
            probe_target: ProbeTarget::default(),
        }
    }
}

/// Public entry point for association, disconnect, remove and link queries
pub struct ConnectionManager<B: WifiBackend> {
    backend: Arc<B>,
    config: ManagerConfig,
    log: LogConfig,
    probe: ConnectivityProbe,
    live: Mutex<Option<LiveAttempt>>,
}

impl<B: WifiBackend> ConnectionManager<B> {
    pub fn new(backend: Arc<B>, config: ManagerConfig, log: LogConfig) -> Self {
        Self {
            backend,
            config,
            log,
            probe: ConnectivityProbe,
            live: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Start associating with `descriptor`
    ///
    /// Invalid descriptors (and a zero timeout) fail here, before anything
    /// reaches the platform. A still running attempt is superseded or the
    /// call is refused, depending on [`ConcurrencyPolicy`]. When superseding,
    /// the old handle has resolved with `Superseded` before this returns.
    pub async fn connect(
        &self,
        descriptor: &NetworkDescriptor,
        timeout: Duration,
    ) -> AssociationResult<AttemptHandle> {
        let request = AssociationRequestBuilder::build(descriptor)?;
        self.start(request, &descriptor.ssid, timeout).await
    }

    /// [`ConnectionManager::connect`] with the configured default timeout
    pub async fn connect_with_default_timeout(
        &self,
        descriptor: &NetworkDescriptor,
    ) -> AssociationResult<AttemptHandle> {
        self.connect(descriptor, self.config.default_timeout).await
    }

    /// Scan, let `select` pick an access point, then connect to it
    ///
    /// The chosen access point is pinned by BSSID. Fails with
    /// `Rejected(NetworkNotFound)` if `select` picks nothing.
    pub async fn connect_with_scan_result<F>(
        &self,
        password: Option<&str>,
        timeout: Duration,
        select: F,
    ) -> AssociationResult<AttemptHandle>
    where
        F: FnOnce(&[ScanResult]) -> Option<ScanResult>,
    {
        let results = self.scan().await?;
        let Some(chosen) = select(&results) else {
            self.log.info(format_args!(
                "no network chosen from {} scan results",
                results.len()
            ));
            return Err(AssociationError::Rejected(RejectCode::NetworkNotFound));
        };

        self.connect(&NetworkDescriptor::from_scan_result(&chosen, password), timeout)
            .await
    }

    /// Associate through WPS with the access point `descriptor.bssid`
    ///
    /// Shares the single-attempt slot with [`ConnectionManager::connect`].
    pub async fn connect_wps(
        &self,
        descriptor: &WpsDescriptor,
        timeout: Duration,
    ) -> AssociationResult<AttemptHandle> {
        let request = AssociationRequestBuilder::build_wps(descriptor)?;
        self.start(request, &format!("WPS {}", descriptor.bssid), timeout)
            .await
    }

    /// [`ConnectionManager::connect_wps`] with the configured WPS timeout
    pub async fn connect_wps_with_default_timeout(
        &self,
        descriptor: &WpsDescriptor,
    ) -> AssociationResult<AttemptHandle> {
        self.connect_wps(descriptor, self.config.wps_timeout).await
    }

    /// Access points currently in range
    pub async fn scan(&self) -> AssociationResult<Vec<ScanResult>> {
        let results = self.backend.scan().await?;
        self.log
            .debug(format_args!("scan found {} access points", results.len()));
        Ok(results)
    }

    async fn start(
        &self,
        request: PlatformRequest,
        label: &str,
        timeout: Duration,
    ) -> AssociationResult<AttemptHandle> {
        if timeout.is_zero() {
            return Err(AssociationError::InvalidDescriptor(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let mut live = self.live.lock().await;
        if let Some(previous) = live.take() {
            if !previous.is_finished() {
                match self.config.concurrency {
                    ConcurrencyPolicy::Reject => {
                        self.log.debug(format_args!(
                            "[{}] still running, refusing new request for {}",
                            previous.id(),
                            label
                        ));
                        *live = Some(previous);
                        return Err(AssociationError::InProgress);
                    }
                    ConcurrencyPolicy::Supersede => {
                        self.log.info(format_args!(
                            "[{}] superseded by request for {}",
                            previous.id(),
                            label
                        ));
                        previous.cancel(FailureReason::Superseded).await;
                    }
                }
            }
        }

        let (handle, attempt) = attempt::spawn(
            self.backend.clone(),
            AttemptPlan {
                request,
                timeout,
                validation: self.config.validation,
                log: self.log.clone(),
            },
        );
        self.log
            .debug(format_args!("[{}] started for {}", handle.id(), label));
        *live = Some(attempt);

        Ok(handle)
    }

    /// Cancel the running attempt, if any
    ///
    /// Returns whether an attempt was running. Its handle resolves with
    /// `Cancelled` before this returns.
    pub async fn cancel(&self) -> bool {
        let mut live = self.live.lock().await;
        match live.take() {
            Some(attempt) if !attempt.is_finished() => {
                self.log
                    .info(format_args!("[{}] cancelled by caller", attempt.id()));
                attempt.cancel(FailureReason::Cancelled).await;
                true
            }
            finished => {
                *live = finished;
                false
            }
        }
    }

    /// State of the most recent attempt
    pub async fn attempt_state(&self) -> Option<AssociationState> {
        self.live.lock().await.as_ref().map(LiveAttempt::state)
    }

    /// Drop the link to `ssid`
    ///
    /// Fails with `NotConnected` without touching the platform if `ssid` is
    /// not the current link, and with `DisconnectTimeout` if the platform does
    /// not confirm within the configured wait.
    pub async fn disconnect(&self, ssid: &str) -> AssociationResult<()> {
        if !self.is_connected(ssid) {
            return Err(AssociationError::NotConnected(ssid.to_string()));
        }

        let mut events = self.backend.subscribe();
        self.backend.request_disconnect(ssid).await?;

        let confirmed = async {
            loop {
                if !self.is_connected(ssid) {
                    return Ok(());
                }
                match events.recv().await {
                    Ok(PlatformEvent::LinkDown) => return Ok(()),
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return Err(AssociationError::PlatformUnavailable),
                }
            }
        };

        match tokio::time::timeout(self.config.disconnect_timeout, confirmed).await {
            Ok(result) => {
                if result.is_ok() {
                    self.log.info(format_args!("disconnected from {}", ssid));
                }
                result
            }
            Err(_) => {
                self.log.warn(format_args!(
                    "disconnect from {} not confirmed within {:?}",
                    ssid, self.config.disconnect_timeout
                ));
                Err(AssociationError::DisconnectTimeout)
            }
        }
    }

    /// Disconnect from `ssid` if linked, then delete its stored profile
    pub async fn remove(&self, ssid: &str) -> AssociationResult<()> {
        if self.is_connected(ssid) {
            self.disconnect(ssid).await?;
        }

        match self.backend.remove_profile(ssid).await {
            Ok(()) => {
                self.log.info(format_args!("removed profile {}", ssid));
                Ok(())
            }
            Err(PlatformError::ProfileDenied(_) | PlatformError::ProfileNotFound(_)) => {
                Err(AssociationError::RemoveDenied(ssid.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the current link is `ssid`; never blocks
    pub fn is_connected(&self, ssid: &str) -> bool {
        self.backend.current_link().as_deref() == Some(ssid)
    }

    /// Whether any link is up
    pub fn is_wifi_connected(&self) -> bool {
        self.backend.current_link().is_some()
    }

    /// SSID of the current link, if any
    pub fn current_link(&self) -> Option<String> {
        self.backend.current_link()
    }

    pub fn link_status(&self) -> LinkStatus {
        let ssid = self.current_link();
        LinkStatus {
            connected: ssid.is_some(),
            ssid,
        }
    }

    /// Probe the configured internet host within `timeout`
    pub async fn check_internet_connection(&self, timeout: Duration) -> bool {
        self.probe
            .probe_detached(self.config.probe_target.clone(), timeout)
            .await
    }
}
