//! wifi-ctrl backend implementation

use std::{sync::Arc, time::Duration};

use tokio::{
    process::Command,
    sync::{Mutex, broadcast, watch},
};
use tracing::{debug, error, info, warn};
use wifi_ctrl::sta::{Broadcast, BroadcastReceiver, RequestClient, WifiSetup};

use crate::{
    backend::WifiBackend,
    core::{
        error::{PlatformError, PlatformResult},
        probe::{ConnectivityProbe, DEFAULT_PROBE_TIMEOUT, ProbeTarget},
        request_builder::{Credential, PlatformRequest, SsidTarget, WpsMethod},
        types::{AttemptId, PlatformEvent, RejectCode, ScanResult, SecurityType},
    },
};

const EVENT_CAPACITY: usize = 64;
const IP_POLL_INTERVAL: Duration = Duration::from_millis(200);
const IP_POLL_RETRIES: usize = 30; // 30 * 200ms = 6 seconds

/// wpa_supplicant backend built on the `wifi-ctrl` station client
///
/// A pump task translates wpa_supplicant broadcasts into [`PlatformEvent`]s
/// and keeps the cached link state current. `Validated` is emitted once the
/// interface holds an IPv4 address (and, if configured, a probe succeeds).
pub struct WifiCtrlBackend {
    client: Arc<RequestClient>,
    broadcast_receiver: BroadcastReceiver,
    events: broadcast::Sender<PlatformEvent>,
    link: Arc<watch::Sender<Option<String>>>,
    pending: Mutex<PendingConfig>,
}

impl WifiCtrlBackend {
    pub async fn new(interface: String, validation_probe: Option<ProbeTarget>) -> PlatformResult<Self> {
        let path = format!("/var/run/wpa_supplicant/{}", interface);
        let mut setup =
            WifiSetup::new().map_err(|e| PlatformError::WpaSupplicantError(e.to_string()))?;
        setup.set_socket_path(path);

        let client = Arc::new(setup.get_request_client());
        let broadcast_receiver = setup.get_broadcast_receiver();
        let station = setup.complete();

        // Spawn the station runtime
        tokio::spawn(async move {
            if let Err(e) = station.run().await {
                error!("WifiStation runtime error: {}", e);
            }
        });

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (link, _) = watch::channel(None);
        let link = Arc::new(link);

        match current_ssid(&client).await {
            Ok(ssid) => {
                debug!("Initial link on {}: {:?}", interface, ssid);
                link.send_replace(ssid);
            }
            Err(e) => warn!("Could not read initial link state: {}", e),
        }

        tokio::spawn(pump(
            Pump {
                interface,
                client: client.clone(),
                events: events.clone(),
                link: link.clone(),
                validation_probe,
            },
            broadcast_receiver.resubscribe(),
        ));

        Ok(Self {
            client,
            broadcast_receiver,
            events,
            link,
            pending: Mutex::new(PendingConfig::default()),
        })
    }

    /// Send a raw control command, treating a `FAIL` reply as an error
    async fn command(&self, command: String) -> PlatformResult<String> {
        let reply = self.client.send_custom(command.clone()).await.map_err(|e| {
            PlatformError::WpaSupplicantError(format!("{} failed: {}", command, e))
        })?;

        if reply.trim() == "FAIL" {
            return Err(PlatformError::WpaSupplicantError(format!(
                "{} rejected",
                command
            )));
        }
        Ok(reply)
    }

    async fn network_ids(&self, ssid: &str) -> PlatformResult<Vec<usize>> {
        let listing = self.command("LIST_NETWORKS".to_string()).await?;
        Ok(parse_network_list(&listing)
            .into_iter()
            .filter(|(_, name)| name == ssid)
            .map(|(id, _)| id)
            .collect())
    }

    /// Resolve the target to a concrete SSID, scanning for prefix targets
    async fn resolve(&self, target: &SsidTarget) -> PlatformResult<String> {
        if let SsidTarget::Exact(ssid) = target {
            return Ok(ssid.clone());
        }

        let results = self.scan().await?;
        let candidates = results
            .iter()
            .map(|res| (res.ssid.as_str(), res.signal));
        match strongest_match(candidates, target) {
            Some(ssid) => {
                debug!("{:?} resolved to {}", target, ssid);
                Ok(ssid.to_string())
            }
            None => Err(PlatformError::Rejected(RejectCode::NetworkNotFound)),
        }
    }

    async fn configure(&self, id: usize, ssid: &str, request: &PlatformRequest) -> PlatformResult<()> {
        self.client
            .set_network_ssid(id, ssid.to_string())
            .await
            .map_err(|e| PlatformError::WpaSupplicantError(format!("Failed to set SSID: {}", e)))?;

        match &request.credential {
            Credential::None => {
                self.command(format!("SET_NETWORK {} key_mgmt NONE", id))
                    .await?;
            }
            Credential::Passphrase(passphrase) => {
                self.client
                    .set_network_psk(id, psk_value(passphrase))
                    .await
                    .map_err(|e| {
                        PlatformError::WpaSupplicantError(format!("Failed to set PSK: {}", e))
                    })?;
            }
            Credential::Eap { password } => {
                self.command(format!("SET_NETWORK {} key_mgmt WPA-EAP", id))
                    .await?;
                self.command(format!("SET_NETWORK {} eap PEAP", id)).await?;
                self.command(format!("SET_NETWORK {} password {}", id, quote(password)))
                    .await?;
            }
            Credential::Wps(_) => {
                return Err(PlatformError::WpaSupplicantError(
                    "WPS does not use a preconfigured network block".to_string(),
                ));
            }
        }

        if request.scan_ssid {
            self.command(format!("SET_NETWORK {} scan_ssid 1", id))
                .await?;
        }
        if let Some(bssid) = &request.bssid {
            self.command(format!("SET_NETWORK {} bssid {}", id, bssid))
                .await?;
        }
        Ok(())
    }

    /// Add, configure and select a network block for `request`
    async fn start_network(
        &self,
        attempt: AttemptId,
        request: &PlatformRequest,
    ) -> PlatformResult<()> {
        let ssid = self.resolve(&request.target).await?;
        debug!("Associating with network: {}", ssid);

        // Replace stale blocks for the same network
        for stale in self.network_ids(&ssid).await? {
            self.command(format!("REMOVE_NETWORK {}", stale)).await?;
        }

        let id = self.client.add_network().await.map_err(|e| {
            PlatformError::WpaSupplicantError(format!("Failed to add network: {}", e))
        })?;
        self.pending.lock().await.record(attempt, Pending::Network(id));

        self.configure(id, &ssid, request).await?;
        self.client.select_network(id).await.map_err(|e| {
            PlatformError::WpaSupplicantError(format!("Failed to select network: {}", e))
        })?;
        Ok(())
    }

    /// Start a WPS exchange with the access point `bssid`
    async fn start_wps(
        &self,
        attempt: AttemptId,
        bssid: &str,
        method: &WpsMethod,
    ) -> PlatformResult<()> {
        // The access point has to be in range
        let in_range = self.scan().await?.iter().any(|res| res.bssid == bssid);
        if !in_range {
            debug!("WPS access point {} not found", bssid);
            return Err(PlatformError::Rejected(RejectCode::NetworkNotFound));
        }

        debug!("Starting WPS with {}", bssid);
        self.command(wps_command(bssid, method)).await?;
        self.pending.lock().await.record(attempt, Pending::Wps);
        Ok(())
    }
}

impl WifiBackend for WifiCtrlBackend {
    async fn scan(&self) -> PlatformResult<Vec<ScanResult>> {
        let results = self
            .client
            .get_scan()
            .await
            .map_err(|e| PlatformError::WpaSupplicantError(format!("Scan failed: {}", e)))?;

        let networks: Vec<ScanResult> = results
            .iter()
            .map(|res| ScanResult {
                ssid: res.name.clone(),
                bssid: res.mac.to_ascii_lowercase(),
                frequency: res.frequency.parse().unwrap_or(0),
                signal: res.signal as i32,
                security: security_from_flags(&res.flags),
                wps: res.flags.contains("[WPS"),
            })
            .collect();

        debug!("Scan complete, found {} networks", networks.len());
        Ok(networks)
    }

    async fn request_association(
        &self,
        attempt: AttemptId,
        request: &PlatformRequest,
    ) -> PlatformResult<()> {
        // Start listening to events BEFORE selecting to avoid race condition
        let mut receiver = self.broadcast_receiver.resubscribe();

        match (&request.credential, &request.bssid) {
            (Credential::Wps(method), Some(bssid)) => {
                self.start_wps(attempt, bssid, method).await?
            }
            (Credential::Wps(_), None) => {
                return Err(PlatformError::WpaSupplicantError(
                    "WPS requires a BSSID".to_string(),
                ));
            }
            _ => self.start_network(attempt, request).await?,
        }

        // The request counts as taken up once wpa_supplicant reports the
        // first decisive outcome; the caller bounds the wait.
        loop {
            match receiver.recv().await {
                Ok(Broadcast::Connected) => {
                    if let Err(e) = self.client.save_config().await {
                        warn!("Failed to save wpa_supplicant config: {}", e);
                    }
                    return Ok(());
                }
                Ok(event) => {
                    if let Some(code) = rejection(&event) {
                        return Err(PlatformError::Rejected(code));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    warn!("Broadcast receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(PlatformError::BackendUnavailable(
                        "Broadcast channel closed".to_string(),
                    ));
                }
            }
        }
    }

    async fn abort_association(&self, attempt: AttemptId) -> PlatformResult<()> {
        let Some(pending) = self.pending.lock().await.take(attempt) else {
            return Ok(());
        };

        debug!("Undoing {:?} for attempt {}", pending, attempt);
        self.command(abort_command(pending)).await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }

    async fn request_disconnect(&self, ssid: &str) -> PlatformResult<()> {
        debug!("Disconnecting from {}", ssid);
        self.command("DISCONNECT".to_string()).await?;
        Ok(())
    }

    async fn remove_profile(&self, ssid: &str) -> PlatformResult<()> {
        let ids = self.network_ids(ssid).await?;
        if ids.is_empty() {
            return Err(PlatformError::ProfileNotFound(ssid.to_string()));
        }

        for id in ids {
            self.command(format!("REMOVE_NETWORK {}", id))
                .await
                .map_err(|_| PlatformError::ProfileDenied(ssid.to_string()))?;
        }
        self.client
            .save_config()
            .await
            .map_err(|e| PlatformError::WpaSupplicantError(format!("Failed to save config: {}", e)))?;

        info!("Removed stored network {}", ssid);
        Ok(())
    }

    fn current_link(&self) -> Option<String> {
        self.link.borrow().clone()
    }
}

struct Pump {
    interface: String,
    client: Arc<RequestClient>,
    events: broadcast::Sender<PlatformEvent>,
    link: Arc<watch::Sender<Option<String>>>,
    validation_probe: Option<ProbeTarget>,
}

/// Translate wpa_supplicant broadcasts into platform events
async fn pump(pump: Pump, mut receiver: BroadcastReceiver) {
    let pump = Arc::new(pump);

    loop {
        let broadcast = match receiver.recv().await {
            Ok(broadcast) => broadcast,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Broadcast receiver lagged by {} events", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                error!("wpa_supplicant broadcast channel closed");
                return;
            }
        };
        debug!("Received broadcast event: {:?}", broadcast);

        match &broadcast {
            Broadcast::Connected => {
                let ssid = match current_ssid(&pump.client).await {
                    Ok(Some(ssid)) => ssid,
                    Ok(None) => {
                        warn!("Connected without an SSID in status");
                        continue;
                    }
                    Err(e) => {
                        warn!("Failed to read status after connect: {}", e);
                        continue;
                    }
                };
                pump.link.send_replace(Some(ssid.clone()));
                let _ = pump.events.send(PlatformEvent::LinkUp { ssid: ssid.clone() });
                tokio::spawn(validate(pump.clone(), ssid));
            }
            Broadcast::Disconnected => {
                if pump.link.send_replace(None).is_some() {
                    let _ = pump.events.send(PlatformEvent::LinkDown);
                }
            }
            other => {
                if let Some(code) = rejection(other) {
                    let _ = pump.events.send(PlatformEvent::RequestRejected { code });
                }
            }
        }
    }
}

/// Emit `Validated` once the link to `ssid` is usable
async fn validate(pump: Arc<Pump>, ssid: String) {
    let mut address = None;
    for _ in 0..IP_POLL_RETRIES {
        address = ip_address(&pump.interface).await;
        if address.is_some() {
            break;
        }
        tokio::time::sleep(IP_POLL_INTERVAL).await;
    }
    let Some(address) = address else {
        warn!("No IPv4 address on {} after connecting to {}", pump.interface, ssid);
        return;
    };
    debug!("Got address {} on {}", address, pump.interface);

    if let Some(target) = &pump.validation_probe {
        if !ConnectivityProbe
            .probe(&target.host, target.port, DEFAULT_PROBE_TIMEOUT)
            .await
        {
            warn!("Link to {} has no internet access", ssid);
            return;
        }
    }

    // The link may have changed while polling
    if pump.link.borrow().as_deref() == Some(ssid.as_str()) {
        let _ = pump.events.send(PlatformEvent::Validated);
    }
}

async fn current_ssid(client: &RequestClient) -> PlatformResult<Option<String>> {
    let status = client
        .get_status()
        .await
        .map_err(|e| PlatformError::WpaSupplicantError(format!("Failed to get status: {}", e)))?;

    let completed = status.get("wpa_state").map(|s| s.as_str()) == Some("COMPLETED");
    Ok(if completed {
        status.get("ssid").cloned()
    } else {
        None
    })
}

/// Get IP address using ip command
async fn ip_address(interface: &str) -> Option<String> {
    let output = Command::new("ip")
        .args(["-4", "addr", "show", interface])
        .output()
        .await
        .ok()?;

    parse_inet_address(&String::from_utf8_lossy(&output.stdout))
}

fn parse_inet_address(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let address = line.trim().strip_prefix("inet ")?;
        let address = address.split_whitespace().next()?;
        address.split('/').next().map(str::to_string)
    })
}

/// What an association attempt configured in wpa_supplicant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Network(usize),
    Wps,
}

/// Configuration owned by the latest attempt that touched wpa_supplicant
#[derive(Debug, Default)]
struct PendingConfig {
    owner: Option<(AttemptId, Pending)>,
}

impl PendingConfig {
    fn record(&mut self, attempt: AttemptId, pending: Pending) {
        self.owner = Some((attempt, pending));
    }

    /// What to undo when `attempt` is aborted
    ///
    /// Only the attempt that made the change may undo it; a failing attempt
    /// that never got that far leaves the previous link alone.
    fn take(&mut self, attempt: AttemptId) -> Option<Pending> {
        match self.owner {
            Some((owner, pending)) if owner == attempt => {
                self.owner = None;
                Some(pending)
            }
            _ => None,
        }
    }
}

fn abort_command(pending: Pending) -> String {
    match pending {
        Pending::Network(id) => format!("REMOVE_NETWORK {}", id),
        Pending::Wps => "WPS_CANCEL".to_string(),
    }
}

fn wps_command(bssid: &str, method: &WpsMethod) -> String {
    match method {
        WpsMethod::PushButton => format!("WPS_PBC {}", bssid),
        WpsMethod::Pin(pin) => format!("WPS_PIN {} {}", bssid, pin),
    }
}

/// Security type advertised in a scan result's flags column
fn security_from_flags(flags: &str) -> SecurityType {
    if flags.contains("EAP") {
        SecurityType::Eap
    } else if ["PSK", "SAE", "WEP"].iter().any(|kind| flags.contains(kind)) {
        SecurityType::WpaPsk
    } else {
        SecurityType::Open
    }
}

fn rejection(broadcast: &Broadcast) -> Option<RejectCode> {
    match broadcast {
        Broadcast::WrongPsk => Some(RejectCode::AuthenticationFailed),
        Broadcast::NetworkNotFound => Some(RejectCode::NetworkNotFound),
        _ => None,
    }
}

/// Strongest scanned network satisfying `target`
fn strongest_match<'a>(
    candidates: impl Iterator<Item = (&'a str, i32)>,
    target: &SsidTarget,
) -> Option<&'a str> {
    candidates
        .filter(|(name, _)| target.matches(name))
        .max_by_key(|(_, signal)| *signal)
        .map(|(name, _)| name)
}

/// Parse `LIST_NETWORKS` output into `(id, ssid)` pairs
fn parse_network_list(listing: &str) -> Vec<(usize, String)> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split('\t');
            let id = columns.next()?.trim().parse().ok()?;
            let ssid = decode_ssid(columns.next()?);
            Some((id, ssid))
        })
        .collect()
}

/// Undo wpa_supplicant's `\xNN` escaping of non-printable SSID bytes
fn decode_ssid(raw: &str) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find("\\x") {
        bytes.extend_from_slice(&rest.as_bytes()[..pos]);
        let escaped = rest.get(pos + 2..pos + 4).and_then(|h| hex::decode(h).ok());
        match escaped {
            Some(decoded) => {
                bytes.extend_from_slice(&decoded);
                rest = &rest[pos + 4..];
            }
            None => {
                bytes.extend_from_slice(b"\\x");
                rest = &rest[pos + 2..];
            }
        }
    }
    bytes.extend_from_slice(rest.as_bytes());

    String::from_utf8_lossy(&bytes).into_owned()
}

/// A 64 digit hex string is a raw PSK; anything else is a quoted passphrase
fn psk_value(passphrase: &str) -> String {
    if passphrase.len() == 64 && hex::decode(passphrase).is_ok() {
        passphrase.to_string()
    } else {
        quote(passphrase)
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value)
}
