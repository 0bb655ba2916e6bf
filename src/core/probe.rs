//! Internet reachability probe

use std::time::Duration;

use tokio::{net::TcpStream, time::timeout};
use tracing::debug;

/// Default probe target (public DNS resolver)
pub const DEFAULT_PROBE_HOST: &str = "8.8.8.8";
pub const DEFAULT_PROBE_PORT: u16 = 53;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Host and port a probe connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl Default for ProbeTarget {
    fn default() -> Self {
        Self {
            host: DEFAULT_PROBE_HOST.to_string(),
            port: DEFAULT_PROBE_PORT,
        }
    }
}

/// Classifies "has internet" by completing a TCP handshake
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectivityProbe;

impl ConnectivityProbe {
    /// Try to open a TCP connection to `host:port` within `budget`
    ///
    /// Name resolution counts against the budget. Every failure (resolution,
    /// refusal, unreachable, timeout) yields `false`.
    pub async fn probe(&self, host: &str, port: u16, budget: Duration) -> bool {
        // (host, port) keeps IPv6 literals such as "::1" intact
        match timeout(budget, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => {
                debug!("Probe to {} port {} succeeded", host, port);
                true
            }
            Ok(Err(e)) => {
                debug!("Probe to {} port {} failed: {}", host, port, e);
                false
            }
            Err(_) => {
                debug!(
                    "Probe to {} port {} timed out after {:?}",
                    host, port, budget
                );
                false
            }
        }
    }

    /// Probe `target` on a task of its own so the caller never waits on I/O
    pub async fn probe_detached(&self, target: ProbeTarget, budget: Duration) -> bool {
        let probe = *self;
        tokio::spawn(async move { probe.probe(&target.host, target.port, budget).await })
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_reachable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let reachable = ConnectivityProbe
            .probe("127.0.0.1", port, Duration::from_millis(500))
            .await;
        assert!(reachable);
    }

    #[tokio::test]
    async fn test_probe_ipv6_literal() {
        // Hosts without IPv6 loopback cannot run this
        let Ok(listener) = TcpListener::bind("[::1]:0").await else {
            return;
        };
        let port = listener.local_addr().unwrap().port();

        let reachable = ConnectivityProbe
            .probe("::1", port, Duration::from_millis(500))
            .await;
        assert!(reachable);
    }

    #[tokio::test]
    async fn test_probe_refused_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let reachable = ConnectivityProbe
            .probe("127.0.0.1", port, Duration::from_millis(500))
            .await;
        assert!(!reachable);
    }

    #[tokio::test]
    async fn test_probe_unresolvable_host() {
        let reachable = ConnectivityProbe
            .probe("host.invalid", 53, Duration::from_millis(500))
            .await;
        assert!(!reachable);
    }

    #[tokio::test]
    async fn test_probe_unreachable_host_respects_budget() {
        let budget = Duration::from_millis(300);
        let started = Instant::now();

        // TEST-NET-1, never routed
        let reachable = ConnectivityProbe.probe("192.0.2.1", 53, budget).await;

        assert!(!reachable);
        assert!(started.elapsed() < budget + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_probe_detached() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = ProbeTarget {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        };

        assert!(
            ConnectivityProbe
                .probe_detached(target, Duration::from_millis(500))
                .await
        );
    }
}
