//! JSON-RPC request handler for Unix socket transport

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tracing::debug;

use crate::{
    backend::WifiBackend,
    core::{error::AssociationError, manager::ConnectionManager},
    protocol::{
        AckResponse, CancelResponse, CheckInternetParams, ConnectParams, ConnectResponse,
        ConnectWpsParams, InternetResponse, IsConnectedResponse, JsonRpcError, JsonRpcRequest,
        JsonRpcResponse, Request, RequestId, Response, ScanResponse, SsidParams, StatusResponse,
    },
};

/// JSON-RPC request handler
pub struct RequestHandler<B: WifiBackend> {
    manager: Arc<ConnectionManager<B>>,
    probe_timeout: Duration,
}

impl<B: WifiBackend> RequestHandler<B> {
    /// Create a new request handler
    ///
    /// `probe_timeout` applies to `check_internet` requests without a timeout.
    pub fn new(manager: Arc<ConnectionManager<B>>, probe_timeout: Duration) -> Self {
        Self {
            manager,
            probe_timeout,
        }
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id;
        let result = match request.request {
            Request::Connect(params) => self.handle_connect(params).await,
            Request::ConnectWps(params) => self.handle_connect_wps(params).await,
            Request::Scan => self.handle_scan().await,
            Request::Cancel => self.handle_cancel().await,
            Request::Disconnect(params) => self.handle_disconnect(params).await,
            Request::Remove(params) => self.handle_remove(params).await,
            Request::IsConnected(params) => Ok(self.handle_is_connected(params)),
            Request::Status => Ok(self.handle_status().await),
            Request::CheckInternet(params) => Ok(self.handle_check_internet(params).await),
        };

        respond(result, id)
    }

    async fn handle_connect(&self, params: ConnectParams) -> Result<Response, AssociationError> {
        let handle = match params.timeout() {
            Some(timeout) => self.manager.connect(&params.network, timeout).await?,
            None => {
                self.manager
                    .connect_with_default_timeout(&params.network)
                    .await?
            }
        };
        debug!("Waiting for attempt {}", handle.id());
        let association = handle.outcome().await?;

        Ok(Response::Connect(ConnectResponse::ok(association)))
    }

    async fn handle_connect_wps(
        &self,
        params: ConnectWpsParams,
    ) -> Result<Response, AssociationError> {
        let handle = match params.timeout() {
            Some(timeout) => self.manager.connect_wps(&params.wps, timeout).await?,
            None => {
                self.manager
                    .connect_wps_with_default_timeout(&params.wps)
                    .await?
            }
        };
        debug!("Waiting for WPS attempt {}", handle.id());
        let association = handle.outcome().await?;

        Ok(Response::Connect(ConnectResponse::ok(association)))
    }

    async fn handle_scan(&self) -> Result<Response, AssociationError> {
        let networks = self.manager.scan().await?;
        Ok(Response::Scan(ScanResponse::ok(networks)))
    }

    async fn handle_cancel(&self) -> Result<Response, AssociationError> {
        let cancelled = self.manager.cancel().await;
        Ok(Response::Cancel(CancelResponse::ok(cancelled)))
    }

    async fn handle_disconnect(&self, params: SsidParams) -> Result<Response, AssociationError> {
        self.manager.disconnect(&params.ssid).await?;
        Ok(Response::Ack(AckResponse::ok()))
    }

    async fn handle_remove(&self, params: SsidParams) -> Result<Response, AssociationError> {
        self.manager.remove(&params.ssid).await?;
        Ok(Response::Ack(AckResponse::ok()))
    }

    fn handle_is_connected(&self, params: SsidParams) -> Response {
        Response::IsConnected(IsConnectedResponse::ok(
            self.manager.is_connected(&params.ssid),
        ))
    }

    async fn handle_status(&self) -> Response {
        Response::Status(StatusResponse::ok(
            self.manager.link_status(),
            self.manager.attempt_state().await,
        ))
    }

    async fn handle_check_internet(&self, params: CheckInternetParams) -> Response {
        let timeout = params.timeout().unwrap_or(self.probe_timeout);
        let reachable = self.manager.check_internet_connection(timeout).await;
        Response::Internet(InternetResponse::ok(reachable))
    }
}

/// Error reply for a line that is JSON but not a valid request
///
/// Lines that are not JSON at all, or carry no usable `id`, get no reply.
pub fn malformed_response(line: &str, err: &serde_json::Error) -> Option<JsonRpcResponse> {
    let value: Value = serde_json::from_str(line).ok()?;
    let id: RequestId = serde_json::from_value(value.get("id")?.clone()).ok()?;

    let error = match value.get("method").and_then(Value::as_str) {
        None => JsonRpcError::invalid_request("Missing method"),
        Some(method) if !Request::METHODS.contains(&method) => JsonRpcError::method_not_found(),
        Some(_) => JsonRpcError::invalid_params(err.to_string()),
    };
    Some(JsonRpcResponse::error(error, id))
}

fn respond(result: Result<Response, AssociationError>, id: RequestId) -> JsonRpcResponse {
    match result {
        Ok(response) => JsonRpcResponse::success(response, id),
        Err(e) => {
            debug!("Request {:?} failed: {}", id, e);
            JsonRpcResponse::error(JsonRpcError::from(&e), id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::MockWifiBackend,
        core::{
            logging::LogConfig,
            manager::ManagerConfig,
            types::{AssociationState, NetworkDescriptor, PlatformEvent, ScanResult, SecurityType},
        },
    };
    use pretty_assertions::assert_eq;

    fn handler(backend: &Arc<MockWifiBackend>) -> RequestHandler<MockWifiBackend> {
        let manager = ConnectionManager::new(
            backend.clone(),
            ManagerConfig::default(),
            LogConfig::disabled(),
        );
        RequestHandler::new(Arc::new(manager), Duration::from_millis(200))
    }

    fn connect(descriptor: NetworkDescriptor, timeout_ms: u64) -> JsonRpcRequest {
        JsonRpcRequest::new(
            Request::Connect(ConnectParams {
                network: descriptor,
                timeout_ms: Some(timeout_ms),
            }),
            RequestId::Number(1),
        )
    }

    fn error_code(response: &JsonRpcResponse) -> Option<i32> {
        response.error.as_ref().map(|e| e.code)
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_connect_success() {
        let backend = Arc::new(MockWifiBackend::new());
        backend
            .set_events_on_request(vec![
                PlatformEvent::LinkUp {
                    ssid: "Home".to_string(),
                },
                PlatformEvent::Validated,
            ])
            .await;
        let handler = handler(&backend);

        let response = handler
            .handle_request(connect(NetworkDescriptor::wpa_psk("Home", "x"), 15_000))
            .await;

        assert!(response.error.is_none());
        let Some(Response::Connect(result)) = response.result else {
            panic!("Expected connect response, got {:?}", response.result);
        };
        assert_eq!(result.association.ssid, "Home");
        assert_eq!(response.id, RequestId::Number(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_connect_timeout() {
        let backend = Arc::new(MockWifiBackend::new());
        let handler = handler(&backend);

        let response = handler
            .handle_request(connect(NetworkDescriptor::open("Lobby"), 1_000))
            .await;

        assert!(response.result.is_none());
        assert_eq!(error_code(&response), Some(JsonRpcError::TIMEOUT));
    }

    #[tokio::test]
    async fn test_handle_connect_invalid_descriptor() {
        let backend = Arc::new(MockWifiBackend::new());
        let handler = handler(&backend);

        let response = handler
            .handle_request(connect(NetworkDescriptor::open(""), 1_000))
            .await;

        assert_eq!(error_code(&response), Some(JsonRpcError::INVALID_DESCRIPTOR));
        assert!(backend.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_handle_disconnect_not_connected() {
        let backend = Arc::new(MockWifiBackend::new());
        let handler = handler(&backend);

        let request = JsonRpcRequest::new(
            Request::Disconnect(SsidParams {
                ssid: "Home".to_string(),
            }),
            RequestId::String("d".to_string()),
        );
        let response = handler.handle_request(request).await;

        assert_eq!(error_code(&response), Some(JsonRpcError::NOT_CONNECTED));
        assert_eq!(response.id, RequestId::String("d".to_string()));
    }

    #[tokio::test]
    async fn test_handle_remove() {
        let backend = Arc::new(MockWifiBackend::new());
        backend.add_profile("Home").await;
        backend.deny_profile("Neighbour").await;
        let handler = handler(&backend);

        let remove = |ssid: &str| {
            JsonRpcRequest::new(
                Request::Remove(SsidParams {
                    ssid: ssid.to_string(),
                }),
                RequestId::Number(3),
            )
        };

        let response = handler.handle_request(remove("Home")).await;
        assert_eq!(response.result, Some(Response::Ack(AckResponse::ok())));

        let response = handler.handle_request(remove("Neighbour")).await;
        assert_eq!(error_code(&response), Some(JsonRpcError::REMOVE_DENIED));
    }

    #[tokio::test]
    async fn test_handle_is_connected_and_status() {
        let backend = Arc::new(MockWifiBackend::new());
        backend.set_link(Some("Home"));
        let handler = handler(&backend);

        let request = JsonRpcRequest::new(
            Request::IsConnected(SsidParams {
                ssid: "Home".to_string(),
            }),
            RequestId::Number(4),
        );
        let response = handler.handle_request(request).await;
        assert_eq!(
            response.result,
            Some(Response::IsConnected(IsConnectedResponse::ok(true)))
        );

        let response = handler
            .handle_request(JsonRpcRequest::new(Request::Status, RequestId::Number(5)))
            .await;
        let Some(Response::Status(status)) = response.result else {
            panic!("Expected status response, got {:?}", response.result);
        };
        assert!(status.link.connected);
        assert_eq!(status.link.ssid.as_deref(), Some("Home"));
        assert_eq!(status.attempt, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_cancel_running_connect() {
        let backend = Arc::new(MockWifiBackend::new());
        let handler = Arc::new(handler(&backend));

        let connecting = handler.clone();
        let pending = tokio::spawn(async move {
            connecting
                .handle_request(connect(NetworkDescriptor::open("Lobby"), 15_000))
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let response = handler
            .handle_request(JsonRpcRequest::new(Request::Cancel, RequestId::Number(6)))
            .await;
        assert_eq!(
            response.result,
            Some(Response::Cancel(CancelResponse::ok(true)))
        );

        let response = pending.await.unwrap();
        assert_eq!(error_code(&response), Some(JsonRpcError::CANCELLED));

        let response = handler
            .handle_request(JsonRpcRequest::new(Request::Status, RequestId::Number(7)))
            .await;
        let Some(Response::Status(status)) = response.result else {
            panic!("Expected status response, got {:?}", response.result);
        };
        assert!(matches!(status.attempt, Some(AssociationState::Failed(_))));
    }

    #[tokio::test]
    async fn test_handle_scan() {
        let backend = Arc::new(MockWifiBackend::new());
        let lobby = ScanResult {
            ssid: "Lobby".to_string(),
            bssid: "aa:bb:cc:dd:ee:ff".to_string(),
            frequency: 5180,
            signal: -52,
            security: SecurityType::Open,
            wps: true,
        };
        backend.set_scan_results(vec![lobby.clone()]).await;
        let handler = handler(&backend);

        let response = handler
            .handle_request(JsonRpcRequest::new(Request::Scan, RequestId::Number(9)))
            .await;

        assert_eq!(
            response.result,
            Some(Response::Scan(ScanResponse::ok(vec![lobby])))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_connect_wps() {
        let backend = Arc::new(MockWifiBackend::new());
        backend
            .set_events_on_request(vec![
                PlatformEvent::LinkUp {
                    ssid: "Printer".to_string(),
                },
                PlatformEvent::Validated,
            ])
            .await;
        let handler = handler(&backend);

        let request: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"connect_wps","params":{"bssid":"aa:bb:cc:dd:ee:ff"},"id":10}"#,
        )
        .unwrap();
        let response = handler.handle_request(request).await;

        let Some(Response::Connect(result)) = response.result else {
            panic!("Expected connect response, got {:?}", response.result);
        };
        assert_eq!(result.association.ssid, "Printer");

        let request: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"connect_wps","params":{"bssid":"aa:bb:cc:dd:ee:ff","pin":"1"},"id":11}"#,
        )
        .unwrap();
        let response = handler.handle_request(request).await;
        assert_eq!(error_code(&response), Some(JsonRpcError::INVALID_DESCRIPTOR));
    }

    fn malformed(line: &str) -> Option<JsonRpcResponse> {
        let err = serde_json::from_str::<JsonRpcRequest>(line).unwrap_err();
        malformed_response(line, &err)
    }

    #[test]
    fn test_malformed_requests() {
        assert!(malformed("not json").is_none());
        assert!(malformed(r#"{"method":"status"}"#).is_none());

        let response = malformed(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert_eq!(error_code(&response), Some(JsonRpcError::INVALID_REQUEST));

        let response = malformed(r#"{"jsonrpc":"2.0","method":"enable_wifi","id":2}"#).unwrap();
        assert_eq!(error_code(&response), Some(JsonRpcError::METHOD_NOT_FOUND));
        assert_eq!(response.id, RequestId::Number(2));

        let response =
            malformed(r#"{"jsonrpc":"2.0","method":"disconnect","params":{},"id":"x"}"#).unwrap();
        assert_eq!(error_code(&response), Some(JsonRpcError::INVALID_PARAMS));
        assert_eq!(response.id, RequestId::String("x".to_string()));
    }

    #[tokio::test]
    async fn test_handle_check_internet_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let backend = Arc::new(MockWifiBackend::new());
        let manager = ConnectionManager::new(
            backend,
            ManagerConfig {
                probe_target: crate::core::probe::ProbeTarget {
                    host: "127.0.0.1".to_string(),
                    port,
                },
                ..ManagerConfig::default()
            },
            LogConfig::disabled(),
        );
        let handler = RequestHandler::new(Arc::new(manager), Duration::from_millis(200));

        let request = JsonRpcRequest::new(
            Request::CheckInternet(CheckInternetParams::default()),
            RequestId::Number(8),
        );
        let response = handler.handle_request(request).await;

        assert_eq!(
            response.result,
            Some(Response::Internet(InternetResponse::ok(false)))
        );
    }
}
