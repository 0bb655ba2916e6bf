//! Unix socket server implementation

use std::{fs::Permissions, os::unix::fs::PermissionsExt, path::Path, sync::Arc};

use listenfd::ListenFd;
use tokio::{
    fs,
    net::{UnixListener, UnixStream},
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::WifiBackend,
    core::error::TransportResult,
    protocol::JsonRpcRequest,
    transport::unix_socket::{
        handler::{RequestHandler, malformed_response},
        session::{SessionReader, UnixSocketSession},
    },
};

/// Unix socket server
pub struct UnixSocketServer<B: WifiBackend> {
    socket_path: String,
    socket_mode: u32,
    handler: Arc<RequestHandler<B>>,
}

impl<B: WifiBackend> UnixSocketServer<B> {
    /// Create a new Unix socket server
    pub fn new(socket_path: String, socket_mode: u32, handler: RequestHandler<B>) -> Self {
        Self {
            socket_path,
            socket_mode,
            handler: Arc::new(handler),
        }
    }

    /// Take a socket-activated listener if one was passed, otherwise bind
    /// `socket_path` with the configured file mode
    pub async fn bind(&self) -> TransportResult<UnixListener> {
        if let Some(listener) = ListenFd::from_env().take_unix_listener(0)? {
            listener.set_nonblocking(true)?;
            info!("Using socket-activated listener");
            return Ok(UnixListener::from_std(listener)?);
        }

        // Remove existing socket file if it exists
        if Path::new(&self.socket_path).exists() {
            fs::remove_file(&self.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        fs::set_permissions(&self.socket_path, Permissions::from_mode(self.socket_mode)).await?;
        info!(
            "Unix socket server listening on {} (mode {:o})",
            self.socket_path, self.socket_mode
        );

        Ok(listener)
    }

    /// Accept clients on `listener`
    pub async fn serve(&self, listener: UnixListener) -> TransportResult<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, handler).await {
                            error!("Error handling client: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(
        stream: UnixStream,
        handler: Arc<RequestHandler<B>>,
    ) -> TransportResult<()> {
        let (read_half, write_half) = stream.into_split();
        let session = UnixSocketSession::new(write_half);
        let mut reader = SessionReader::new(read_half);

        info!("New client connected: {}", session.id());

        while let Some(line) = reader.read_line().await? {
            if line.is_empty() {
                continue;
            }

            let request = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Invalid JSON-RPC request: {}", e);
                    if let Some(response) = malformed_response(&line, &e) {
                        session.send_response(&response).await?;
                    }
                    continue;
                }
            };

            // Requests run concurrently so a pending connect can be cancelled
            // from the same session.
            let handler = handler.clone();
            let session = session.clone();
            tokio::spawn(async move {
                let response = handler.handle_request(request).await;
                if let Err(e) = session.send_response(&response).await {
                    debug!("Error sending response to {}: {}", session.id(), e);
                }
            });
        }

        info!("Client disconnected: {}", session.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::MockWifiBackend,
        core::{
            logging::LogConfig,
            manager::{ConnectionManager, ManagerConfig},
            types::PlatformEvent,
        },
        protocol::{JsonRpcResponse, Request, RequestId, SsidParams},
    };
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn server(backend: Arc<MockWifiBackend>, socket_path: &Path) -> UnixSocketServer<MockWifiBackend> {
        let manager = ConnectionManager::new(backend, ManagerConfig::default(), LogConfig::disabled());
        UnixSocketServer::new(
            socket_path.to_str().unwrap().to_string(),
            0o600,
            RequestHandler::new(Arc::new(manager), Duration::from_millis(200)),
        )
    }

    async fn call(client: &mut BufReader<UnixStream>, request: &JsonRpcRequest) -> JsonRpcResponse {
        let json = serde_json::to_string(request).unwrap();
        client.get_mut().write_all(json.as_bytes()).await.unwrap();
        client.get_mut().write_all(b"\n").await.unwrap();
        client.get_mut().flush().await.unwrap();

        let mut line = String::new();
        client.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_bind_sets_socket_mode() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        // Stale socket file from a previous run
        std::fs::write(&socket_path, b"").unwrap();

        let server = server(Arc::new(MockWifiBackend::new()), &socket_path);
        let _listener = server.bind().await.unwrap();

        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_client_connect_and_query() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let backend = Arc::new(MockWifiBackend::new());
        backend
            .set_events_on_request(vec![
                PlatformEvent::LinkUp {
                    ssid: "Home".to_string(),
                },
                PlatformEvent::Validated,
            ])
            .await;

        let server = server(backend, &socket_path);
        let listener = server.bind().await.unwrap();
        tokio::spawn(async move {
            server.serve(listener).await.ok();
        });

        let mut client = BufReader::new(UnixStream::connect(&socket_path).await.unwrap());

        // Garbage is skipped without closing the session
        client.get_mut().write_all(b"not json\n").await.unwrap();

        // Unknown methods are answered with an error
        client
            .get_mut()
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"enable_wifi\",\"id\":0}\n")
            .await
            .unwrap();
        let mut line = String::new();
        client.read_line(&mut line).await.unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.id, RequestId::Number(0));
        assert_eq!(
            response.error.map(|e| e.code),
            Some(crate::protocol::JsonRpcError::METHOD_NOT_FOUND)
        );

        let request: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"connect","params":{"ssid":"Home","security":"wpa_psk","password":"x","timeout_ms":5000},"id":1}"#,
        )
        .unwrap();
        let response = call(&mut client, &request).await;
        assert!(response.error.is_none(), "{:?}", response.error);
        assert_eq!(response.id, RequestId::Number(1));

        let request = JsonRpcRequest::new(
            Request::IsConnected(SsidParams {
                ssid: "Home".to_string(),
            }),
            RequestId::Number(2),
        );
        let response = call(&mut client, &request).await;
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""connected":true"#));
    }
}
