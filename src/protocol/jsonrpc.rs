//! JSON-RPC 2.0 message envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    core::error::AssociationError,
    protocol::{request::Request, response::Response},
};

/// JSON-RPC 2.0 request wrapper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(flatten)]
    pub request: Request,
    pub id: RequestId,
}

/// JSON-RPC 2.0 response wrapper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: RequestId,
}

/// Request ID (number or string)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard JSON-RPC error codes
#[allow(dead_code)]
impl JsonRpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Custom error codes, one per association error kind
    pub const INVALID_DESCRIPTOR: i32 = -32001;
    pub const IN_PROGRESS: i32 = -32002;
    pub const REJECTED: i32 = -32003;
    pub const LINK_LOST: i32 = -32004;
    pub const TIMEOUT: i32 = -32005;
    pub const SUPERSEDED: i32 = -32006;
    pub const CANCELLED: i32 = -32007;
    pub const NOT_CONNECTED: i32 = -32008;
    pub const DISCONNECT_TIMEOUT: i32 = -32009;
    pub const REMOVE_DENIED: i32 = -32010;
    pub const PLATFORM_UNAVAILABLE: i32 = -32011;
    pub const BACKEND_ERROR: i32 = -32012;

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_REQUEST,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found() -> Self {
        Self {
            code: Self::METHOD_NOT_FOUND,
            message: "Method not found".to_string(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_PARAMS,
            message: message.into(),
            data: None,
        }
    }
}

impl From<&AssociationError> for JsonRpcError {
    fn from(err: &AssociationError) -> Self {
        let code = match err {
            AssociationError::InvalidDescriptor(_) => Self::INVALID_DESCRIPTOR,
            AssociationError::AlreadyRunning | AssociationError::InProgress => Self::IN_PROGRESS,
            AssociationError::Rejected(_) => Self::REJECTED,
            AssociationError::LinkLost => Self::LINK_LOST,
            AssociationError::TimedOut => Self::TIMEOUT,
            AssociationError::Superseded => Self::SUPERSEDED,
            AssociationError::Cancelled => Self::CANCELLED,
            AssociationError::NotConnected(_) => Self::NOT_CONNECTED,
            AssociationError::DisconnectTimeout => Self::DISCONNECT_TIMEOUT,
            AssociationError::RemoveDenied(_) => Self::REMOVE_DENIED,
            AssociationError::PlatformUnavailable => Self::PLATFORM_UNAVAILABLE,
            AssociationError::Platform(_) => Self::BACKEND_ERROR,
        };
        let data = match err {
            AssociationError::Rejected(reason) => Some(Value::from(reason.code())),
            _ => None,
        };

        Self {
            code,
            message: err.to_string(),
            data,
        }
    }
}

impl JsonRpcRequest {
    pub fn new(request: Request, id: RequestId) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            request,
            id,
        }
    }
}

impl JsonRpcResponse {
    pub fn success(result: Response, id: RequestId) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: JsonRpcError, id: RequestId) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}
