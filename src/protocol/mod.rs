//! Protocol message definitions

pub mod jsonrpc;
pub mod request;
pub mod response;

pub use {
    jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId},
    request::{CheckInternetParams, ConnectParams, ConnectWpsParams, Request, SsidParams},
    response::{
        AckResponse, CancelResponse, ConnectResponse, InternetResponse, IsConnectedResponse,
        Response, ScanResponse, StatusResponse,
    },
};
