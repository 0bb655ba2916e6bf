//! WiFi Association Service
//!
//! Associates a device with a WiFi network and reports one definitive
//! outcome per attempt. Usable as a library through [`ConnectionManager`] or
//! as a daemon speaking JSON-RPC 2.0 over a Unix domain socket.

pub mod backend;
pub mod config;
pub mod core;
pub mod protocol;
pub mod transport;

pub use core::{
    attempt::AttemptHandle,
    error::{AssociationError, PlatformError, TransportError},
    logging::{LogConfig, LogSink},
    manager::{ConcurrencyPolicy, ConnectionManager, ManagerConfig},
    state_machine::ValidationPolicy,
    types::{
        Association, AssociationState, FailureReason, LinkStatus, MatchMode, NetworkDescriptor,
        PlatformEvent, RejectCode, ScanResult, SecurityType, WpsDescriptor,
    },
};
