//! Core association logic

pub mod attempt;
pub mod error;
pub mod logging;
pub mod manager;
pub mod probe;
pub mod request_builder;
pub mod state_machine;
pub mod types;
