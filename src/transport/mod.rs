//! Transport layers exposing the connection manager

pub mod unix_socket;
