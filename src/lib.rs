//! Library crate for portscan-rs: port-spec parsing, TCP connect probing and banner identification.
pub mod banner;
pub mod config;
pub mod ports;
pub mod scanner;
pub mod server;
pub mod types;
