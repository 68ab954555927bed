//! Library crate for port-probe-rs exposing reusable modules.
pub mod aggregate;
pub mod banner;
pub mod ping;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod server;
pub mod telnet;
pub mod types;
