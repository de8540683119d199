//! PowerDNS HTTP API: wire types and the transport that carries them.

pub mod client;
pub mod transport;
pub mod types;
