//! PowerDNS provider for a hosting control panel.
//!
//! Zones and records are managed through the PowerDNS HTTP API. Record-level
//! intents are reconciled against the zone's current RRsets so that a PATCH
//! only ever changes the value it was asked to change.

pub mod config;
pub mod dirty;
pub mod error;
pub mod powerdns;
pub mod provider;
pub mod reconciler;
pub mod record;
pub mod snapshot;
pub mod validation;

pub use config::ProviderConfig;
pub use error::ProviderError;
pub use provider::PowerDnsProvider;
pub use reconciler::Reconciler;
pub use record::{Record, RecordType};
pub use snapshot::ZoneSnapshot;
