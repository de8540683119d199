//! Read-only view over one zone's RRsets, fetched once per operation.
use std::collections::HashMap;

use crate::powerdns::types::{PdnsRrset, PdnsZone};

#[derive(Debug, Clone, Default)]
pub struct ZoneSnapshot {
    rrsets: Vec<PdnsRrset>,
    index: HashMap<(String, String), usize>,
}

fn key(name: &str, rrtype: &str) -> (String, String) {
    (
        name.trim_end_matches('.').to_ascii_lowercase(),
        rrtype.to_ascii_uppercase(),
    )
}

impl ZoneSnapshot {
    pub fn new(rrsets: Vec<PdnsRrset>) -> Self {
        let mut index = HashMap::with_capacity(rrsets.len());
        for (pos, rrset) in rrsets.iter().enumerate() {
            // (name, type) is unique per zone; keep the first if the server disagrees
            index.entry(key(&rrset.name, &rrset.rrtype)).or_insert(pos);
        }
        Self { rrsets, index }
    }

    pub fn from_zone(zone: PdnsZone) -> Self {
        Self::new(zone.rrsets.unwrap_or_default())
    }

    pub fn get(&self, name: &str, rrtype: &str) -> Option<&PdnsRrset> {
        self.index
            .get(&key(name, rrtype))
            .map(|&pos| &self.rrsets[pos])
    }

    pub fn contains(&self, name: &str, rrtype: &str) -> bool {
        self.index.contains_key(&key(name, rrtype))
    }

    /// The unmodified RRsets in server order.
    pub fn rrsets(&self) -> &[PdnsRrset] {
        &self.rrsets
    }

    pub fn len(&self) -> usize {
        self.rrsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }
}

impl From<Vec<PdnsRrset>> for ZoneSnapshot {
    fn from(rrsets: Vec<PdnsRrset>) -> Self {
        Self::new(rrsets)
    }
}
