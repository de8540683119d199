//! Record-level intents turned into RRset PATCH payloads.
//!
//! PowerDNS replaces a whole `name`/`type` bundle per PATCH entry, while a
//! control panel adds, removes and edits one value at a time. Every entry
//! produced here therefore carries the full member list the bundle must end
//! up with. Members that belong to other records sharing the bundle are
//! copied through untouched; only the single value named by the intent is
//! appended or dropped.
//!
//! See <https://doc.powerdns.com/authoritative/http-api/zone.html#rrset>
//! under "changetype".
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::powerdns::types::{PdnsRecord, PdnsRrset};
use crate::record::{Record, RecordType};
use crate::snapshot::ZoneSnapshot;

#[derive(Clone, Copy, Debug)]
pub struct Reconciler {
    cname_apex_restricted: bool,
    default_ttl: u32,
}

impl Reconciler {
    pub fn new(cname_apex_restricted: bool, default_ttl: u32) -> Self {
        Self {
            cname_apex_restricted,
            default_ttl,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.cname_apex_restricted(), config.default_ttl)
    }

    /// Apex rewriting and type checks shared by every entry point.
    pub fn prepare(&self, record: &Record) -> Result<Record, ProviderError> {
        let record = record.resolved(self.cname_apex_restricted);
        if !record.rtype.is_permitted(self.cname_apex_restricted) {
            return Err(ProviderError::UnsupportedType(record.rtype.to_string()));
        }
        Ok(record)
    }

    /// Patch that makes `record` present, keeping co-located members.
    pub fn add(
        &self,
        record: &Record,
        snapshot: &ZoneSnapshot,
    ) -> Result<Vec<PdnsRrset>, ProviderError> {
        let record = self.prepare(record)?;
        if record.rtype == RecordType::Soa {
            return Err(ProviderError::SoaMutation);
        }

        let name = record.fqdn();
        let rrtype = record.rtype.as_str();
        let Some(existing) = snapshot.get(&name, rrtype) else {
            let ttl = record.ttl.unwrap_or(self.default_ttl);
            return Ok(vec![PdnsRrset::replace(
                name,
                rrtype,
                ttl,
                vec![PdnsRecord::enabled(record.content())],
            )]);
        };

        let mut members = existing.records.clone();
        if existing.contents().any(|c| record.matches_content(c)) {
            debug!(%record, "record already present, re-emitting rrset unchanged");
        } else {
            members.push(PdnsRecord::enabled(record.content()));
        }
        let ttl = existing
            .ttl
            .or(record.ttl)
            .unwrap_or(self.default_ttl);
        Ok(vec![PdnsRrset::replace(
            existing.name.clone(),
            existing.rrtype.clone(),
            ttl,
            members,
        )])
    }

    /// Patch that drops `record`'s value from its bundle.
    ///
    /// An intent without a parameter removes the whole bundle. A bundle left
    /// without members is deleted rather than replaced with nothing.
    pub fn remove(
        &self,
        record: &Record,
        snapshot: &ZoneSnapshot,
    ) -> Result<Vec<PdnsRrset>, ProviderError> {
        let record = self.prepare(record)?;
        if record.rtype == RecordType::Soa {
            return Err(ProviderError::SoaMutation);
        }

        let name = record.fqdn();
        let rrtype = record.rtype.as_str();
        let Some(existing) = snapshot.get(&name, rrtype) else {
            debug!(%name, %rrtype, "no rrset to remove from, emitting tolerant delete");
            return Ok(vec![PdnsRrset::delete(name, rrtype)]);
        };

        if record.parameter.trim().is_empty() && record.meta.is_empty() {
            return Ok(vec![PdnsRrset::delete(
                existing.name.clone(),
                existing.rrtype.clone(),
            )]);
        }

        let members = without(&existing.records, &record);
        if members.len() == existing.records.len() {
            warn!(%record, "no member matched the record to remove");
        }
        Ok(vec![rewrite(existing, members, self.default_ttl)])
    }

    /// Patch that turns `old` into `new`.
    ///
    /// Within one bundle the edit is a single `REPLACE`. Across bundles the
    /// old location comes first, then the new one.
    pub fn change(
        &self,
        old: &Record,
        new: &Record,
        snapshot: &ZoneSnapshot,
    ) -> Result<Vec<PdnsRrset>, ProviderError> {
        let old = self.prepare(old)?;
        let new = self.prepare(new)?;

        let old_name = old.fqdn();
        let new_name = new.fqdn();
        let new_type = new.rtype.as_str();

        // a ttl that disagrees with the server means the caller's view is stale
        let old_set = snapshot
            .get(&old_name, old.rtype.as_str())
            .filter(|set| old.ttl.is_none_or(|ttl| set.ttl == Some(ttl)));
        if old_set.is_none() {
            warn!(record = %old, "record to update not found, only adding its replacement");
        }
        let ttl = new.ttl.or_else(|| old_set.and_then(|set| set.ttl));
        let content = new.content();

        if old_name == new_name && old.rtype == new.rtype {
            let base = old_set.or_else(|| snapshot.get(&new_name, new_type));
            let members = match (old_set, base) {
                (Some(set), _) => substitute(&set.records, &old, &new),
                (None, Some(set)) => with_member(&set.records, &new),
                (None, None) => vec![PdnsRecord::enabled(content)],
            };
            let ttl = ttl
                .or_else(|| base.and_then(|set| set.ttl))
                .unwrap_or(self.default_ttl);
            let name = base.map_or(new_name, |set| set.name.clone());
            return Ok(vec![PdnsRrset::replace(name, new_type, ttl, members)]);
        }

        let mut patches = Vec::with_capacity(2);
        if let Some(set) = old_set {
            patches.push(rewrite(set, without(&set.records, &old), self.default_ttl));
        }

        let target = snapshot.get(&new_name, new_type);
        let members = match target {
            Some(set) => with_member(&set.records, &new),
            None => vec![PdnsRecord::enabled(content)],
        };
        let ttl = ttl
            .or_else(|| target.and_then(|set| set.ttl))
            .unwrap_or(self.default_ttl);
        let name = target.map_or(new_name, |set| set.name.clone());
        patches.push(PdnsRrset::replace(name, new_type, ttl, members));

        Ok(patches)
    }
}

/// `records` minus the first member matching `record`.
fn without(records: &[PdnsRecord], record: &Record) -> Vec<PdnsRecord> {
    let mut members = records.to_vec();
    if let Some(pos) = members.iter().position(|m| record.matches_content(&m.content)) {
        members.remove(pos);
    }
    members
}

/// `records` plus `record`, unless an equal member is already there.
fn with_member(records: &[PdnsRecord], record: &Record) -> Vec<PdnsRecord> {
    let mut members = records.to_vec();
    if !members.iter().any(|m| record.matches_content(&m.content)) {
        members.push(PdnsRecord::enabled(record.content()));
    }
    members
}

/// `records` with the member matching `old` edited into `new` at its position.
fn substitute(records: &[PdnsRecord], old: &Record, new: &Record) -> Vec<PdnsRecord> {
    let Some(pos) = records.iter().position(|m| old.matches_content(&m.content)) else {
        return with_member(records, new);
    };
    let duplicate = records
        .iter()
        .enumerate()
        .any(|(i, m)| i != pos && new.matches_content(&m.content));

    let mut members = records.to_vec();
    if duplicate {
        members.remove(pos);
    } else {
        members[pos].content = new.content();
    }
    members
}

/// `existing` rewritten with `members`; comments are never carried over.
fn rewrite(existing: &PdnsRrset, members: Vec<PdnsRecord>, default_ttl: u32) -> PdnsRrset {
    if members.is_empty() {
        return PdnsRrset::delete(existing.name.clone(), existing.rrtype.clone());
    }
    PdnsRrset::replace(
        existing.name.clone(),
        existing.rrtype.clone(),
        existing.ttl.unwrap_or(default_ttl),
        members,
    )
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
