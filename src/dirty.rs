//! Packet cache bypass.
//!
//! PowerDNS answers queries from an internal cache for a short while after a
//! change was written. The advisor remembers which `name`/`type` pairs were
//! just patched so that a read needing the fresh value can flush that entry
//! first.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::powerdns::types::PdnsRrset;

/// Time source for the advisor.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct DirtyCacheAdvisor<C = SystemClock> {
    clock: C,
    deadline: i64,
    last_mutation: Option<i64>,
    recently_mutated: HashMap<String, i64>,
}

fn record_key(name: &str, rrtype: &str) -> String {
    format!(
        "{}.{}",
        rrtype.to_ascii_uppercase(),
        name.trim_matches('.').to_ascii_lowercase()
    )
}

impl DirtyCacheAdvisor<SystemClock> {
    pub fn new(deadline_secs: u64) -> Self {
        Self::with_clock(SystemClock, deadline_secs)
    }
}

impl<C: Clock> DirtyCacheAdvisor<C> {
    pub fn with_clock(clock: C, deadline_secs: u64) -> Self {
        Self {
            clock,
            deadline: i64::try_from(deadline_secs).unwrap_or(i64::MAX),
            last_mutation: None,
            recently_mutated: HashMap::new(),
        }
    }

    fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    /// A destructive call was made; nothing in particular was patched.
    pub fn touch(&mut self) {
        self.last_mutation = Some(self.now());
    }

    /// Every `name`/`type` in `rrsets` was just written.
    pub fn record_mutation(&mut self, rrsets: &[PdnsRrset]) {
        let now = self.now();
        self.last_mutation = Some(now);
        for rrset in rrsets {
            self.recently_mutated
                .insert(record_key(&rrset.name, &rrset.rrtype), now);
        }
    }

    pub fn last_mutation(&self) -> Option<DateTime<Utc>> {
        self.last_mutation
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    }

    /// Whether a read of `name`/`rrtype` may still be served stale.
    pub fn is_dirty(&mut self, name: &str, rrtype: &str) -> bool {
        let Some(last) = self.last_mutation else {
            return false;
        };
        if self.now() - last > self.deadline {
            self.recently_mutated.clear();
            return false;
        }
        let Some(&mutated_at) = self.recently_mutated.get(&record_key(name, rrtype)) else {
            return false;
        };
        let dirty = last - mutated_at <= self.deadline;
        if dirty {
            debug!(%name, %rrtype, "pdns dirty");
        }
        dirty
    }
}
