//! Zone and record operations against one PowerDNS server.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::dirty::{Clock, DirtyCacheAdvisor, SystemClock};
use crate::error::{ProviderError, extract_reason};
use crate::powerdns::client::PowerDnsClient;
use crate::powerdns::transport::{ApiResponse, Method, Transport};
use crate::powerdns::types::{PdnsExport, PdnsPatch, PdnsRecord, PdnsRrset, PdnsZone, PdnsZoneCreate};
use crate::reconciler::Reconciler;
use crate::record::{Record, RecordType, canonical, relative_name, soa_content};
use crate::snapshot::ZoneSnapshot;
use crate::validation::{AllowAll, RecordValidator, StandardValidator, ZoneAuthority, validate_domain};

/// TTL of the SOA and NS rrsets a new zone starts with.
const ZONE_APEX_TTL: u32 = 86400;

pub struct PowerDnsProvider<T, C = SystemClock> {
    config: ProviderConfig,
    transport: T,
    reconciler: Reconciler,
    advisor: Mutex<DirtyCacheAdvisor<C>>,
    authority: Arc<dyn ZoneAuthority>,
    validator: Arc<dyn RecordValidator>,
}

impl PowerDnsProvider<PowerDnsClient> {
    /// Provider talking HTTP to `config.endpoint`.
    pub fn connect(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = PowerDnsClient::new(&config.endpoint, &config.api_key, &config.server_id)?;
        Ok(Self::new(config, client))
    }
}

impl<T: Transport> PowerDnsProvider<T> {
    pub fn new(config: ProviderConfig, transport: T) -> Self {
        Self::with_clock(config, transport, SystemClock)
    }
}

impl<T: Transport, C: Clock> PowerDnsProvider<T, C> {
    pub fn with_clock(config: ProviderConfig, transport: T, clock: C) -> Self {
        let advisor = DirtyCacheAdvisor::with_clock(clock, config.dirty_deadline);
        Self {
            reconciler: Reconciler::from_config(&config),
            advisor: Mutex::new(advisor),
            authority: Arc::new(AllowAll::default()),
            validator: Arc::new(StandardValidator),
            config,
            transport,
        }
    }

    pub fn with_authority(self, authority: Arc<dyn ZoneAuthority>) -> Self {
        Self { authority, ..self }
    }

    pub fn with_validator(self, validator: Arc<dyn RecordValidator>) -> Self {
        Self { validator, ..self }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn advisor(&self) -> MutexGuard<'_, DirtyCacheAdvisor<C>> {
        self.advisor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ProviderError> {
        if method != Method::Get && !path.starts_with("cache/flush") {
            self.advisor().touch();
        }
        self.transport.execute(method, path, body).await
    }

    fn zone_path(zone: &str) -> String {
        format!("zones/{}", canonical(zone))
    }

    fn authorize(&self, zone: &str) -> Result<(), ProviderError> {
        if !self.authority.owns_zone(zone) {
            return Err(ProviderError::NotOwned(zone.to_string()));
        }
        Ok(())
    }

    /// Check that the configured API key is accepted.
    pub async fn verify_key(&self) -> Result<(), ProviderError> {
        let res = self.call(Method::Get, "servers", None).await?;
        if res.status >= 500 {
            return Err(ProviderError::Server { status: res.status });
        }
        if !res.is_success() {
            let reason = extract_reason(&res.body).unwrap_or_else(|| "Invalid key".into());
            return Err(ProviderError::Rejected {
                status: res.status,
                reason,
            });
        }
        Ok(())
    }

    /// SOA and NS rrsets a zone is provisioned with.
    pub fn initial_rrsets(&self, domain: &str, date: NaiveDate) -> Result<Vec<PdnsRrset>, ProviderError> {
        let primary = self
            .config
            .primary_nameserver()
            .ok_or_else(|| ProviderError::Config("no nameservers configured".into()))?;
        let name = canonical(domain);
        let contact = self.config.soa_contact_for(domain);

        let soa = PdnsRrset {
            name: name.clone(),
            rrtype: RecordType::Soa.to_string(),
            ttl: Some(ZONE_APEX_TTL),
            changetype: None,
            records: vec![PdnsRecord::enabled(soa_content(primary, &contact, date))],
            comments: Vec::new(),
        };
        let ns = PdnsRrset {
            name,
            rrtype: RecordType::Ns.to_string(),
            ttl: Some(ZONE_APEX_TTL),
            changetype: None,
            records: self
                .config
                .nameservers
                .iter()
                .map(|ns| PdnsRecord::enabled(canonical(ns)))
                .collect(),
            comments: Vec::new(),
        };
        Ok(vec![soa, ns])
    }

    pub async fn add_zone(&self, domain: &str) -> Result<(), ProviderError> {
        validate_domain(domain)?;
        let create = PdnsZoneCreate {
            name: canonical(domain),
            kind: self.config.zone_kind.to_string(),
            // required by the API, but the NS rrset below takes precedence
            nameservers: Vec::new(),
            rrsets: self.initial_rrsets(domain, Utc::now().date_naive())?,
        };
        let body = serde_json::to_value(&create).map_err(ProviderError::decode)?;
        self.call(Method::Post, "zones", Some(&body))
            .await?
            .expect_status(201)?;
        info!(zone = %create.name, kind = %create.kind, "created zone");
        Ok(())
    }

    pub async fn remove_zone(&self, domain: &str) -> Result<(), ProviderError> {
        validate_domain(domain)?;
        self.call(Method::Delete, &Self::zone_path(domain), None)
            .await?
            .expect_status(204)?;
        info!(zone = %domain, "removed zone");
        Ok(())
    }

    pub async fn zone_exists(&self, zone: &str) -> Result<bool, ProviderError> {
        let res = self.call(Method::Get, &Self::zone_path(zone), None).await?;
        match res.status {
            200..=299 => Ok(true),
            400..=499 => Ok(false),
            _ => Err(ProviderError::from_response(res.status, &res.body)),
        }
    }

    /// Every zone on the server, without trailing dots.
    pub async fn list_zones(&self) -> Result<Vec<String>, ProviderError> {
        let body = self.call(Method::Get, "zones", None).await?.into_result()?;
        let zones: Vec<PdnsZone> = serde_json::from_value(body).map_err(ProviderError::decode)?;
        Ok(zones
            .into_iter()
            .map(|z| z.name.trim_end_matches('.').to_string())
            .collect())
    }

    /// Zone contents in master file format.
    pub async fn export_zone(&self, domain: &str) -> Result<String, ProviderError> {
        let path = format!("{}/export", Self::zone_path(domain));
        let body = self.call(Method::Get, &path, None).await?.into_result()?;
        let export: PdnsExport = serde_json::from_value(body).map_err(ProviderError::decode)?;
        Ok(export.zone)
    }

    /// Current rrsets of `zone`; never cached across operations.
    pub async fn fetch_snapshot(&self, zone: &str) -> Result<ZoneSnapshot, ProviderError> {
        let body = self
            .call(Method::Get, &Self::zone_path(zone), None)
            .await?
            .into_result()?;
        let zone: PdnsZone = serde_json::from_value(body).map_err(ProviderError::decode)?;
        Ok(ZoneSnapshot::from_zone(zone))
    }

    /// Flattened records of `zone`, names relative to the zone.
    pub async fn zone_records(&self, zone: &str) -> Result<Vec<Record>, ProviderError> {
        let snapshot = self.fetch_snapshot(zone).await?;
        let mut records = Vec::new();
        for rrset in snapshot.rrsets() {
            let Ok(rtype) = rrset.rrtype.parse::<RecordType>() else {
                debug!(name = %rrset.name, rrtype = %rrset.rrtype, "skipping unmanaged rrset type");
                continue;
            };
            let name = relative_name(zone, &rrset.name);
            for member in &rrset.records {
                let mut record = Record::new(zone, name.clone(), rtype, member.content.clone());
                record.ttl = rrset.ttl;
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn patch(&self, zone: &str, rrsets: &[PdnsRrset]) -> Result<(), ProviderError> {
        let body = serde_json::to_value(PdnsPatch { rrsets }).map_err(ProviderError::decode)?;
        self.call(Method::Patch, &Self::zone_path(zone), Some(&body))
            .await?
            .expect_status(204)?;
        self.advisor().record_mutation(rrsets);
        Ok(())
    }

    /// Checks that must pass before anything is sent.
    fn admit(&self, record: &Record) -> Result<Record, ProviderError> {
        self.validator.validate(record)?;
        let prepared = self.reconciler.prepare(record)?;
        self.authorize(&record.zone)?;
        Ok(prepared)
    }

    pub async fn add_record(&self, record: &Record) -> Result<(), ProviderError> {
        if self.admit(record)?.rtype == RecordType::Soa {
            return Err(ProviderError::SoaMutation);
        }
        let snapshot = self.fetch_snapshot(&record.zone).await?;
        let rrsets = self.reconciler.add(record, &snapshot)?;
        self.patch(&record.zone, &rrsets).await?;
        info!(%record, "added record");
        Ok(())
    }

    pub async fn remove_record(&self, record: &Record) -> Result<(), ProviderError> {
        if self.admit(record)?.rtype == RecordType::Soa {
            return Err(ProviderError::SoaMutation);
        }
        let snapshot = self.fetch_snapshot(&record.zone).await?;
        let rrsets = self.reconciler.remove(record, &snapshot)?;
        self.patch(&record.zone, &rrsets).await?;
        info!(%record, "removed record");
        Ok(())
    }

    pub async fn update_record(&self, old: &Record, new: &Record) -> Result<(), ProviderError> {
        let old_prepared = self.admit(old)?;
        let new_prepared = self.admit(new)?;
        if !old.zone.eq_ignore_ascii_case(&new.zone) {
            return Err(ProviderError::invalid_record(
                "cannot move a record between zones",
            ));
        }
        let touches_soa =
            old_prepared.rtype == RecordType::Soa || new_prepared.rtype == RecordType::Soa;
        if touches_soa && !self.authority.is_admin() {
            return Err(ProviderError::SoaEditDenied);
        }

        let snapshot = self.fetch_snapshot(&old.zone).await?;
        let rrsets = self.reconciler.change(old, new, &snapshot)?;
        self.patch(&old.zone, &rrsets).await?;
        info!(old = %old, new = %new, "updated record");
        Ok(())
    }

    /// Whether `name`/`rtype` must be flushed before it can be read fresh.
    pub fn is_dirty(&self, name: &str, rtype: RecordType) -> bool {
        self.advisor().is_dirty(name, rtype.as_str())
    }

    /// Whether the record is present, flushing the packet cache first when
    /// it was just written.
    pub async fn record_exists(
        &self,
        zone: &str,
        name: &str,
        rtype: RecordType,
        parameter: &str,
    ) -> Result<bool, ProviderError> {
        let record = self
            .reconciler
            .prepare(&Record::new(zone, name, rtype, parameter))?;
        let fqdn = record.fqdn();
        if self.is_dirty(&fqdn, record.rtype) {
            self.flush(&fqdn).await?;
        }

        let snapshot = self.fetch_snapshot(zone).await?;
        let Some(rrset) = snapshot.get(&fqdn, record.rtype.as_str()) else {
            return Ok(false);
        };
        if parameter.trim().is_empty() {
            return Ok(!rrset.records.is_empty());
        }
        Ok(rrset.contents().any(|c| record.matches_content(c)))
    }

    /// Drop `domain` from the server's packet cache.
    pub async fn flush(&self, domain: &str) -> Result<(), ProviderError> {
        validate_domain(domain)?;
        let path = format!("cache/flush?domain={}", canonical(domain));
        self.call(Method::Put, &path, None).await?.into_result()?;
        debug!(%domain, "flushed packet cache");
        Ok(())
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
