//! Record intents and per-type content canonicalization.
//!
//! A [`Record`] describes one resource record the way a control panel sees
//! it: a zone, a label relative to that zone (`@` for the apex), a type and a
//! parameter. [`normalize`] turns the parameter into the content string
//! PowerDNS stores for that type.
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ProviderError;

/// Reserved label for the zone apex.
pub const APEX_MARKER: &str = "@";

/// Type-specific named fields (`priority`, `weight`, `port`, `flags`, `tag`, `data`).
pub type Metadata = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordType {
    A,
    Aaaa,
    Alias,
    Caa,
    Cert,
    Cname,
    Dname,
    Mx,
    Naptr,
    Ns,
    Ptr,
    Soa,
    Smimea,
    Spf,
    Srv,
    Txt,
    Uri,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Alias => "ALIAS",
            RecordType::Caa => "CAA",
            RecordType::Cert => "CERT",
            RecordType::Cname => "CNAME",
            RecordType::Dname => "DNAME",
            RecordType::Mx => "MX",
            RecordType::Naptr => "NAPTR",
            RecordType::Ns => "NS",
            RecordType::Ptr => "PTR",
            RecordType::Soa => "SOA",
            RecordType::Smimea => "SMIMEA",
            RecordType::Spf => "SPF",
            RecordType::Srv => "SRV",
            RecordType::Txt => "TXT",
            RecordType::Uri => "URI",
        }
    }

    /// Whether records of this type may be managed through the provider.
    ///
    /// ALIAS is only accepted once the apex CNAME restriction is lifted;
    /// DNAME is understood for canonicalization but never managed.
    pub fn is_permitted(&self, cname_apex_restricted: bool) -> bool {
        match self {
            RecordType::Alias => !cname_apex_restricted,
            RecordType::Dname => false,
            _ => true,
        }
    }

    /// Types whose content ends in a domain name that must be fully qualified.
    pub fn has_target_name(&self) -> bool {
        matches!(
            self,
            RecordType::Cname
                | RecordType::Ns
                | RecordType::Mx
                | RecordType::Srv
                | RecordType::Alias
                | RecordType::Dname
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rtype = match s.trim().to_ascii_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "ALIAS" => RecordType::Alias,
            "CAA" => RecordType::Caa,
            "CERT" => RecordType::Cert,
            "CNAME" => RecordType::Cname,
            "DNAME" => RecordType::Dname,
            "MX" => RecordType::Mx,
            "NAPTR" => RecordType::Naptr,
            "NS" => RecordType::Ns,
            "PTR" => RecordType::Ptr,
            "SOA" => RecordType::Soa,
            "SMIMEA" => RecordType::Smimea,
            "SPF" => RecordType::Spf,
            "SRV" => RecordType::Srv,
            "TXT" => RecordType::Txt,
            "URI" => RecordType::Uri,
            _ => return Err(ProviderError::UnsupportedType(s.to_string())),
        };
        Ok(rtype)
    }
}

impl TryFrom<String> for RecordType {
    type Error = ProviderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.as_str().to_string()
    }
}

/// One resource record intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub zone: String,
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    pub parameter: String,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub meta: Metadata,
}

impl Record {
    pub fn new(
        zone: impl Into<String>,
        name: impl Into<String>,
        rtype: RecordType,
        parameter: impl Into<String>,
    ) -> Self {
        Self {
            zone: zone.into().trim_end_matches('.').to_string(),
            name: name.into(),
            rtype,
            parameter: parameter.into(),
            ttl: None,
            meta: Metadata::new(),
        }
    }

    pub fn with_ttl(self, ttl: u32) -> Self {
        Self {
            ttl: Some(ttl),
            ..self
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.meta.insert(key.into(), value.to_string());
        self
    }

    pub fn with_parameter(self, parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            ..self
        }
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn is_apex(&self) -> bool {
        let name = self.name.trim_end_matches('.');
        name.is_empty() || name == APEX_MARKER || name.eq_ignore_ascii_case(&self.zone)
    }

    /// Fully-qualified owner name with a single trailing dot.
    pub fn fqdn(&self) -> String {
        if self.is_apex() {
            return canonical(&self.zone).to_ascii_lowercase();
        }
        make_fqdn(&self.zone, &self.name).to_ascii_lowercase()
    }

    /// Apex marker rewritten to the empty label and, where allowed, an apex
    /// CNAME retyped to ALIAS.
    pub fn resolved(&self, cname_apex_restricted: bool) -> Record {
        if !self.is_apex() {
            return self.clone();
        }
        let rtype = if self.rtype == RecordType::Cname && !cname_apex_restricted {
            info!(zone = %self.zone, "implicitly converted apex CNAME to ALIAS synthetic record");
            RecordType::Alias
        } else {
            self.rtype
        };
        Record {
            name: String::new(),
            rtype,
            ..self.clone()
        }
    }

    /// Content as PowerDNS stores it.
    pub fn content(&self) -> String {
        normalize(self.rtype, &self.parameter, &self.meta, &self.zone)
    }

    /// Compare `content` from a snapshot against this record's content.
    pub fn matches_content(&self, content: &str) -> bool {
        let existing = normalize(self.rtype, content, &Metadata::new(), &self.zone);
        contents_equal(self.rtype, &existing, &self.content())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.fqdn(), self.rtype, self.content())
    }
}

/// Canonical form: exactly one trailing dot. Empty stays empty.
pub fn canonical(name: &str) -> String {
    let trimmed = name.trim().trim_matches('.');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}.")
}

/// Join `name` onto `zone` unless it already carries the zone.
pub fn make_fqdn(zone: &str, name: &str) -> String {
    let zone = zone.trim_matches('.');
    let name = name.trim().trim_end_matches('.');
    let lower = name.to_ascii_lowercase();
    let zone_lower = zone.to_ascii_lowercase();
    if lower == zone_lower || lower.ends_with(&format!(".{zone_lower}")) {
        return canonical(name);
    }
    if name.is_empty() {
        return canonical(zone);
    }
    canonical(&format!("{name}.{zone}"))
}

/// Name relative to `zone`, `@` for the apex.
pub fn relative_name(zone: &str, fqdn: &str) -> String {
    let zone = zone.trim_matches('.').to_ascii_lowercase();
    let name = fqdn.trim_end_matches('.');
    if name.eq_ignore_ascii_case(&zone) {
        return APEX_MARKER.to_string();
    }
    let suffix = format!(".{zone}");
    if name.to_ascii_lowercase().ends_with(&suffix) {
        return name[..name.len() - suffix.len()].to_string();
    }
    name.to_string()
}

/// Per-type canonicalization applied before content is submitted.
pub fn normalize(rtype: RecordType, parameter: &str, meta: &Metadata, zone: &str) -> String {
    match rtype {
        RecordType::Cname => {
            let target = parameter.trim();
            // A blank CNAME form is submitted with the A record default.
            if target == APEX_MARKER || target == "127.0.0.1" {
                return canonical(zone);
            }
            append_dot(target)
        }
        RecordType::Ns | RecordType::Alias | RecordType::Dname => append_dot(parameter.trim()),
        RecordType::Mx => {
            let target = target_or_data(parameter, meta);
            match meta.get("priority") {
                Some(prio) if is_single_field(target) => {
                    format!("{} {}", prio.trim(), append_dot(target))
                }
                _ => append_dot(&collapse_whitespace(target)),
            }
        }
        RecordType::Srv => {
            let target = target_or_data(parameter, meta);
            match (meta.get("priority"), meta.get("weight"), meta.get("port")) {
                (Some(prio), Some(weight), Some(port)) if is_single_field(target) => format!(
                    "{} {} {} {}",
                    prio.trim(),
                    weight.trim(),
                    port.trim(),
                    append_dot(target)
                ),
                _ => append_dot(&collapse_whitespace(target)),
            }
        }
        RecordType::Txt | RecordType::Spf => quote(parameter.trim()),
        RecordType::Caa => {
            let (flags, tag, data) = caa_fields(parameter, meta);
            let flags = flags.parse::<u8>().unwrap_or(0);
            format!("{} {} {}", flags, tag, quote(&data))
        }
        RecordType::Uri => {
            let (priority, weight, data) = uri_fields(parameter, meta);
            format!("{} {} {}", priority, weight, quote(&data))
        }
        RecordType::A => canonical_address::<Ipv4Addr>(parameter),
        RecordType::Aaaa => canonical_address::<Ipv6Addr>(parameter),
        RecordType::Soa => normalize_soa(parameter, meta),
        _ => parameter.replace('\t', " "),
    }
}

/// Whether two normalized contents denote the same record value.
pub fn contents_equal(rtype: RecordType, a: &str, b: &str) -> bool {
    if rtype.has_target_name() {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// SOA RNAME for `contact`; an email address has its local part escaped.
pub fn soa_rname(contact: &str) -> String {
    let soa = canonical(contact);
    let Some(pos) = soa.find('@') else {
        return soa;
    };
    let soa = soa.replace("\\.", ".");
    let pos = soa.find('@').unwrap_or(pos);
    let (local, domain) = soa.split_at(pos);
    format!("{}.{}", local.replace('.', "\\."), &domain[1..])
}

/// Full SOA content for a zone created on `date`.
pub fn soa_content(primary: &str, contact: &str, date: NaiveDate) -> String {
    // primary | contact | serial | refresh | retry | expire | ttl
    format!(
        "{} {} {}01 3600 1800 604800 600",
        canonical(primary),
        soa_rname(contact),
        date.format("%Y%m%d")
    )
}

fn normalize_soa(parameter: &str, meta: &Metadata) -> String {
    if parameter.trim().is_empty() {
        if let (Some(primary), Some(contact)) = (meta.get("primary"), meta.get("contact")) {
            return soa_content(primary, contact, Utc::now().date_naive());
        }
        return String::new();
    }
    let mut parts: Vec<String> = parameter.split_whitespace().map(str::to_string).collect();
    if let Some(primary) = parts.first_mut() {
        *primary = append_dot(primary);
    }
    if let Some(contact) = parts.get_mut(1) {
        *contact = soa_rname(contact);
    }
    parts.join(" ")
}

/// Address in its standard text form; anything unparsable is left to the server.
fn canonical_address<T: FromStr + fmt::Display>(value: &str) -> String {
    let value = value.trim();
    value
        .parse::<T>()
        .map_or_else(|_| value.to_string(), |addr| addr.to_string())
}

fn append_dot(value: &str) -> String {
    format!("{}.", value.trim_end_matches('.'))
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.trim_matches('"'))
}

fn is_single_field(value: &str) -> bool {
    value.split_whitespace().count() == 1
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn target_or_data<'a>(parameter: &'a str, meta: &'a Metadata) -> &'a str {
    let parameter = parameter.trim();
    if parameter.is_empty() {
        return meta.get("data").map(|d| d.trim()).unwrap_or(parameter);
    }
    parameter
}

/// Flags, tag and unquoted data of a CAA record.
pub(crate) fn caa_fields(parameter: &str, meta: &Metadata) -> (String, String, String) {
    match (meta.get("flags"), meta.get("tag"), meta.get("data")) {
        (flags, Some(tag), Some(data)) => (
            flags.map_or("0", |f| f.trim()).to_string(),
            tag.trim().to_string(),
            unquote(data),
        ),
        _ => split_three(parameter, "0"),
    }
}

/// Priority, weight and unquoted target of a URI record.
pub(crate) fn uri_fields(parameter: &str, meta: &Metadata) -> (String, String, String) {
    match (meta.get("priority"), meta.get("weight"), meta.get("data")) {
        (Some(prio), Some(weight), Some(data)) => (
            prio.trim().to_string(),
            weight.trim().to_string(),
            unquote(data),
        ),
        _ => split_three(parameter, "0"),
    }
}

/// Two whitespace-separated fields, then everything after them as data.
fn split_three(parameter: &str, default_first: &str) -> (String, String, String) {
    let (first, rest) = next_field(parameter.trim());
    let (second, rest) = next_field(rest);
    let first = if first.is_empty() { default_first } else { first };
    (first.to_string(), second.to_string(), unquote(rest))
}

fn next_field(value: &str) -> (&str, &str) {
    match value.find(char::is_whitespace) {
        Some(pos) => (&value[..pos], value[pos..].trim_start()),
        None => (value, ""),
    }
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').to_string()
}
