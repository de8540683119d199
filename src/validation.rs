//! Input checks run before any request is sent, plus the capability traits
//! a host uses to plug in its own record and ownership rules.
use std::net::{Ipv4Addr, Ipv6Addr};

use regex::Regex;

use crate::error::ProviderError;
use crate::record::{APEX_MARKER, Record, RecordType, caa_fields, uri_fields};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("label is empty")]
    Empty,
    #[error("label too long (max 63 characters)")]
    TooLong,
    #[error("name too long (max 253 characters)")]
    NameTooLong,
    #[error("label contains invalid characters (only a-z, 0-9, '-' and '_' allowed)")]
    InvalidCharacters,
    #[error("label must not start or end with '-'")]
    LeadingOrTrailingHyphen,
}

lazy_static::lazy_static! {
    /// Letters, digits, '-' and '_' (service labels such as `_sip._tcp`)
    static ref LABEL_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::Empty);
    }
    if label.len() > 63 {
        return Err(ValidationError::TooLong);
    }
    if label == "*" {
        return Ok(());
    }
    if !LABEL_RE.is_match(label) {
        return Err(ValidationError::InvalidCharacters);
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(ValidationError::LeadingOrTrailingHyphen);
    }
    Ok(())
}

pub fn validate_fqdn_ascii(domain: &str) -> Result<(), ValidationError> {
    // a single trailing dot is allowed
    let d = domain.strip_suffix('.').unwrap_or(domain);
    if d.is_empty() {
        return Err(ValidationError::Empty);
    }
    if d.len() > 253 {
        return Err(ValidationError::NameTooLong);
    }
    for label in d.split('.') {
        validate_label(label)?;
    }
    Ok(())
}

/// Domain accepted by the cache flush endpoint.
pub fn validate_domain(domain: &str) -> Result<(), ProviderError> {
    validate_fqdn_ascii(domain)
        .map_err(|e| ProviderError::InvalidDomain(format!("{domain}: {e}")))
}

/// Host-specific record rules.
pub trait RecordValidator: Send + Sync {
    fn validate(&self, record: &Record) -> Result<(), ProviderError>;
}

/// Host-specific zone ownership and privilege.
pub trait ZoneAuthority: Send + Sync {
    fn owns_zone(&self, zone: &str) -> bool;

    /// Admins may edit SOA records through the update path.
    fn is_admin(&self) -> bool {
        false
    }
}

/// Grants every zone; for single-tenant deployments.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll {
    pub admin: bool,
}

impl ZoneAuthority for AllowAll {
    fn owns_zone(&self, _zone: &str) -> bool {
        true
    }

    fn is_admin(&self) -> bool {
        self.admin
    }
}

/// Name syntax, address literals and non-empty parameters.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardValidator;

impl RecordValidator for StandardValidator {
    fn validate(&self, record: &Record) -> Result<(), ProviderError> {
        validate_domain(&record.zone)?;

        let name = record.name.trim_end_matches('.');
        if !name.is_empty() && name != APEX_MARKER {
            validate_fqdn_ascii(name)
                .map_err(|e| ProviderError::invalid_record(format!("name `{name}': {e}")))?;
        }

        let parameter = record.parameter.trim();
        match record.rtype {
            RecordType::A => {
                parameter.parse::<Ipv4Addr>().map_err(|_| {
                    ProviderError::invalid_record(format!("`{parameter}' is not an IPv4 address"))
                })?;
            }
            RecordType::Aaaa => {
                parameter.parse::<Ipv6Addr>().map_err(|_| {
                    ProviderError::invalid_record(format!("`{parameter}' is not an IPv6 address"))
                })?;
            }
            RecordType::Caa | RecordType::Uri | RecordType::Mx | RecordType::Srv
                if parameter.is_empty() && record.meta.is_empty() =>
            {
                return Err(ProviderError::invalid_record(format!(
                    "{} record requires a parameter",
                    record.rtype
                )));
            }
            RecordType::Caa => {
                let (_, tag, data) = caa_fields(parameter, &record.meta);
                if tag.is_empty() || data.is_empty() {
                    return Err(ProviderError::invalid_record(format!(
                        "CAA record `{parameter}' needs flags, tag and value"
                    )));
                }
            }
            RecordType::Uri => {
                let (_, weight, data) = uri_fields(parameter, &record.meta);
                if weight.is_empty() || data.is_empty() {
                    return Err(ProviderError::invalid_record(format!(
                        "URI record `{parameter}' needs priority, weight and target"
                    )));
                }
            }
            RecordType::Mx | RecordType::Srv => {}
            _ if parameter.is_empty() => {
                return Err(ProviderError::invalid_record(format!(
                    "{} record requires a parameter",
                    record.rtype
                )));
            }
            _ => {}
        }
        Ok(())
    }
}
