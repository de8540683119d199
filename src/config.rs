use std::fmt;
use std::str::FromStr;

/// Provider-wide default TTL applied when a record leaves it unset.
pub const DEFAULT_TTL: u32 = 14400;

/// Default lifetime (seconds) of the authoritative server's query cache.
pub const DEFAULT_DIRTY_DEADLINE: u64 = 20;

/// Replication kind requested when a zone is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ZoneKind {
    #[default]
    Native,
    Master,
    Slave,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Native => "Native",
            ZoneKind::Master => "Master",
            ZoneKind::Slave => "Slave",
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(ZoneKind::Native),
            "master" => Ok(ZoneKind::Master),
            "slave" => Ok(ZoneKind::Slave),
            other => Err(format!("unknown PowerDNS zone kind '{other}'")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub endpoint: String, // e.g. "http://127.0.0.1:8081/api/v1"
    pub api_key: String,
    pub server_id: String,        // usually "localhost"
    pub nameservers: Vec<String>, // "ns1.example.net.", ...
    /// SOA contact; `{domain}` is substituted with the zone name.
    pub soa_contact: Option<String>,
    pub zone_kind: ZoneKind,
    /// Recursion on the authoritative side lifts the apex CNAME restriction.
    pub recursion: bool,
    pub dirty_deadline: u64,
    pub default_ttl: u32,
}

impl ProviderConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            server_id: "localhost".into(),
            nameservers: Vec::new(),
            soa_contact: None,
            zone_kind: ZoneKind::default(),
            recursion: false,
            dirty_deadline: DEFAULT_DIRTY_DEADLINE,
            default_ttl: DEFAULT_TTL,
        }
    }

    /// CNAME cannot be present at the apex unless ALIAS is available.
    pub fn cname_apex_restricted(&self) -> bool {
        !self.recursion
    }

    /// SOA contact for `domain`, before RNAME escaping.
    pub fn soa_contact_for(&self, domain: &str) -> String {
        let domain = domain.trim_end_matches('.');
        match self.soa_contact.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(template) => template.replace("{domain}", domain),
            None => format!("hostmaster@{domain}"),
        }
    }

    /// Primary nameserver used as SOA MNAME.
    pub fn primary_nameserver(&self) -> Option<&str> {
        self.nameservers.first().map(String::as_str)
    }
}
