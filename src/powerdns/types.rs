use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdnsZone {
    #[serde(default)]
    pub id: String, // "/api/.../zones/example.com."
    pub name: String, // "example.com."
    #[serde(rename = "type", default)]
    pub zone_type: Option<String>, // "Zone"
    #[serde(default)]
    pub kind: String, // "Native", etc.
    #[serde(default)]
    pub rrsets: Option<Vec<PdnsRrset>>,
}

/// How a PATCH treats one RRset. Absent in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Replace,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsRrset {
    pub name: String, // "www.example.com."
    #[serde(rename = "type")]
    pub rrtype: String, // "A", "NS", ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changetype: Option<ChangeType>,
    #[serde(default)]
    pub records: Vec<PdnsRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<PdnsComment>,
}

impl PdnsRrset {
    /// A `REPLACE` of `name`/`rrtype` with exactly `records`.
    pub fn replace(
        name: impl Into<String>,
        rrtype: impl Into<String>,
        ttl: u32,
        records: Vec<PdnsRecord>,
    ) -> Self {
        Self {
            name: name.into(),
            rrtype: rrtype.into(),
            ttl: Some(ttl),
            changetype: Some(ChangeType::Replace),
            records,
            comments: Vec::new(),
        }
    }

    /// A `DELETE` of the whole `name`/`rrtype` bundle.
    pub fn delete(name: impl Into<String>, rrtype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rrtype: rrtype.into(),
            ttl: None,
            changetype: Some(ChangeType::Delete),
            records: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub fn is_delete(&self) -> bool {
        self.changetype == Some(ChangeType::Delete)
    }

    pub fn contents(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsRecord {
    pub content: String, // "192.0.2.1" or "ns1.example.net."
    #[serde(default)]
    pub disabled: bool,
}

impl PdnsRecord {
    pub fn enabled(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdnsComment {
    pub content: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub modified_at: i64,
}

// Used when creating a zone
#[derive(Debug, Serialize, Deserialize)]
pub struct PdnsZoneCreate {
    pub name: String,             // "example.com."
    pub kind: String,             // "Native"
    pub nameservers: Vec<String>, // left empty when the NS rrset is supplied
    #[serde(default)]
    pub rrsets: Vec<PdnsRrset>,
}

#[derive(Debug, Serialize)]
pub struct PdnsPatch<'a> {
    pub rrsets: &'a [PdnsRrset],
}

#[derive(Debug, Deserialize)]
pub struct PdnsExport {
    pub zone: String,
}
