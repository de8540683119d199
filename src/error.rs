// src/error.rs
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to connect to PowerDNS API service: {0}")]
    Connect(String),

    #[error("not following {status} redirect to {location}")]
    Redirect { status: u16, location: String },

    #[error("PowerDNS rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("PowerDNS reported internal error ({status}), check server log")]
    Server { status: u16 },

    #[error("unexpected response status {actual} (expected {expected})")]
    UnexpectedStatus { expected: u16, actual: u16 },

    #[error("malformed PowerDNS response: {0}")]
    Decode(String),

    #[error("unsupported record type `{0}'")]
    UnsupportedType(String),

    #[error("cannot add/remove SOA record directly")]
    SoaMutation,

    #[error("cannot edit SOA record as non-admin")]
    SoaEditDenied,

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("domain `{0}' not owned by account")]
    NotOwned(String),

    #[error("provider misconfigured: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        ProviderError::InvalidRecord(msg.into())
    }

    pub fn decode<E: std::fmt::Display>(err: E) -> Self {
        ProviderError::Decode(err.to_string())
    }

    /// Classify a non-2xx response. 4xx bodies are searched for a reason.
    pub fn from_response(status: u16, body: &Value) -> Self {
        if status >= 500 {
            return ProviderError::Server { status };
        }
        let reason = extract_reason(body).unwrap_or_else(|| reason_phrase(status));
        ProviderError::Rejected { status, reason }
    }

    /// True for failures raised before any request was sent.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            ProviderError::UnsupportedType(_)
                | ProviderError::SoaMutation
                | ProviderError::SoaEditDenied
                | ProviderError::InvalidDomain(_)
                | ProviderError::InvalidRecord(_)
                | ProviderError::NotOwned(_)
                | ProviderError::Config(_)
        )
    }
}

/// `error` on current API versions, `errors[0].reason` on older ones.
pub fn extract_reason(body: &Value) -> Option<String> {
    if let Some(reason) = body.get("error").and_then(Value::as_str) {
        return Some(reason.to_string());
    }
    body.pointer("/errors/0/reason")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn reason_phrase(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown error")
        .to_string()
}
