use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and parsed body of one API call. `Value::Null` for empty bodies.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body of a 2xx response, the classified failure otherwise.
    pub fn into_result(self) -> Result<Value, ProviderError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(ProviderError::from_response(self.status, &self.body))
        }
    }

    /// Like [`ApiResponse::into_result`] but a 2xx other than `expected` is
    /// also a failure.
    pub fn expect_status(self, expected: u16) -> Result<Value, ProviderError> {
        let actual = self.status;
        let body = self.into_result()?;
        if actual != expected {
            return Err(ProviderError::UnexpectedStatus { expected, actual });
        }
        Ok(body)
    }
}

/// Executes calls against the PowerDNS HTTP API.
///
/// Paths are relative to `servers/<server-id>/` unless they already name a
/// server. Non-2xx responses are returned, not raised; only failures to get
/// a response at all (and refused redirects) are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ProviderError>;
}
