use async_trait::async_trait;
use reqwest::{Client, header, redirect};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::powerdns::transport::{ApiResponse, Method, Transport};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct PowerDnsClient {
    http: Client,
    base_url: String, // e.g. "http://127.0.0.1:8081/api/v1"
    api_key: String,
    server_id: String, // usually "localhost"
}

impl PowerDnsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        server_id: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        // a misconfigured endpoint that redirects to https must fail loudly
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Connect(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            server_id: server_id.into(),
        })
    }

    fn auth_header(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("X-API-Key", &self.api_key)
            .header(header::ACCEPT, "application/json")
    }

    fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            warn!("stripping `/' from endpoint `{path}'");
            path.trim_start_matches('/')
        } else {
            path
        };
        if path.contains("servers/") || path == "servers" {
            format!("{}/{}", self.base_url, path)
        } else {
            format!("{}/servers/{}/{}", self.base_url, self.server_id, path)
        }
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let req = match method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
            Method::Put => self.http.put(url),
            Method::Patch => self.http.patch(url),
            Method::Delete => self.http.delete(url),
        };
        self.auth_header(req)
    }
}

#[async_trait]
impl Transport for PowerDnsClient {
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ProviderError> {
        let url = self.url(path);
        debug!(%method, %url, "PowerDNS request");

        let mut req = self.request(method, &url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let res = req
            .send()
            .await
            .map_err(|e| ProviderError::Connect(e.to_string()))?;

        let status = res.status();
        if status.is_redirection() {
            let location = res
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            return Err(ProviderError::Redirect {
                status: status.as_u16(),
                location,
            });
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| ProviderError::Connect(e.to_string()))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok(ApiResponse::new(status.as_u16(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PowerDnsClient {
        PowerDnsClient::new("http://127.0.0.1:8081/api/v1/", "secret", "localhost").unwrap()
    }

    #[test]
    fn relative_paths_are_scoped_to_server() {
        assert_eq!(
            client().url("zones/example.com."),
            "http://127.0.0.1:8081/api/v1/servers/localhost/zones/example.com."
        );
    }

    #[test]
    fn server_paths_are_left_alone() {
        assert_eq!(
            client().url("servers/localhost/zones"),
            "http://127.0.0.1:8081/api/v1/servers/localhost/zones"
        );
        assert_eq!(client().url("servers"), "http://127.0.0.1:8081/api/v1/servers");
    }

    #[test]
    fn leading_slash_is_stripped() {
        assert_eq!(
            client().url("/cache/flush?domain=example.com."),
            "http://127.0.0.1:8081/api/v1/servers/localhost/cache/flush?domain=example.com."
        );
    }
}
