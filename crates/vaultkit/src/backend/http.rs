//! HTTP backend.
//!
//! Talks to the server's `/v1/` API with a token header. Listing uses
//! `GET <path>?list=true`, which the server treats the same as `LIST`.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{Data, Health, Listing, Secret};
use ureq::tls::TlsConfig;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Backend that performs real HTTP requests.
///
/// # Example
///
/// ```no_run
/// use vaultkit::backend::{Backend, HttpBackend};
///
/// let backend = HttpBackend::new("https://vault.example.com:8200", Some("s.token".into()), false);
/// let health = backend.health().unwrap();
/// println!("server version {}", health.version);
/// ```
pub struct HttpBackend {
    agent: ureq::Agent,
    address: String,
    token: Option<String>,
}

impl HttpBackend {
    /// Create a backend for a server address.
    ///
    /// `skip_verify` disables TLS certificate verification.
    #[must_use]
    pub fn new(address: impl Into<String>, token: Option<String>, skip_verify: bool) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(TlsConfig::builder().disable_verification(skip_verify).build())
            .build();
        Self {
            agent: config.into(),
            address: address.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Server address, without trailing slash.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    fn authed<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token.as_str()),
            None => request,
        }
    }

    /// Turn a response into `(status, body)`.
    fn finish(
        path: &str,
        response: std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<(u16, String)> {
        let mut response = response.map_err(|e| Error::transport(path, e))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::transport(path, e))?;
        Ok((status, body))
    }
}

/// Interpret a response body as a `data` section.
///
/// `404` counts as "nothing there" only when `missing_ok` is set; endpoints
/// such as `sys/auth` answer with the mounts both inside `data` and at the
/// top level, so the top-level object is used when `data` is absent.
fn parse_data(path: &str, status: u16, body: &str, missing_ok: bool) -> Result<Option<Data>> {
    if status == 404 && missing_ok {
        return Ok(None);
    }
    if !(200..300).contains(&status) {
        return Err(Error::from_response(path, status, body));
    }
    if body.trim().is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| Error::invalid(path, e))?;
    match value {
        serde_json::Value::Object(mut object) => match object.remove("data") {
            Some(serde_json::Value::Object(data)) => Ok(Some(data)),
            Some(serde_json::Value::Null) | None => Ok(Some(object)),
            Some(other) => Err(Error::invalid(path, format!("unexpected data section: {other}"))),
        },
        other => Err(Error::invalid(path, format!("expected an object, got {other}"))),
    }
}

impl Backend for HttpBackend {
    fn read(&self, path: &str) -> Result<Option<Secret>> {
        let response = self.authed(self.agent.get(&self.url(path))).call();
        let (status, body) = Self::finish(path, response)?;
        Ok(parse_data(path, status, &body, true)?.map(Secret::new))
    }

    fn list(&self, path: &str) -> Result<Option<Listing>> {
        let url = format!("{}?list=true", self.url(path.trim_end_matches('/')));
        let response = self.authed(self.agent.get(&url)).call();
        let (status, body) = Self::finish(path, response)?;
        parse_data(path, status, &body, true)?
            .map(|data| {
                serde_json::from_value(serde_json::Value::Object(data))
                    .map_err(|e| Error::invalid(path, e))
            })
            .transpose()
    }

    fn write(&self, path: &str, data: &Data) -> Result<Option<Secret>> {
        let response = self.authed(self.agent.post(&self.url(path))).send_json(data);
        let (status, body) = Self::finish(path, response)?;
        Ok(parse_data(path, status, &body, false)?.map(Secret::new))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let response = self.authed(self.agent.delete(&self.url(path))).call();
        let (status, body) = Self::finish(path, response)?;
        parse_data(path, status, &body, false).map(|_| ())
    }

    fn health(&self) -> Result<Health> {
        let path = "sys/health";
        let response = self
            .agent
            .get(&self.url("sys/health?standbyok=true"))
            .call();
        let (status, body) = Self::finish(path, response)?;
        // Sealed and uninitialized servers answer 5xx with a regular body.
        serde_json::from_str(&body).map_err(|_| Error::from_response(path, status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let backend = HttpBackend::new("https://vault:8200/", None, false);
        assert_eq!(backend.address(), "https://vault:8200");
        assert_eq!(backend.url("/sys/auth"), "https://vault:8200/v1/sys/auth");
    }

    #[test]
    fn test_empty_token_is_dropped() {
        let backend = HttpBackend::new("http://localhost:8200", Some(String::new()), false);
        assert!(backend.token.is_none());
    }

    #[test]
    fn test_parse_data_unwraps_data_section() {
        let data = parse_data("x", 200, r#"{"data":{"a":1},"lease_id":""}"#, false)
            .unwrap()
            .unwrap();
        assert_eq!(data["a"], 1);
    }

    #[test]
    fn test_parse_data_falls_back_to_top_level() {
        let data = parse_data("sys/auth", 200, r#"{"token/":{"type":"token"}}"#, false)
            .unwrap()
            .unwrap();
        assert!(data.contains_key("token/"));
    }

    #[test]
    fn test_parse_data_missing_and_empty() {
        assert!(parse_data("x", 404, "", true).unwrap().is_none());
        assert!(parse_data("x", 204, "", false).unwrap().is_none());

        let err = parse_data("x", 404, r#"{"errors":[]}"#, false).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::NotFound);
    }

    #[test]
    fn test_parse_data_reports_server_errors() {
        let err = parse_data("sys/mounts/aws", 400, r#"{"errors":["path is already in use"]}"#, true)
            .unwrap_err();
        assert!(err.to_string().contains("path is already in use"));
    }
}
