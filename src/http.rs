use crate::config::HttpOptions;
use crate::errors::{PayError, PayResult};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "rust_pay_rocket";

/// Fully prepared outbound request.
#[derive(Clone, Debug)]
pub struct Radar {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Radar {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw HTTP response. Header names are stored lowercase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, radar: &Radar) -> PayResult<HttpResponse>;
}

fn secs(field: &str, value: f64) -> PayResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| PayError::Configuration(format!("http {field} [{value}]: {e}")))
}

pub struct ReqwestHttpClient {
    http: Client,
}

impl ReqwestHttpClient {
    pub fn new(options: &HttpOptions) -> PayResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(secs("timeout_secs", options.timeout_secs)?)
            .connect_timeout(secs("connect_timeout_secs", options.connect_timeout_secs)?)
            .build()?;
        Ok(Self { http })
    }

    pub fn from_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, radar: &Radar) -> PayResult<HttpResponse> {
        debug!(method = %radar.method, url = %radar.url, "sending gateway request");
        let mut req = self.http.request(radar.method.clone(), &radar.url);
        for (k, v) in &radar.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &radar.body {
            req = req.body(body.clone());
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let mut headers = BTreeMap::new();
        for (k, v) in resp.headers() {
            if let Ok(s) = v.to_str() {
                headers.insert(k.as_str().to_ascii_lowercase(), s.to_string());
            }
        }
        let body = resp.text().await?;
        debug!(status, "gateway responded");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Rejects every request; handy where a provider must never reach the network.
pub struct OfflineHttpClient;

#[async_trait]
impl HttpClient for OfflineHttpClient {
    async fn send(&self, radar: &Radar) -> PayResult<HttpResponse> {
        Err(PayError::Transport(format!(
            "offline: refusing {} {}",
            radar.method, radar.url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = HttpResponse::new(200, "").with_header("Wechatpay-Serial", "ABC");
        assert_eq!(resp.header("wechatpay-serial"), Some("ABC"));
        assert_eq!(resp.header("WECHATPAY-SERIAL"), Some("ABC"));

        let radar = Radar::new(Method::GET, "https://x").header("Authorization", "t");
        assert_eq!(radar.header_value("authorization"), Some("t"));
    }

    #[test]
    fn invalid_timeouts_are_configuration_errors() {
        for (timeout, connect) in [(-1.0, 5.0), (5.0, f64::NAN), (f64::INFINITY, 5.0)] {
            let options = HttpOptions {
                timeout_secs: timeout,
                connect_timeout_secs: connect,
            };
            assert!(matches!(
                ReqwestHttpClient::new(&options),
                Err(PayError::Configuration(_))
            ));
        }
        assert!(ReqwestHttpClient::new(&HttpOptions::default()).is_ok());
    }

    #[tokio::test]
    async fn offline_client_is_a_transport_error() {
        let err = OfflineHttpClient
            .send(&Radar::new(Method::POST, "https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, PayError::Transport(_)));
    }
}
