//! HTTP client for talking to the controller: timeouts and TLS policy

use crate::config::ControllerConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Response};
use std::time::Duration;

/// One connection pool shared by every authorization.
///
/// The client carries no cookie store: each authorization captures the
/// controller's session cookies itself, so guests never share a session.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    pub fn new(cfg: &ControllerConfig) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("unifi-guest-portal/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if cfg.disable_tls {
            tracing::warn!("TLS certificate verification is disabled for the controller");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout))
            .danger_accept_invalid_certs(cfg.disable_tls)
            .default_headers(headers)
            .build()?;

        Ok(Self { inner: client })
    }

    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> reqwest::Result<Response> {
        self.inner.post(url).json(body).send().await
    }

    pub async fn post_json_with_headers<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        headers: HeaderMap,
    ) -> reqwest::Result<Response> {
        self.inner.post(url).headers(headers).json(body).send().await
    }
}
