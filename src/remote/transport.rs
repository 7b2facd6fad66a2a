use crate::error::{RemoteError, TetherError};
use crate::tether::config::TetherConfig;
use crate::tether::throttle::RequestThrottle;
use crate::tether::util::truncate_with_ellipsis;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const ERROR_BODY_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Patch => "PATCH",
        }
    }
}

/// Outbound JSON request/response channel to the remote workspace service.
pub trait Transport {
    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError>;
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
    throttle: Mutex<RequestThrottle>,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
        min_interval: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            throttle: Mutex::new(RequestThrottle::new(min_interval)),
        })
    }

    pub fn from_config(cfg: &TetherConfig) -> Result<Self> {
        let base_url = cfg
            .remote
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(TetherError::MissingBaseUrl)?;
        Self::new(
            base_url,
            cfg.api_token(),
            Duration::from_secs(cfg.remote.timeout_secs.max(1)),
            Duration::from_millis(cfg.remote.min_request_interval_ms),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Transport for HttpTransport {
    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        match self.throttle.lock() {
            Ok(mut throttle) => {
                throttle.wait_turn();
            }
            Err(poisoned) => {
                poisoned.into_inner().wait_turn();
            }
        }

        let url = self.url_for(path);
        debug!(method = method.as_str(), url = %url, "remote request");
        let mut request = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Patch => self.client.patch(&url),
        };
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(RemoteError::from_status(
                status.as_u16(),
                path,
                truncate_with_ellipsis(text.trim(), ERROR_BODY_MAX_CHARS),
            ));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|err| RemoteError::Payload(format!("{path}: {err}")))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_base_url_is_a_config_error() {
        let cfg = TetherConfig::default();
        let err = HttpTransport::from_config(&cfg)
            .err()
            .expect("missing base url should fail");
        assert!(err.to_string().contains("base url is not configured"));
    }

    #[test]
    fn urls_join_without_doubled_slashes() {
        let transport = HttpTransport::new(
            "https://api.example.test/v1/",
            None,
            Duration::from_secs(5),
            Duration::ZERO,
        )
        .expect("transport");
        assert_eq!(transport.base_url(), "https://api.example.test/v1");
        assert_eq!(
            transport.url_for("/projects/42"),
            "https://api.example.test/v1/projects/42"
        );
    }
}
