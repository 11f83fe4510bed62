//! HTTP client for the audio-control daemon.
//!
//! Every endpoint is a GET on loopback.  Reads (`/apps`, `/icon`) use the
//! fetch budget; fire-and-forget writes and `/_log` use the mutation budget.
//! Both budgets are set on the request itself, so reqwest drops the
//! connection when they expire.

use std::time::Duration;

use dial_proto::config::Config;
use dial_proto::protocol::{AppEntry, IconResponse};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("daemon returned status {0}")]
    Status(StatusCode),
    #[error("malformed daemon response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
    fetch_timeout: Duration,
    mutation_timeout: Duration,
}

impl DaemonClient {
    pub fn new(
        base_url: impl Into<String>,
        fetch_timeout: Duration,
        mutation_timeout: Duration,
    ) -> Result<Self, DaemonError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dial-mixer/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetch_timeout,
            mutation_timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, DaemonError> {
        Self::new(
            config.daemon.base_url(),
            config.polling.fetch_timeout(),
            config.requests.mutation_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /apps`: the ordered list of controllable applications.
    pub async fn list_apps(&self) -> Result<Vec<AppEntry>, DaemonError> {
        self.get_json("/apps", &[], self.fetch_timeout).await
    }

    /// `GET /icon?pid=`. `None` when the daemon has no icon for the process.
    pub async fn fetch_icon(&self, pid: u32) -> Result<Option<String>, DaemonError> {
        let icon: IconResponse = self
            .get_json("/icon", &[("pid", pid.to_string())], self.fetch_timeout)
            .await?;
        Ok(icon.data_url.filter(|url| !url.is_empty()))
    }

    pub async fn set_volume(&self, name: &str, volume: f64) -> Result<(), DaemonError> {
        let query = [
            ("name", name.to_string()),
            ("vol", format_volume(volume)),
        ];
        self.get("/volume_set", &query, self.mutation_timeout)
            .await
            .map(drop)
    }

    pub async fn set_mute(&self, name: &str, mute: bool) -> Result<(), DaemonError> {
        let query = [("name", name.to_string()), ("mute", mute.to_string())];
        self.get("/mute_set", &query, self.mutation_timeout)
            .await
            .map(drop)
    }

    pub async fn exclude(&self, name: &str) -> Result<(), DaemonError> {
        self.get("/exclude", &[("name", name.to_string())], self.mutation_timeout)
            .await
            .map(drop)
    }

    pub async fn unexclude(&self, name: &str) -> Result<(), DaemonError> {
        self.get("/unexclude", &[("name", name.to_string())], self.mutation_timeout)
            .await
            .map(drop)
    }

    /// `GET /_log?m=`: diagnostic sink on the daemon's console.
    pub async fn log(&self, message: &str) -> Result<(), DaemonError> {
        self.get("/_log", &[("m", message.to_string())], self.mutation_timeout)
            .await
            .map(drop)
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<reqwest::Response, DaemonError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DaemonError::Status(response.status()));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, DaemonError> {
        let body = self.get(path, query, timeout).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Volume as sent on the wire: two decimals, no trailing noise from
/// accumulated float steps (`0.5 + 0.03` goes out as `0.53`).
pub fn format_volume(volume: f64) -> String {
    let rounded = (volume.clamp(0.0, 1.0) * 100.0).round() / 100.0;
    format!("{}", rounded)
}
