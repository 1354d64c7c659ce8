use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, Credentials, PollConfig};

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {status}: {reason}")]
    HttpStatus { status: u16, reason: String },
    #[error("payload is not valid json: {0}")]
    PayloadDecode(String),
    #[error("invalid request configuration: {0}")]
    Config(#[from] ConfigError),
}

#[async_trait]
pub trait ChannelFetcher: Send + Sync {
    /// Returns the raw channel envelope exactly as the vendor sent it.
    async fn fetch(&self, credentials: &Credentials) -> Result<serde_json::Value, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    api_base: String,
}

impl HttpFetcher {
    pub fn new(config: &PollConfig) -> Result<Self, ConfigError> {
        base_url(&config.api_base)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("ubibot-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
        })
    }

    pub fn channel_url(&self, credentials: &Credentials) -> Result<Url, ConfigError> {
        channel_url(&self.api_base, credentials)
    }
}

fn base_url(api_base: &str) -> Result<Url, ConfigError> {
    match Url::parse(api_base) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base() => Ok(url),
        _ => Err(ConfigError::InvalidApiBase(api_base.to_string())),
    }
}

pub fn channel_url(api_base: &str, credentials: &Credentials) -> Result<Url, ConfigError> {
    let mut url = base_url(api_base)?;
    url.path_segments_mut()
        .map_err(|_| ConfigError::InvalidApiBase(api_base.to_string()))?
        .pop_if_empty()
        .push("channels")
        .push(credentials.channel_id());
    url.query_pairs_mut()
        .append_pair("account_key", credentials.account_key());
    Ok(url)
}

#[async_trait]
impl ChannelFetcher for HttpFetcher {
    async fn fetch(&self, credentials: &Credentials) -> Result<serde_json::Value, FetchError> {
        let url = self.channel_url(credentials)?;
        debug!(channel_id = %credentials.channel_id(), "requesting channel");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::Transport(describe_transport(&err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let body = response
            .text()
            .await
            .map_err(|err| FetchError::Transport(describe_transport(&err)))?;

        serde_json::from_str(&body).map_err(|err| FetchError::PayloadDecode(err.to_string()))
    }
}

fn status_error(status: StatusCode) -> FetchError {
    FetchError::HttpStatus {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("unknown").to_string(),
    }
}

// reqwest errors print the full url, which includes the account key.
fn describe_transport(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "failed to read response body"
    } else {
        "request failed"
    };
    let cause = std::error::Error::source(err)
        .map(|source| source.to_string())
        .unwrap_or_default();
    if cause.is_empty() {
        kind.to_string()
    } else {
        format!("{kind}: {cause}")
    }
}
