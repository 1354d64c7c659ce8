use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://api.ubibot.com";
pub const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 2;
pub const MAX_SCAN_INTERVAL_MINUTES: u64 = 24 * 60;
pub const MAX_SCAN_INTERVAL: Duration = Duration::from_secs(MAX_SCAN_INTERVAL_MINUTES * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("account key must not be empty")]
    EmptyAccountKey,
    #[error("channel id must not be empty")]
    EmptyChannelId,
    #[error("scan interval must be at least one minute")]
    ZeroInterval,
    #[error("scan interval of {0} minutes exceeds one day")]
    IntervalTooLong(u64),
    #[error("request timeout must be positive")]
    ZeroTimeout,
    #[error("invalid api base url {0}")]
    InvalidApiBase(String),
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Account key and channel id of one configured device.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    account_key: String,
    channel_id: String,
}

impl Credentials {
    pub fn new(account_key: impl Into<String>, channel_id: impl Into<String>) -> Result<Self, ConfigError> {
        let account_key = account_key.into().trim().to_string();
        let channel_id = channel_id.into().trim().to_string();
        if account_key.is_empty() {
            return Err(ConfigError::EmptyAccountKey);
        }
        if channel_id.is_empty() {
            return Err(ConfigError::EmptyChannelId);
        }
        Ok(Self {
            account_key,
            channel_id,
        })
    }

    pub fn account_key(&self) -> &str {
        &self.account_key
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

// The account key grants API access; keep it out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_key", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub scan_interval: Duration,
    pub request_timeout: Duration,
    pub api_base: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_MINUTES * 60),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl PollConfig {
    pub fn with_interval_minutes(mut self, minutes: u64) -> Result<Self, ConfigError> {
        if minutes == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if minutes > MAX_SCAN_INTERVAL_MINUTES {
            return Err(ConfigError::IntervalTooLong(minutes));
        }
        let secs = minutes
            .checked_mul(60)
            .ok_or(ConfigError::IntervalTooLong(minutes))?;
        self.scan_interval = Duration::from_secs(secs);
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.request_timeout = timeout;
        Ok(self)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Result<Self, ConfigError> {
        let api_base = api_base.into();
        match reqwest::Url::parse(&api_base) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base() => {}
            _ => return Err(ConfigError::InvalidApiBase(api_base)),
        }
        self.api_base = api_base.trim_end_matches('/').to_string();
        Ok(self)
    }
}

/// Picks the scan interval of a config entry: options win over the initial
/// setup data, which wins over the default.
pub fn resolve_scan_interval(options: Option<u64>, data: Option<u64>) -> u64 {
    options
        .filter(|m| *m > 0)
        .or(data.filter(|m| *m > 0))
        .unwrap_or(DEFAULT_SCAN_INTERVAL_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_trimmed_and_required() {
        let creds = Credentials::new("  key ", "\t12345\n").expect("valid");
        assert_eq!(creds.account_key(), "key");
        assert_eq!(creds.channel_id(), "12345");

        assert_eq!(Credentials::new(" ", "1"), Err(ConfigError::EmptyAccountKey));
        assert_eq!(Credentials::new("k", ""), Err(ConfigError::EmptyChannelId));
    }

    #[test]
    fn debug_output_hides_account_key() {
        let creds = Credentials::new("super-secret", "42").expect("valid");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("42"));
    }

    #[test]
    fn default_poll_config_uses_two_minutes() {
        let config = PollConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(120));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert_eq!(
            PollConfig::default().with_interval_minutes(0).unwrap_err(),
            ConfigError::ZeroInterval
        );
        let config = PollConfig::default().with_interval_minutes(5).expect("valid");
        assert_eq!(config.scan_interval, Duration::from_secs(300));
    }

    #[test]
    fn oversized_interval_is_rejected() {
        assert_eq!(
            PollConfig::default().with_interval_minutes(u64::MAX).unwrap_err(),
            ConfigError::IntervalTooLong(u64::MAX)
        );
        assert_eq!(
            PollConfig::default().with_interval_minutes(u64::MAX / 60).unwrap_err(),
            ConfigError::IntervalTooLong(u64::MAX / 60)
        );
        let config = PollConfig::default()
            .with_interval_minutes(MAX_SCAN_INTERVAL_MINUTES)
            .expect("one day is allowed");
        assert_eq!(config.scan_interval, MAX_SCAN_INTERVAL);
    }

    #[test]
    fn api_base_must_be_http_url() {
        let config = PollConfig::default()
            .with_api_base("http://127.0.0.1:8080/")
            .expect("valid");
        assert_eq!(config.api_base, "http://127.0.0.1:8080");

        assert!(matches!(
            PollConfig::default().with_api_base("ftp://example.org"),
            Err(ConfigError::InvalidApiBase(_))
        ));
        assert!(PollConfig::default().with_api_base("not a url").is_err());
    }

    #[test]
    fn options_take_precedence_over_data() {
        assert_eq!(resolve_scan_interval(Some(10), Some(3)), 10);
        assert_eq!(resolve_scan_interval(None, Some(3)), 3);
        assert_eq!(resolve_scan_interval(Some(0), None), DEFAULT_SCAN_INTERVAL_MINUTES);
        assert_eq!(resolve_scan_interval(None, None), 2);
    }
}
