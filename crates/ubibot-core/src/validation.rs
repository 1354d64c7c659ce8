use thiserror::Error;
use tracing::{info, warn};

use crate::config::Credentials;
use crate::fetcher::{ChannelFetcher, FetchError};

/// Reasons a credential check rejects a new device configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("failed to connect to the UbiBot API")]
    CannotConnect,
    #[error("account key was rejected")]
    Unauthorized,
    #[error("channel not found")]
    ChannelNotFound,
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl ValidationError {
    /// Stable key a setup form can translate.
    pub fn error_key(&self) -> &'static str {
        match self {
            Self::CannotConnect => "cannot_connect",
            Self::Unauthorized => "invalid_auth",
            Self::ChannelNotFound => "channel_not_found",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<FetchError> for ValidationError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transport(_) => Self::CannotConnect,
            FetchError::HttpStatus { status: 401, .. } => Self::Unauthorized,
            FetchError::HttpStatus { status: 404, .. } => Self::ChannelNotFound,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Issues one test fetch with the given credentials.
pub async fn validate_credentials<F: ChannelFetcher + ?Sized>(
    fetcher: &F,
    credentials: &Credentials,
) -> Result<(), ValidationError> {
    match fetcher.fetch(credentials).await {
        Ok(_) => {
            info!(channel_id = %credentials.channel_id(), "credentials accepted");
            Ok(())
        }
        Err(err) => {
            warn!(channel_id = %credentials.channel_id(), error = %err, "credential check failed");
            Err(err.into())
        }
    }
}
