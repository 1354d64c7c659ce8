use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Credentials, PollConfig, MAX_SCAN_INTERVAL};
use crate::fetcher::{ChannelFetcher, FetchError};
use crate::normalize::normalize;
use crate::snapshot::CoordinatorState;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("device not ready: {0}")]
    NotReady(#[source] FetchError),
    #[error("another refresh is already running")]
    Busy,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Updated(Arc<CoordinatorState>),
    Failed {
        state: Arc<CoordinatorState>,
        error: FetchError,
    },
    /// A cycle was already in flight; nothing was fetched.
    Skipped,
}

/// Polls one channel and publishes a fresh [`CoordinatorState`] per cycle.
pub struct Coordinator<F: ChannelFetcher> {
    fetcher: F,
    credentials: Credentials,
    config: PollConfig,
    state_tx: watch::Sender<Arc<CoordinatorState>>,
    cycle_lock: Mutex<()>,
}

impl<F: ChannelFetcher> Coordinator<F> {
    pub fn create(fetcher: F, credentials: Credentials, config: PollConfig) -> Self {
        let (state_tx, _) = watch::channel(Arc::new(CoordinatorState::default()));
        Self {
            fetcher,
            credentials,
            config,
            state_tx,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn state(&self) -> Arc<CoordinatorState> {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<CoordinatorState>> {
        self.state_tx.subscribe()
    }

    /// Runs the initial cycle. The device must not be treated as ready when
    /// this fails.
    pub async fn first_refresh(&self) -> Result<Arc<CoordinatorState>, SetupError> {
        match self.refresh().await {
            CycleOutcome::Updated(state) => Ok(state),
            CycleOutcome::Failed { error, .. } => Err(SetupError::NotReady(error)),
            CycleOutcome::Skipped => Err(SetupError::Busy),
        }
    }

    pub async fn refresh(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            debug!(channel_id = %self.credentials.channel_id(), "cycle in flight, skipping");
            return CycleOutcome::Skipped;
        };

        let attempt_at = Utc::now();
        let started = Instant::now();
        let fetched = self.fetch_bounded().await;
        let previous = self.state();

        let outcome = match fetched {
            Ok(raw) => {
                let snapshot = normalize(&raw);
                info!(
                    channel_id = %self.credentials.channel_id(),
                    fields = snapshot.len(),
                    elapsed_ms = %started.elapsed().as_millis(),
                    "channel refreshed"
                );
                CycleOutcome::Updated(Arc::new(previous.succeeded(snapshot, attempt_at)))
            }
            Err(error) => {
                warn!(
                    channel_id = %self.credentials.channel_id(),
                    error = %error,
                    has_data = previous.has_data(),
                    "channel refresh failed"
                );
                CycleOutcome::Failed {
                    state: Arc::new(previous.failed(error.to_string(), attempt_at)),
                    error,
                }
            }
        };

        if let CycleOutcome::Updated(state) | CycleOutcome::Failed { state, .. } = &outcome {
            self.state_tx.send_replace(state.clone());
        }
        outcome
    }

    /// Polls every scan interval until `cancel` fires. The first tick is one
    /// interval out since [`Self::first_refresh`] already ran.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self
            .config
            .scan_interval
            .clamp(Duration::from_millis(1), MAX_SCAN_INTERVAL);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            channel_id = %self.credentials.channel_id(),
            interval_secs = period.as_secs(),
            "poll loop started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!("abandoning in-flight cycle");
                            break;
                        }
                        _ = self.refresh() => {}
                    }
                }
            }
        }

        info!(channel_id = %self.credentials.channel_id(), "poll loop stopped");
    }

    async fn fetch_bounded(&self) -> Result<serde_json::Value, FetchError> {
        let limit = self.config.request_timeout;
        match timeout(limit, self.fetcher.fetch(&self.credentials)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Transport(format!(
                "request timed out after {}ms",
                limit.as_millis()
            ))),
        }
    }
}

impl<F: ChannelFetcher + 'static> Coordinator<F> {
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run(cancel).await })
    }
}
