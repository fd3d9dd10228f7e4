//! Chain-tip retrieval.
//!
//! Signing requests that omit their consensus state fall back to the
//! current tip, fetched from an explorer. The network parameters are
//! fetched once and cached; the state is refreshed at most once per poll
//! interval.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use vaultd_types::{ConsensusState, Network};

/// The default interval between tip refreshes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Errors produced while fetching the chain tip.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The explorer request failed.
    #[error("explorer request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The explorer answered with a non-success status.
    #[error("unexpected status code: {0}")]
    Status(u16),
}

/// Provides the current consensus state of the chain.
#[async_trait]
pub trait Chain: Send + Sync {
    /// Returns the state at the current chain tip.
    async fn tip_state(&self) -> Result<ConsensusState, ChainError>;
}

struct Cached {
    network: Network,
    state: ConsensusState,
    fetched_at: Instant,
}

/// A [`Chain`] backed by an explorer's HTTP API.
pub struct ExplorerClient {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    cached: tokio::sync::Mutex<Option<Cached>>,
}

impl ExplorerClient {
    /// Creates a client for an explorer at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// Overrides the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The explorer URL for a named network preset, or `None` if the name
    /// is unknown.
    #[must_use]
    pub fn preset_url(network: &str) -> Option<&'static str> {
        match network {
            "mainnet" => Some("https://api.siascan.com"),
            "zen" => Some("https://api.siascan.com/zen"),
            _ => None,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChainError::Status(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Chain for ExplorerClient {
    async fn tip_state(&self) -> Result<ConsensusState, ChainError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.fetched_at.elapsed() < self.poll_interval {
                return Ok(entry.state.clone());
            }
        }

        // The network parameters never change; fetch them only once.
        let network = match cached.as_ref() {
            Some(entry) => entry.network.clone(),
            None => self.get_json::<Network>("/consensus/network").await?,
        };
        let mut state: ConsensusState = self.get_json("/consensus/state").await?;
        state.network = network.clone();
        debug!(height = state.index.height, "refreshed chain tip");

        *cached = Some(Cached {
            network,
            state: state.clone(),
            fetched_at: Instant::now(),
        });
        Ok(state)
    }
}
