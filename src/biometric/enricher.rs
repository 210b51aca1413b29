//! Heart-rate enrichment protocol
//!
//! Per biometric tick: fetch with the current access token; if that fails,
//! refresh once, persist the new pair, and fetch exactly once more. Any
//! remaining failure leaves the heart rate unknown for that tick. Consecutive
//! failed ticks back off exponentially (in ticks) up to a configured cap.

use super::client::BiometricClient;
use super::tokens::TokenStore;
use super::HeartRateSource;
use crate::config::BiometricConfig;
use crate::error::FluxError;
use crate::types::TokenPair;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

/// Tick-skipping backoff after consecutive biometric failures
#[derive(Debug, Clone, Default)]
pub struct FailureBackoff {
    consecutive_failures: u32,
    skip_remaining: u32,
    max_skip: u32,
}

impl FailureBackoff {
    pub fn new(max_skip: u32) -> Self {
        Self {
            consecutive_failures: 0,
            skip_remaining: 0,
            max_skip,
        }
    }

    /// Consume one tick of backoff; true when this tick should be skipped
    pub fn should_skip(&mut self) -> bool {
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            true
        } else {
            false
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let exponent = (self.consecutive_failures - 1).min(31);
        self.skip_remaining = (1u32 << exponent).min(self.max_skip);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.skip_remaining = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Biometric enricher backed by the vendor API and a file token store
pub struct BiometricEnricher {
    client: BiometricClient,
    store: TokenStore,
    tokens: TokenPair,
    backoff: FailureBackoff,
}

impl BiometricEnricher {
    /// Build from config, loading the current token pair from the store
    pub fn from_config(config: &BiometricConfig) -> Result<Self, FluxError> {
        let store = TokenStore::new(&config.token_store);
        let tokens = store.load()?;
        let client = BiometricClient::new(config)?;
        Ok(Self::new(client, store, tokens, config.max_backoff_ticks))
    }

    pub fn new(
        client: BiometricClient,
        store: TokenStore,
        tokens: TokenPair,
        max_backoff_ticks: u32,
    ) -> Self {
        Self {
            client,
            store,
            tokens,
            backoff: FailureBackoff::new(max_backoff_ticks),
        }
    }

    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    /// Refresh the token pair, persisting it before use.
    ///
    /// Returns the new access token, or `None` if the provider refused.
    pub async fn refresh(&mut self) -> Option<String> {
        let tokens = self.client.refresh(&self.tokens.refresh_token).await?;

        if let Err(e) = self.store.save(&tokens) {
            // The provider may already have revoked the old refresh token,
            // so keep the new pair in memory even though it is not durable.
            error!(error = %e, path = %self.store.path().display(), "Failed to persist refreshed tokens");
        } else {
            info!("Access token refreshed");
        }

        let access = tokens.access_token.clone();
        self.tokens = tokens;
        Some(access)
    }

    async fn fetch_with_refresh(&mut self) -> Option<u32> {
        if let Some(hr) = self.client.fetch_heart_rate(&self.tokens.access_token).await {
            return Some(hr);
        }

        info!("Access token expired or invalid, attempting refresh");
        let access = match self.refresh().await {
            Some(access) => access,
            None => {
                warn!("Token refresh failed, heart rate unknown for this tick");
                return None;
            }
        };

        let hr = self.client.fetch_heart_rate(&access).await;
        if hr.is_none() {
            warn!("Heart rate still unavailable after refresh");
        }
        hr
    }
}

#[async_trait]
impl HeartRateSource for BiometricEnricher {
    async fn heart_rate(&mut self) -> Option<u32> {
        if self.backoff.should_skip() {
            debug!(
                failures = self.backoff.consecutive_failures(),
                "Skipping biometric tick (backoff)"
            );
            return None;
        }

        let hr = self.fetch_with_refresh().await;
        match hr {
            Some(bpm) => {
                self.backoff.record_success();
                debug!(bpm, "Most recent heart rate");
            }
            None => self.backoff.record_failure(),
        }
        hr
    }
}
