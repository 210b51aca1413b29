//! Biometric enrichment
//!
//! Heart rate from a wearable vendor API, with one-shot token refresh on
//! authorization failure. The vendor's initial OAuth grant is out of scope;
//! the token store must already hold a valid pair.

mod client;
mod enricher;
mod tokens;

pub use client::BiometricClient;
pub use enricher::{BiometricEnricher, FailureBackoff};
pub use tokens::TokenStore;

use async_trait::async_trait;

/// Source of the current heart rate for a sampling tick
#[async_trait]
pub trait HeartRateSource: Send {
    /// Current heart rate in bpm, `None` when unavailable this tick
    async fn heart_rate(&mut self) -> Option<u32>;
}
