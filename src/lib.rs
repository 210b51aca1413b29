//! Valence Flux - Real-time affective valence pipeline
//!
//! Flux turns per-frame emotion classifier scores into a smoothed valence
//! signal and relays it to a remote endpoint. Two processes cooperate through
//! an append-only log file:
//!
//! - **Capture** (producer): scores → valence → EWMA smoothing → heart-rate
//!   enrichment → append to the log
//! - **Sync** (consumer): snapshot the log → parse the latest row → POST it
//!   to the endpoint with CSRF bootstrap and retry-by-polling
//!
//! ## Modules
//!
//! - [`valence`]: score vector → valence scalar
//! - [`smoothing`]: streaming EWMA
//! - [`log`] / [`snapshot`]: the shared log, writer and reader sides
//! - [`biometric`]: heart rate with token refresh
//! - [`pipeline`] / [`sync`]: the two process loops

pub mod biometric;
pub mod config;
pub mod error;
pub mod log;
pub mod pipeline;
pub mod smoothing;
pub mod snapshot;
pub mod sync;
pub mod types;
pub mod valence;

pub use config::FluxConfig;
pub use error::FluxError;
pub use pipeline::{AffectSession, CapturePipeline};
pub use snapshot::SnapshotReader;
pub use sync::{SyncClient, TickOutcome};
pub use types::{EmotionScoreVector, LatestRecord, SmoothedReading, TokenPair};
pub use valence::calculate_valence;

/// Flux version
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "valence-flux";
