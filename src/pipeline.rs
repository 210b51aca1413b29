//! Capture pipeline orchestration
//!
//! Producer side of the system. Each sampling tick runs:
//! 1. Valence calculation from the classifier's score vector
//! 2. EWMA smoothing (state owned by [`AffectSession`], no globals)
//! 3. Heart-rate enrichment every `heart_rate_every` ticks
//! 4. Append to the persistent log

use crate::biometric::{BiometricEnricher, HeartRateSource};
use crate::config::FluxConfig;
use crate::error::FluxError;
use crate::log::ReadingLog;
use crate::smoothing::{round_to, EwmaSmoother};
use crate::types::{EmotionScoreVector, SmoothedReading, ValenceSample};
use crate::valence::calculate_valence;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn};

/// Valence + smoothing state for one continuous capture session.
///
/// Outputs are only meaningful for an uninterrupted run: restarting a
/// session restarts the filter from its first sample.
#[derive(Debug, Clone)]
pub struct AffectSession {
    smoother: EwmaSmoother,
    precision: u32,
}

impl AffectSession {
    pub fn new(window: f64, precision: u32) -> Result<Self, FluxError> {
        Ok(Self {
            smoother: EwmaSmoother::new(window)?,
            precision,
        })
    }

    /// Score one frame, returning the raw sample and the rounded smoothed value
    pub fn observe(&mut self, scores: &EmotionScoreVector, at: DateTime<Utc>) -> (ValenceSample, f64) {
        let sample = ValenceSample {
            timestamp: at,
            raw_valence: calculate_valence(scores),
        };
        let smoothed = round_to(self.smoother.update(sample.raw_valence), self.precision);
        (sample, smoothed)
    }

    /// Latest smoothed value, unrounded
    pub fn current(&self) -> Option<f64> {
        self.smoother.current()
    }

    pub fn sample_count(&self) -> u64 {
        self.smoother.sample_count()
    }
}

/// Counters reported when a capture run ends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    pub lines_read: u64,
    pub readings_written: u64,
    pub lines_skipped: u64,
}

/// Stateful producer: session, log, and optional heart-rate source
pub struct CapturePipeline {
    session: AffectSession,
    log: ReadingLog,
    heart: Option<Box<dyn HeartRateSource>>,
    heart_rate_every: u64,
    ticks: u64,
    recent_heart_rate: Option<u32>,
}

impl CapturePipeline {
    pub fn new(
        session: AffectSession,
        log: ReadingLog,
        heart: Option<Box<dyn HeartRateSource>>,
        heart_rate_every: u64,
    ) -> Self {
        Self {
            session,
            log,
            heart,
            heart_rate_every: heart_rate_every.max(1),
            ticks: 0,
            recent_heart_rate: None,
        }
    }

    /// Build the pipeline described by `config`.
    ///
    /// A biometric source that cannot be initialised (e.g. no token file) is
    /// logged and skipped; valence capture proceeds without heart rate.
    pub fn from_config(config: &FluxConfig) -> Result<Self, FluxError> {
        let session = AffectSession::new(config.capture.window, config.capture.precision)?;
        let log = ReadingLog::open(&config.log.path, config.capture.precision)?;

        let heart: Option<Box<dyn HeartRateSource>> = if config.biometric.enabled {
            match BiometricEnricher::from_config(&config.biometric) {
                Ok(enricher) => Some(Box::new(enricher)),
                Err(e) => {
                    warn!(error = %e, "Biometric enrichment disabled");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(session, log, heart, config.capture.heart_rate_every))
    }

    pub fn session(&self) -> &AffectSession {
        &self.session
    }

    /// Process one frame stamped with the current time
    pub async fn ingest(&mut self, scores: &EmotionScoreVector) -> Result<SmoothedReading, FluxError> {
        self.ingest_at(scores, Utc::now()).await
    }

    /// Process one frame and append the resulting reading to the log
    pub async fn ingest_at(
        &mut self,
        scores: &EmotionScoreVector,
        at: DateTime<Utc>,
    ) -> Result<SmoothedReading, FluxError> {
        if self.ticks % self.heart_rate_every == 0 {
            if let Some(heart) = self.heart.as_mut() {
                self.recent_heart_rate = heart.heart_rate().await;
                if let Some(bpm) = self.recent_heart_rate {
                    info!(bpm, "Most recent heart rate");
                }
            }
        }
        self.ticks += 1;

        let (sample, smoothed) = self.session.observe(scores, at);
        let reading = SmoothedReading {
            timestamp: sample.timestamp,
            smoothed_valence: smoothed,
            heart_rate: self.recent_heart_rate,
        };
        debug!(raw = sample.raw_valence, smoothed, "Valence sample");

        self.log.append(&reading)?;
        Ok(reading)
    }

    /// Consume newline-delimited score vectors until EOF or Ctrl-C.
    ///
    /// Malformed lines and failed appends are logged and skipped; only a
    /// failure to read the input itself ends the run with an error.
    pub async fn run<R>(&mut self, input: R) -> Result<CaptureSummary, FluxError>
    where
        R: AsyncBufRead + Unpin,
    {
        self.run_until(input, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for interrupt, running until EOF");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Consume score vectors until EOF or until `shutdown` resolves.
    ///
    /// The shutdown future lives for the whole run, so a signal raised while
    /// a frame is being ingested ends the run right after that frame.
    pub async fn run_until<R, F>(&mut self, input: R, shutdown: F) -> Result<CaptureSummary, FluxError>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = CaptureSummary::default();
        let mut lines = input.lines();

        info!(path = %self.log.path().display(), "Capture started");
        loop {
            let next = tokio::select! {
                _ = &mut shutdown => {
                    info!("Capture interrupted");
                    break;
                }
                next = lines.next_line() => next?,
            };
            let Some(line) = next else {
                break;
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            summary.lines_read += 1;

            let scores = match EmotionScoreVector::from_json_line(trimmed) {
                Ok(scores) => scores,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed score line");
                    summary.lines_skipped += 1;
                    continue;
                }
            };

            match self.ingest(&scores).await {
                Ok(_) => summary.readings_written += 1,
                Err(e) => {
                    error!(error = %e, "Failed to record reading");
                    summary.lines_skipped += 1;
                }
            }
        }

        info!(
            read = summary.lines_read,
            written = summary.readings_written,
            skipped = summary.lines_skipped,
            "Capture finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoothing::ewma_series;
    use crate::snapshot::SnapshotReader;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    struct ScriptedHeart {
        script: VecDeque<Option<u32>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HeartRateSource for ScriptedHeart {
        async fn heart_rate(&mut self) -> Option<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.pop_front().flatten()
        }
    }

    /// Raises shutdown from inside the heart-rate fetch, i.e. mid-ingest
    struct InterruptingHeart {
        interrupt: Option<oneshot::Sender<()>>,
    }

    #[async_trait]
    impl HeartRateSource for InterruptingHeart {
        async fn heart_rate(&mut self) -> Option<u32> {
            if let Some(tx) = self.interrupt.take() {
                let _ = tx.send(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            Some(64)
        }
    }

    fn scores(happy: f64, sad: f64, neutral: f64) -> EmotionScoreVector {
        EmotionScoreVector::new([happy, 0.0, sad, 0.0, 0.0, 0.0, neutral]).unwrap()
    }

    #[test]
    fn test_session_smooths_valence() {
        let mut session = AffectSession::new(10.0, 4).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();

        let (first, smoothed) = session.observe(&scores(0.0, 0.9, 0.1), at);
        assert_eq!(first.raw_valence, 0.0);
        assert_eq!(smoothed, 0.0);

        let (second, smoothed) = session.observe(&scores(0.9, 0.0, 0.1), at);
        assert_eq!(second.raw_valence, 1.0);
        assert_eq!(smoothed, 0.1818);
        assert_eq!(session.sample_count(), 2);
    }

    #[tokio::test]
    async fn test_ingest_polls_heart_rate_on_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let heart = ScriptedHeart {
            script: VecDeque::from(vec![Some(70), None]),
            calls: Arc::clone(&calls),
        };
        let log = ReadingLog::open(dir.path().join("valence.csv"), 4).unwrap();
        let mut pipeline = CapturePipeline::new(
            AffectSession::new(10.0, 4).unwrap(),
            log,
            Some(Box::new(heart)),
            3,
        );

        let mut heart_rates = Vec::new();
        for _ in 0..5 {
            let reading = pipeline.ingest(&scores(0.5, 0.1, 0.0)).await.unwrap();
            heart_rates.push(reading.heart_rate);
        }

        // polled on ticks 0 and 3; value carried between polls, cleared on failure
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(heart_rates, vec![Some(70), Some(70), Some(70), None, None]);
    }

    #[tokio::test]
    async fn test_run_writes_smoothed_rows_and_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valence.csv");
        let log = ReadingLog::open(&path, 4).unwrap();
        let mut pipeline =
            CapturePipeline::new(AffectSession::new(10.0, 4).unwrap(), log, None, 10);

        let input = concat!(
            "[0.0, 0.0, 0.9, 0.0, 0.0, 0.0, 0.1]\n",
            "not json\n",
            "\n",
            "{\"happy\":0.9,\"surprise\":0.0,\"sad\":0.0,\"anger\":0.0,\"disgust\":0.0,\"fear\":0.0,\"neutral\":0.1}\n",
            "[0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.9]\n",
        );
        let summary = pipeline.run(input.as_bytes()).await.unwrap();

        assert_eq!(
            summary,
            CaptureSummary {
                lines_read: 4,
                readings_written: 3,
                lines_skipped: 1,
            }
        );

        let expected = ewma_series(&[0.0, 1.0, 0.5], 10.0).unwrap();
        let latest = SnapshotReader::new(&path).latest().unwrap().unwrap();
        assert_eq!(latest.valence, format!("{:.4}", round_to(expected[2], 4)));
        assert_eq!(latest.heart_rate, "");

        let rows = std::fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(rows, 4);
    }

    #[tokio::test]
    async fn test_interrupt_during_ingest_ends_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valence.csv");
        let (tx, rx) = oneshot::channel();
        let heart = InterruptingHeart { interrupt: Some(tx) };
        let log = ReadingLog::open(&path, 4).unwrap();
        let mut pipeline = CapturePipeline::new(
            AffectSession::new(10.0, 4).unwrap(),
            log,
            Some(Box::new(heart)),
            1,
        );

        // Writer stays open, so only the shutdown signal can end the run
        let (mut writer, reader) = tokio::io::duplex(1024);
        writer
            .write_all(b"[0.8, 0.0, 0.2, 0.0, 0.0, 0.0, 0.1]\n")
            .await
            .unwrap();

        let shutdown = async {
            let _ = rx.await;
        };
        let summary = tokio::time::timeout(
            Duration::from_secs(3),
            pipeline.run_until(tokio::io::BufReader::new(reader), shutdown),
        )
        .await
        .expect("interrupt raised during ingest must end the run")
        .unwrap();

        assert_eq!(summary.readings_written, 1);
        let latest = SnapshotReader::new(&path).latest().unwrap().unwrap();
        assert_eq!(latest.heart_rate, "64");
        drop(writer);
    }
}
