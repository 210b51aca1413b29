//! Core types for the Valence Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: classifier scores, raw valence samples, smoothed readings, the
//! on-disk latest record seen by the consumer, and biometric tokens.

use crate::error::FluxError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Emotion categories in the fixed order emitted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionCategory {
    Happy,
    Surprise,
    Sad,
    Anger,
    Disgust,
    Fear,
    Neutral,
}

impl EmotionCategory {
    /// All categories, in classifier output order
    pub const ALL: [EmotionCategory; 7] = [
        EmotionCategory::Happy,
        EmotionCategory::Surprise,
        EmotionCategory::Sad,
        EmotionCategory::Anger,
        EmotionCategory::Disgust,
        EmotionCategory::Fear,
        EmotionCategory::Neutral,
    ];

    /// Categories that contribute to positive affect
    pub const POSITIVE: [EmotionCategory; 2] = [EmotionCategory::Happy, EmotionCategory::Surprise];

    /// Categories that contribute to negative affect
    pub const NEGATIVE: [EmotionCategory; 4] = [
        EmotionCategory::Sad,
        EmotionCategory::Anger,
        EmotionCategory::Disgust,
        EmotionCategory::Fear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionCategory::Happy => "happy",
            EmotionCategory::Surprise => "surprise",
            EmotionCategory::Sad => "sad",
            EmotionCategory::Anger => "anger",
            EmotionCategory::Disgust => "disgust",
            EmotionCategory::Fear => "fear",
            EmotionCategory::Neutral => "neutral",
        }
    }

    /// Position of this category in the classifier output vector
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

/// Per-frame emotion probabilities from the external classifier.
///
/// Scores are independently rounded upstream, so they need not sum to 1,
/// but each one must lie in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmotionScoreVector([f64; 7]);

impl EmotionScoreVector {
    /// Build a score vector, rejecting non-finite or out-of-range scores
    pub fn new(scores: [f64; 7]) -> Result<Self, FluxError> {
        for (category, score) in EmotionCategory::ALL.iter().zip(scores.iter()) {
            if !score.is_finite() || !(0.0..=1.0).contains(score) {
                return Err(FluxError::InvalidScores(format!(
                    "{} score {} outside [0, 1]",
                    category.as_str(),
                    score
                )));
            }
        }
        Ok(Self(scores))
    }

    /// Build a score vector from an ordered slice of exactly 7 scores
    pub fn from_slice(scores: &[f64]) -> Result<Self, FluxError> {
        let array: [f64; 7] = scores.try_into().map_err(|_| {
            FluxError::InvalidScores(format!("expected 7 scores, got {}", scores.len()))
        })?;
        Self::new(array)
    }

    /// Parse one classifier output line.
    ///
    /// Accepts either an ordered JSON array (`[0.1, 0.0, ...]`) or an object
    /// keyed by category name (`{"happy": 0.1, ...}`).
    pub fn from_json_line(line: &str) -> Result<Self, FluxError> {
        match serde_json::from_str::<ScoreLine>(line)? {
            ScoreLine::Ordered(scores) => Self::from_slice(&scores),
            ScoreLine::Named(named) => {
                let mut scores = [0.0; 7];
                let mut seen = [false; 7];
                for (name, score) in named {
                    let category = EmotionCategory::from_name(&name).ok_or_else(|| {
                        FluxError::InvalidScores(format!("unknown category '{}'", name))
                    })?;
                    scores[category.index()] = score;
                    seen[category.index()] = true;
                }
                if let Some(missing) = EmotionCategory::ALL.iter().find(|c| !seen[c.index()]) {
                    return Err(FluxError::InvalidScores(format!(
                        "missing category '{}'",
                        missing.as_str()
                    )));
                }
                Self::new(scores)
            }
        }
    }

    pub fn score(&self, category: EmotionCategory) -> f64 {
        self.0[category.index()]
    }

    /// Highest score among the given categories
    pub fn max_of(&self, categories: &[EmotionCategory]) -> f64 {
        categories
            .iter()
            .map(|c| self.score(*c))
            .fold(0.0, f64::max)
    }

    pub fn as_array(&self) -> &[f64; 7] {
        &self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScoreLine {
    Ordered(Vec<f64>),
    Named(HashMap<String, f64>),
}

/// Raw valence derived from a single classifier frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValenceSample {
    pub timestamp: DateTime<Utc>,
    /// Unsmoothed valence in [0, 1]
    pub raw_valence: f64,
}

/// One persisted reading: smoothed valence plus heart rate if known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedReading {
    pub timestamp: DateTime<Utc>,
    pub smoothed_valence: f64,
    /// Beats per minute, `None` when the biometric provider was unavailable
    pub heart_rate: Option<u32>,
}

/// Last row of the persistent log as seen by the consumer.
///
/// Fields are kept as the raw strings found on disk; numeric interpretation
/// happens in [`LatestRecord::parse_payload`] so a bad row can be skipped
/// without failing the snapshot itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestRecord {
    pub timestamp: String,
    pub valence: String,
    /// Empty when the row carried no heart rate
    pub heart_rate: String,
}

impl LatestRecord {
    /// Interpret the row as a `(valence, tempo)` payload
    pub fn parse_payload(&self) -> Result<(f64, i64), FluxError> {
        let valence: f64 = self.valence.trim().parse().map_err(|_| {
            FluxError::MalformedRecord(format!("valence '{}' is not a number", self.valence))
        })?;
        if !valence.is_finite() {
            return Err(FluxError::MalformedRecord(format!(
                "valence '{}' is not finite",
                self.valence
            )));
        }
        let tempo: i64 = self.heart_rate.trim().parse().map_err(|_| {
            FluxError::MalformedRecord(format!(
                "heart rate '{}' is not an integer",
                self.heart_rate
            ))
        })?;
        Ok((valence, tempo))
    }
}

/// Current biometric provider credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
