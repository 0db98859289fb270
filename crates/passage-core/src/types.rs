use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Face embedding vector (128- or 512-dimensional depending on the model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Always processes all dimensions; no early exit.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// An enrolled person and their face samples.
///
/// Only created through [`Gallery::register`](crate::gallery::Gallery::register),
/// which supplies the first embedding, so the embedding set is never empty.
/// Embeddings are append-only; re-enrollment replaces the whole identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable external key (employee number, badge id, ...).
    pub id: String,
    pub display_name: String,
    pub embeddings: Vec<Embedding>,
}

/// Result of matching a probe embedding against the gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best match [-1, 1].
    pub score: f32,
    /// Id of the matched identity (if any).
    pub identity_id: Option<String>,
    /// Display name of the matched identity (if any).
    pub display_name: Option<String>,
}

impl MatchResult {
    /// A below-threshold or empty-gallery result carrying only the score.
    pub fn no_match(score: f32) -> Self {
        Self {
            matched: false,
            score,
            identity_id: None,
            display_name: None,
        }
    }
}

/// One per-frame pose/size observation of a tracked face.
///
/// Pose angles are in degrees; a sampler may not report every axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LivenessSample {
    pub yaw: Option<f32>,
    pub pitch: Option<f32>,
    pub roll: Option<f32>,
    /// Apparent face width in pixels.
    pub face_width: f32,
    pub timestamp: DateTime<Utc>,
}

/// How an attendance event was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Continuous recognition of people walking past a camera.
    Walkthrough,
    /// Hardware-triggered capture (turnstile, door sensor).
    Hardware,
}

/// An accepted attendance record.
///
/// Append-only; emitted by the gate at most once per identity per cooldown
/// window, persisted by an external sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: Uuid,
    pub identity_id: String,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
    /// Matcher score at the moment of acceptance.
    pub confidence: f32,
    pub method: Method,
}
