use chrono::Duration;
use passage_core::{GateConfig, LivenessConfig, Method};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Dimensionality every enrolled and probed embedding must have.
    pub embedding_dim: usize,
    /// Matcher's cosine similarity threshold for a positive match.
    pub match_threshold: f32,
    /// Gate's own acceptance threshold, re-checked on top of the matcher's.
    pub accept_threshold: f32,
    /// Seconds between two accepted events for the same identity.
    pub cooldown_secs: i64,
    /// Liveness: samples required before a verdict.
    pub min_frames: u32,
    /// Liveness: rolling window capacity.
    pub max_samples: usize,
    /// Liveness: per-axis pose std threshold in degrees.
    pub pose_threshold_deg: f32,
    /// Liveness: face width std threshold in pixels.
    pub size_threshold_px: f32,
    /// Tag stamped on emitted attendance events.
    pub method: Method,
}

impl Config {
    /// Load configuration from `PASSAGE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            embedding_dim: env_usize("PASSAGE_EMBEDDING_DIM", 512),
            match_threshold: env_f32("PASSAGE_MATCH_THRESHOLD", 0.40),
            accept_threshold: env_f32("PASSAGE_ACCEPT_THRESHOLD", 0.45),
            cooldown_secs: env_i64("PASSAGE_COOLDOWN_SECS", 30),
            min_frames: env_u32("PASSAGE_MIN_FRAMES", 8),
            max_samples: env_usize("PASSAGE_MAX_SAMPLES", 15),
            pose_threshold_deg: env_f32("PASSAGE_POSE_THRESHOLD_DEG", 3.0),
            size_threshold_px: env_f32("PASSAGE_SIZE_THRESHOLD_PX", 10.0),
            method: match std::env::var("PASSAGE_METHOD").as_deref() {
                Ok("hardware") => Method::Hardware,
                _ => Method::Walkthrough,
            },
        }
    }

    pub fn liveness(&self) -> LivenessConfig {
        LivenessConfig {
            min_frames: self.min_frames,
            max_samples: self.max_samples,
            pose_threshold_deg: self.pose_threshold_deg,
            size_threshold_px: self.size_threshold_px,
        }
    }

    pub fn gate(&self) -> GateConfig {
        GateConfig {
            accept_threshold: self.accept_threshold,
            cooldown: Duration::seconds(self.cooldown_secs),
            method: self.method,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
