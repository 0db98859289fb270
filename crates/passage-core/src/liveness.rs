//! Passive liveness verification via pose/size variation.
//!
//! A static photograph or screen capture held in front of the camera
//! produces near-constant head pose and apparent face size across frames.
//! A person walking past exhibits natural variation (head bob, perspective
//! change) even without deliberate motion. This verifier watches the
//! per-axis standard deviation over a short rolling window and requires no
//! prompted challenge (no "turn your head").
//!
//! # Threat Coverage
//!
//! - **Blocks:** printed photographs and static images held in front of
//!   the camera.
//! - **Does not block:** video replays with motion, 3D masks, or a screen
//!   replay that pans/zooms enough to trip the size clause. Stronger
//!   detectors (texture/frequency analysis, a trained anti-spoofing
//!   classifier) can replace or wrap this one behind [`LivenessCheck`].

use crate::types::LivenessSample;
use std::collections::VecDeque;

/// Tunables for the pose/size variation heuristic.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Samples required before any verdict other than `Pending`.
    pub min_frames: u32,
    /// Rolling window capacity; the oldest sample is dropped beyond this.
    pub max_samples: usize,
    /// Per-axis pose standard deviation (degrees) evidencing motion.
    pub pose_threshold_deg: f32,
    /// Face width standard deviation (pixels) evidencing motion.
    pub size_threshold_px: f32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            min_frames: 8,
            max_samples: 15,
            pose_threshold_deg: 3.0,
            size_threshold_px: 10.0,
        }
    }
}

/// Per-signal standard deviations over the window at evaluation time.
///
/// An axis is `None` when fewer than `min_frames` in-window samples
/// reported it; such axes are skipped for that decision round.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotionStats {
    pub yaw_std: Option<f32>,
    pub pitch_std: Option<f32>,
    pub roll_std: Option<f32>,
    pub width_std: Option<f32>,
}

/// Outcome of feeding one sample to a verifier.
#[derive(Debug, Clone, Copy)]
pub enum LivenessVerdict {
    /// Still collecting samples; `progress` is in [0, 1].
    Pending { progress: f32 },
    /// Enough samples, but no motion evidence yet. Not terminal; a later
    /// frame can still flip the track to `Live`.
    NotLive { stats: MotionStats },
    /// Natural motion observed. Sticky for the remainder of the track.
    Live { stats: MotionStats },
}

impl LivenessVerdict {
    pub fn is_live(&self) -> bool {
        matches!(self, LivenessVerdict::Live { .. })
    }
}

/// Verdict source contract, so alternate or combined detectors can feed
/// the gate the same `Pending | NotLive | Live` stream.
pub trait LivenessCheck {
    fn update(&mut self, sample: LivenessSample) -> LivenessVerdict;
    fn reset(&mut self);
}

/// Track state. `Verified` carries no window, so re-evaluating an already
/// verified track is unrepresentable.
enum TrackState {
    Observing {
        window: VecDeque<LivenessSample>,
        frames_seen: u32,
    },
    Verified {
        stats: MotionStats,
    },
}

impl TrackState {
    fn fresh(capacity: usize) -> Self {
        TrackState::Observing {
            window: VecDeque::with_capacity(capacity),
            frames_seen: 0,
        }
    }
}

/// Pose/size variation verifier for one tracked face.
///
/// State is owned by the camera stream that produced the track; it is never
/// shared across streams.
pub struct LivenessVerifier {
    config: LivenessConfig,
    state: TrackState,
}

impl Default for LivenessVerifier {
    fn default() -> Self {
        Self::new(LivenessConfig::default())
    }
}

impl LivenessVerifier {
    pub fn new(config: LivenessConfig) -> Self {
        let state = TrackState::fresh(config.max_samples);
        Self { config, state }
    }

    /// Whether the track has already been verified live.
    pub fn is_verified(&self) -> bool {
        matches!(self.state, TrackState::Verified { .. })
    }
}

impl LivenessCheck for LivenessVerifier {
    fn update(&mut self, sample: LivenessSample) -> LivenessVerdict {
        let (window, frames_seen) = match &mut self.state {
            // Once verified, stay verified: a static spoof can never have
            // triggered the motion rule, so re-litigating it every frame
            // would only add cost.
            TrackState::Verified { stats } => {
                return LivenessVerdict::Live { stats: *stats };
            }
            TrackState::Observing {
                window,
                frames_seen,
            } => (window, frames_seen),
        };

        if window.len() == self.config.max_samples {
            window.pop_front();
        }
        window.push_back(sample);
        *frames_seen += 1;

        if *frames_seen < self.config.min_frames {
            return LivenessVerdict::Pending {
                progress: *frames_seen as f32 / self.config.min_frames as f32,
            };
        }

        let stats = evaluate(window, &self.config);
        let pose_moved = [stats.yaw_std, stats.pitch_std, stats.roll_std]
            .iter()
            .any(|axis| axis.is_some_and(|s| s > self.config.pose_threshold_deg));
        let size_moved = stats
            .width_std
            .is_some_and(|s| s > self.config.size_threshold_px);

        if pose_moved || size_moved {
            tracing::debug!(
                yaw_std = ?stats.yaw_std,
                pitch_std = ?stats.pitch_std,
                roll_std = ?stats.roll_std,
                width_std = ?stats.width_std,
                "track verified live"
            );
            self.state = TrackState::Verified { stats };
            LivenessVerdict::Live { stats }
        } else {
            LivenessVerdict::NotLive { stats }
        }
    }

    /// Discard all track state. Called when the subject leaves the frame
    /// or an operator forces re-verification.
    fn reset(&mut self) {
        self.state = TrackState::fresh(self.config.max_samples);
    }
}

/// Per-axis stds over the in-window samples reporting that axis.
fn evaluate(window: &VecDeque<LivenessSample>, config: &LivenessConfig) -> MotionStats {
    let min = config.min_frames as usize;

    let axis = |pick: fn(&LivenessSample) -> Option<f32>| {
        let values: Vec<f32> = window.iter().filter_map(pick).collect();
        (values.len() >= min).then(|| std_dev(&values))
    };

    let widths: Vec<f32> = window.iter().map(|s| s.face_width).collect();

    MotionStats {
        yaw_std: axis(|s| s.yaw),
        pitch_std: axis(|s| s.pitch),
        roll_std: axis(|s| s.roll),
        width_std: (widths.len() >= min).then(|| std_dev(&widths)),
    }
}

/// Population standard deviation: sqrt(mean((x - mean)^2)).
fn std_dev(values: &[f32]) -> f32 {
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
    variance.sqrt()
}
