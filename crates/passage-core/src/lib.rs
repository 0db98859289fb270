//! passage-core — walk-past attendance decision engine.
//!
//! Matches face embeddings against an enrolled gallery, verifies liveness
//! from passive pose/size variation, and gates attendance writes behind a
//! per-identity cooldown. Embedding extraction, camera capture, transport,
//! and durable storage live outside this crate.

pub mod gallery;
pub mod gate;
pub mod liveness;
pub mod types;

pub use gallery::{CosineMatcher, Gallery, GalleryError, Matcher};
pub use gate::{
    AttendanceGate, AttendanceSink, CooldownStore, GateConfig, GateError, GateOutcome,
    RejectReason, SinkError,
};
pub use liveness::{LivenessCheck, LivenessConfig, LivenessVerdict, LivenessVerifier, MotionStats};
pub use types::{AttendanceEvent, Embedding, Identity, LivenessSample, MatchResult, Method};
