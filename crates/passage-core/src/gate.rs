//! Attendance gating.
//!
//! The single authority that turns a per-frame (match, liveness) pair into
//! at most one persisted attendance event per identity per cooldown window.
//! The cooldown store is the only state shared across camera streams.

use crate::liveness::LivenessVerdict;
use crate::types::{AttendanceEvent, MatchResult, Method};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by an attendance sink.
#[derive(Error, Debug)]
#[error("attendance sink write failed: {0}")]
pub struct SinkError(pub String);

/// Downstream consumer of accepted events.
///
/// Called at most once per accepted decision. Durable storage and retries
/// are the sink's concern; the gate never retries, since a retry landing
/// after the cooldown window reopens would double-log the identity.
pub trait AttendanceSink: Send + Sync {
    fn record(&self, event: &AttendanceEvent) -> Result<(), SinkError>;
}

impl<S: AttendanceSink + ?Sized> AttendanceSink for std::sync::Arc<S> {
    fn record(&self, event: &AttendanceEvent) -> Result<(), SinkError> {
        (**self).record(event)
    }
}

/// The decision was an Accept but the sink write failed.
///
/// Distinct from a reject: the gate's decision stands and the cooldown
/// stamp is retained. Whether to retry is the caller's call.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("accepted {} but sink write failed: {source}", .event.identity_id)]
    Sink {
        event: AttendanceEvent,
        source: SinkError,
    },
}

/// Expected, non-fatal outcomes of [`AttendanceGate::decide`].
///
/// Callers must be able to tell these apart; a UI shows "unknown",
/// "analyzing", and "already logged" differently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// No enrolled identity scored above the matcher's threshold.
    NoMatch,
    /// Matched upstream, but below the gate's own stricter threshold.
    ScoreBelowThreshold { score: f32, threshold: f32 },
    /// Liveness is still collecting samples.
    LivenessPending,
    /// Liveness evaluated the window and found no motion evidence.
    LivenessFailed,
    /// The identity was accepted within the current cooldown window.
    CooldownActive { retry_after_secs: i64 },
}

#[derive(Debug)]
pub enum GateOutcome {
    Accepted(AttendanceEvent),
    Rejected(RejectReason),
}

/// Last-accepted timestamps per identity, shared by every camera stream of
/// a deployment. An explicitly owned value, not a global, so deployments
/// and tests run in isolation.
#[derive(Debug, Default)]
pub struct CooldownStore {
    last_accepted: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-set: stamps `now` and returns `Ok` if the identity
    /// is outside its cooldown window, otherwise the seconds remaining.
    ///
    /// The read-modify-write happens under one lock hold, so two streams
    /// deciding for the same identity in the same window cannot both claim.
    pub fn try_claim(
        &self,
        identity_id: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<(), i64> {
        let mut map = self
            .last_accepted
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(last) = map.get(identity_id) {
            let elapsed = now - *last;
            if elapsed < cooldown {
                return Err((cooldown - elapsed).num_seconds());
            }
        }
        map.insert(identity_id.to_string(), now);
        Ok(())
    }

    /// Forget an identity's stamp (operator override).
    pub fn clear(&self, identity_id: &str) {
        self.last_accepted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(identity_id);
    }

    pub fn last_accepted(&self, identity_id: &str) -> Option<DateTime<Utc>> {
        self.last_accepted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(identity_id)
            .copied()
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// The gate's own acceptance threshold, re-checked on top of the
    /// matcher's. Kept independent so a lenient upstream matcher can never
    /// single-handedly admit a borderline score.
    pub accept_threshold: f32,
    /// Minimum time between two accepted events for the same identity.
    pub cooldown: Duration,
    /// Tag stamped on emitted events.
    pub method: Method,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.45,
            cooldown: Duration::seconds(30),
            method: Method::Walkthrough,
        }
    }
}

/// Gate combining match result, liveness verdict, and cooldown state.
pub struct AttendanceGate<S: AttendanceSink> {
    config: GateConfig,
    cooldowns: CooldownStore,
    sink: S,
}

impl<S: AttendanceSink> AttendanceGate<S> {
    pub fn new(config: GateConfig, sink: S) -> Self {
        Self {
            config,
            cooldowns: CooldownStore::new(),
            sink,
        }
    }

    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    /// Decide whether one frame's (match, liveness) pair becomes an
    /// attendance event.
    ///
    /// Every reject is logged with identity (when known), the raw score,
    /// and both thresholds, so false negatives can be audited offline.
    pub fn decide(
        &self,
        match_result: &MatchResult,
        verdict: &LivenessVerdict,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome, GateError> {
        let identity_id = match match_result.identity_id.as_deref() {
            Some(id) if match_result.matched => id,
            _ => {
                tracing::debug!(score = match_result.score, "reject: no match");
                return Ok(GateOutcome::Rejected(RejectReason::NoMatch));
            }
        };

        if match_result.score < self.config.accept_threshold {
            tracing::info!(
                identity = identity_id,
                score = match_result.score,
                gate_threshold = self.config.accept_threshold,
                "reject: matched upstream but below gate threshold"
            );
            return Ok(GateOutcome::Rejected(RejectReason::ScoreBelowThreshold {
                score: match_result.score,
                threshold: self.config.accept_threshold,
            }));
        }

        match verdict {
            LivenessVerdict::Pending { progress } => {
                tracing::debug!(
                    identity = identity_id,
                    progress = *progress,
                    "reject: liveness pending"
                );
                return Ok(GateOutcome::Rejected(RejectReason::LivenessPending));
            }
            LivenessVerdict::NotLive { stats } => {
                tracing::info!(
                    identity = identity_id,
                    score = match_result.score,
                    yaw_std = ?stats.yaw_std,
                    pitch_std = ?stats.pitch_std,
                    roll_std = ?stats.roll_std,
                    width_std = ?stats.width_std,
                    "reject: no motion evidence"
                );
                return Ok(GateOutcome::Rejected(RejectReason::LivenessFailed));
            }
            LivenessVerdict::Live { .. } => {}
        }

        if let Err(retry_after_secs) =
            self.cooldowns
                .try_claim(identity_id, now, self.config.cooldown)
        {
            tracing::debug!(
                identity = identity_id,
                retry_after_secs,
                "reject: cooldown active"
            );
            return Ok(GateOutcome::Rejected(RejectReason::CooldownActive {
                retry_after_secs,
            }));
        }

        let event = AttendanceEvent {
            id: Uuid::new_v4(),
            identity_id: identity_id.to_string(),
            display_name: match_result.display_name.clone().unwrap_or_default(),
            timestamp: now,
            confidence: match_result.score,
            method: self.config.method,
        };

        tracing::info!(
            identity = identity_id,
            score = match_result.score,
            gate_threshold = self.config.accept_threshold,
            method = ?self.config.method,
            "attendance accepted"
        );

        // The cooldown stamp set above is never rolled back on sink failure:
        // acceptance was correct, and an internal retry after the window
        // reopened would double-log.
        match self.sink.record(&event) {
            Ok(()) => Ok(GateOutcome::Accepted(event)),
            Err(source) => {
                tracing::warn!(
                    identity = %event.identity_id,
                    error = %source,
                    "accepted but sink write failed"
                );
                Err(GateError::Sink { event, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::MotionStats;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier};

    /// Sink capturing every recorded event.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AttendanceEvent>>,
        fail: AtomicBool,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<AttendanceEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl AttendanceSink for RecordingSink {
        fn record(&self, event: &AttendanceEvent) -> Result<(), SinkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError("disk full".into()));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn live() -> LivenessVerdict {
        LivenessVerdict::Live {
            stats: MotionStats::default(),
        }
    }

    fn matched(id: &str, score: f32) -> MatchResult {
        MatchResult {
            matched: true,
            score,
            identity_id: Some(id.to_string()),
            display_name: Some("Someone".to_string()),
        }
    }

    fn gate() -> AttendanceGate<Arc<RecordingSink>> {
        AttendanceGate::new(GateConfig::default(), Arc::new(RecordingSink::default()))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    #[test]
    fn accepts_matched_live_identity() {
        let g = gate();
        let outcome = g.decide(&matched("e1", 0.93), &live(), t0()).unwrap();
        assert_matches!(outcome, GateOutcome::Accepted(event) => {
            assert_eq!(event.identity_id, "e1");
            assert_eq!(event.confidence, 0.93);
            assert_eq!(event.method, Method::Walkthrough);
            assert_eq!(event.timestamp, t0());
        });
        assert_eq!(g.sink.events().len(), 1);
    }

    #[test]
    fn rejects_unmatched_result() {
        let g = gate();
        let outcome = g
            .decide(&MatchResult::no_match(0.2), &live(), t0())
            .unwrap();
        assert_matches!(outcome, GateOutcome::Rejected(RejectReason::NoMatch));
    }

    #[test]
    fn rejects_below_gate_threshold() {
        // Matcher said yes at 0.42, but the gate re-checks at 0.45.
        let g = gate();
        let outcome = g.decide(&matched("e1", 0.42), &live(), t0()).unwrap();
        assert_matches!(
            outcome,
            GateOutcome::Rejected(RejectReason::ScoreBelowThreshold { score, threshold }) => {
                assert_eq!(score, 0.42);
                assert_eq!(threshold, 0.45);
            }
        );
        assert!(g.sink.events().is_empty());
    }

    #[test]
    fn rejects_pending_and_failed_liveness_distinctly() {
        let g = gate();
        let pending = LivenessVerdict::Pending { progress: 0.5 };
        let outcome = g.decide(&matched("e1", 0.9), &pending, t0()).unwrap();
        assert_matches!(outcome, GateOutcome::Rejected(RejectReason::LivenessPending));

        let not_live = LivenessVerdict::NotLive {
            stats: MotionStats::default(),
        };
        let outcome = g.decide(&matched("e1", 0.9), &not_live, t0()).unwrap();
        assert_matches!(outcome, GateOutcome::Rejected(RejectReason::LivenessFailed));

        // Neither path consumes the cooldown.
        assert!(g.cooldowns().last_accepted("e1").is_none());
    }

    #[test]
    fn cooldown_allows_one_event_per_window() {
        let g = gate();
        let m = matched("e1", 0.9);

        assert_matches!(
            g.decide(&m, &live(), t0()).unwrap(),
            GateOutcome::Accepted(_)
        );
        assert_matches!(
            g.decide(&m, &live(), t0() + Duration::seconds(10)).unwrap(),
            GateOutcome::Rejected(RejectReason::CooldownActive { retry_after_secs: 20 })
        );
        // Window elapsed: a second event goes through.
        assert_matches!(
            g.decide(&m, &live(), t0() + Duration::seconds(30)).unwrap(),
            GateOutcome::Accepted(_)
        );
        assert_eq!(g.sink.events().len(), 2);
    }

    #[test]
    fn cooldown_is_per_identity() {
        let g = gate();
        assert_matches!(
            g.decide(&matched("e1", 0.9), &live(), t0()).unwrap(),
            GateOutcome::Accepted(_)
        );
        assert_matches!(
            g.decide(&matched("e2", 0.9), &live(), t0()).unwrap(),
            GateOutcome::Accepted(_)
        );
        assert_eq!(g.sink.events().len(), 2);
    }

    #[test]
    fn cleared_cooldown_accepts_again() {
        let g = gate();
        g.decide(&matched("e1", 0.9), &live(), t0()).unwrap();
        g.cooldowns().clear("e1");
        assert_matches!(
            g.decide(&matched("e1", 0.9), &live(), t0() + Duration::seconds(1))
                .unwrap(),
            GateOutcome::Accepted(_)
        );
    }

    #[test]
    fn sink_failure_is_not_a_reject_and_keeps_the_stamp() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let g = AttendanceGate::new(GateConfig::default(), Arc::clone(&sink));

        let err = g.decide(&matched("e1", 0.9), &live(), t0()).unwrap_err();
        assert_matches!(err, GateError::Sink { event, .. } => {
            assert_eq!(event.identity_id, "e1");
        });

        // The stamp survives, so an immediate re-decision is a cooldown
        // reject rather than a double accept.
        sink.fail.store(false, Ordering::SeqCst);
        assert_matches!(
            g.decide(&matched("e1", 0.9), &live(), t0() + Duration::seconds(1))
                .unwrap(),
            GateOutcome::Rejected(RejectReason::CooldownActive { .. })
        );
    }

    #[test]
    fn concurrent_decisions_accept_exactly_once() {
        const STREAMS: usize = 8;

        let sink = Arc::new(RecordingSink::default());
        let g = Arc::new(AttendanceGate::new(GateConfig::default(), Arc::clone(&sink)));
        let barrier = Arc::new(Barrier::new(STREAMS));

        let mut handles = Vec::new();
        for _ in 0..STREAMS {
            let g = Arc::clone(&g);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                g.decide(&matched("e1", 0.9), &live(), t0()).unwrap()
            }));
        }

        let mut accepted = 0;
        let mut cooldown_rejects = 0;
        for h in handles {
            match h.join().unwrap() {
                GateOutcome::Accepted(_) => accepted += 1,
                GateOutcome::Rejected(RejectReason::CooldownActive { .. }) => {
                    cooldown_rejects += 1
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(cooldown_rejects, STREAMS - 1);
        assert_eq!(sink.events().len(), 1);
    }
}
