//! Per-stream recognition pipeline.
//!
//! One pipeline per camera stream, running on a dedicated OS thread behind
//! a request channel. The thread owns the stream's liveness state, so
//! track-local data needs no locking; the gallery and gate are shared
//! across pipelines through `Arc`.

use passage_core::{
    AttendanceGate, AttendanceSink, Embedding, Gallery, GalleryError, GateError, GateOutcome,
    LivenessCheck, LivenessConfig, LivenessSample, LivenessVerdict, LivenessVerifier, MatchResult,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("pipeline thread exited")]
    ChannelClosed,
}

/// Everything the pipeline produced for one observed frame.
#[derive(Debug)]
pub struct FrameOutcome {
    pub match_result: MatchResult,
    pub verdict: LivenessVerdict,
    /// The gate's decision; `Err` means accepted but the sink write failed.
    pub decision: Result<GateOutcome, GateError>,
}

/// Messages sent from frame sources to the pipeline thread.
enum PipelineRequest {
    Observe {
        embedding: Embedding,
        sample: LivenessSample,
        reply: oneshot::Sender<FrameOutcome>,
    },
    ResetTrack {
        reply: oneshot::Sender<()>,
    },
    Enroll {
        id: String,
        display_name: String,
        embedding: Embedding,
        reply: oneshot::Sender<Result<(), GalleryError>>,
    },
    RemoveIdentity {
        id: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Clone-safe handle to one stream's pipeline thread.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<PipelineRequest>,
}

impl PipelineHandle {
    /// Run one frame through match → liveness → gate.
    pub async fn observe(
        &self,
        embedding: Embedding,
        sample: LivenessSample,
    ) -> Result<FrameOutcome, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PipelineRequest::Observe {
                embedding,
                sample,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| PipelineError::ChannelClosed)
    }

    /// Discard the stream's liveness state (subject left frame, or an
    /// operator forced re-verification).
    pub async fn reset_track(&self) -> Result<(), PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PipelineRequest::ResetTrack { reply: reply_tx })
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| PipelineError::ChannelClosed)
    }

    /// Enroll an embedding, creating the identity if absent.
    pub async fn enroll(
        &self,
        id: &str,
        display_name: &str,
        embedding: Embedding,
    ) -> Result<(), PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PipelineRequest::Enroll {
                id: id.to_string(),
                display_name: display_name.to_string(),
                embedding,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        reply_rx
            .await
            .map_err(|_| PipelineError::ChannelClosed)?
            .map_err(PipelineError::from)
    }

    /// Remove an identity and its embeddings. Returns whether it existed.
    pub async fn remove_identity(&self, id: &str) -> Result<bool, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PipelineRequest::RemoveIdentity {
                id: id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| PipelineError::ChannelClosed)
    }
}

/// Spawn a pipeline on a dedicated OS thread.
///
/// The thread exits when every handle is dropped.
pub fn spawn_pipeline<S>(
    gallery: Arc<Gallery>,
    gate: Arc<AttendanceGate<S>>,
    liveness: LivenessConfig,
) -> PipelineHandle
where
    S: AttendanceSink + 'static,
{
    let (tx, mut rx) = mpsc::channel::<PipelineRequest>(16);

    std::thread::Builder::new()
        .name("passage-pipeline".into())
        .spawn(move || {
            let mut verifier = LivenessVerifier::new(liveness);
            tracing::info!("pipeline thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    PipelineRequest::Observe {
                        embedding,
                        sample,
                        reply,
                    } => {
                        let outcome =
                            run_observe(&gallery, &gate, &mut verifier, embedding, sample);
                        let _ = reply.send(outcome);
                    }
                    PipelineRequest::ResetTrack { reply } => {
                        verifier.reset();
                        tracing::debug!("track reset");
                        let _ = reply.send(());
                    }
                    PipelineRequest::Enroll {
                        id,
                        display_name,
                        embedding,
                        reply,
                    } => {
                        let _ = reply.send(gallery.register(&id, &display_name, embedding));
                    }
                    PipelineRequest::RemoveIdentity { id, reply } => {
                        let _ = reply.send(gallery.remove(&id));
                    }
                }
            }
            tracing::info!("pipeline thread exiting");
        })
        .expect("failed to spawn pipeline thread");

    PipelineHandle { tx }
}

fn run_observe<S: AttendanceSink>(
    gallery: &Gallery,
    gate: &AttendanceGate<S>,
    verifier: &mut LivenessVerifier,
    embedding: Embedding,
    sample: LivenessSample,
) -> FrameOutcome {
    let match_result = match gallery.match_embedding(&embedding) {
        Ok(result) => result,
        Err(err) => {
            // Malformed probes degrade to a no-match; the stream never dies.
            tracing::warn!(error = %err, "probe rejected by gallery, treating as no-match");
            MatchResult::no_match(0.0)
        }
    };

    let verdict = verifier.update(sample);
    let decision = gate.decide(&match_result, &verdict, sample.timestamp);

    FrameOutcome {
        match_result,
        verdict,
        decision,
    }
}
