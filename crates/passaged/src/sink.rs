//! Attendance event plumbing.
//!
//! The gate runs on a pipeline thread and must never block on persistence;
//! durable storage is an external collaborator. This sink hands accepted
//! events to an async consumer that emits one JSON line per event, which a
//! deployment can pipe into whatever store it runs.

use passage_core::{AttendanceEvent, AttendanceSink, SinkError};
use tokio::sync::mpsc;

/// Sink forwarding accepted events over an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AttendanceEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AttendanceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AttendanceSink for ChannelSink {
    fn record(&self, event: &AttendanceEvent) -> Result<(), SinkError> {
        self.tx
            .send(event.clone())
            .map_err(|_| SinkError("event consumer dropped".into()))
    }
}

/// Drain accepted events, one JSON line each, until the senders are gone.
pub async fn run_event_writer(mut rx: mpsc::UnboundedReceiver<AttendanceEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(error = %err, "failed to serialize attendance event"),
        }
    }
    tracing::info!("event writer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use passage_core::Method;
    use uuid::Uuid;

    fn event() -> AttendanceEvent {
        AttendanceEvent {
            id: Uuid::new_v4(),
            identity_id: "e1".into(),
            display_name: "Erin".into(),
            timestamp: Utc::now(),
            confidence: 0.9,
            method: Method::Walkthrough,
        }
    }

    #[tokio::test]
    async fn record_delivers_to_consumer() {
        let (sink, mut rx) = ChannelSink::new();
        sink.record(&event()).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.identity_id, "e1");
    }

    #[tokio::test]
    async fn record_fails_when_consumer_gone() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        assert!(sink.record(&event()).is_err());
    }
}
