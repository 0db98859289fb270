use anyhow::Result;
use passage_core::{AttendanceGate, Gallery};
use passaged::{config, pipeline, sink};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("passaged starting");

    let config = config::Config::from_env();

    let gallery = Arc::new(Gallery::new(config.embedding_dim, config.match_threshold));
    let (events_sink, events) = sink::ChannelSink::new();
    let gate = Arc::new(AttendanceGate::new(config.gate(), events_sink));
    tokio::spawn(sink::run_event_writer(events));

    // One pipeline per camera stream. The embedding producer and pose
    // sampler for the default stream drive this handle; additional streams
    // get their own pipeline over the same gallery and gate.
    let _pipeline = pipeline::spawn_pipeline(gallery, gate, config.liveness());

    tracing::info!(
        dim = config.embedding_dim,
        match_threshold = config.match_threshold,
        accept_threshold = config.accept_threshold,
        cooldown_secs = config.cooldown_secs,
        "passaged ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("passaged shutting down");

    Ok(())
}
