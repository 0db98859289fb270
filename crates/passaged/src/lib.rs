//! passaged — walk-past attendance daemon.
//!
//! Wires the passage-core components into a deployment: env configuration,
//! one recognition pipeline per camera stream, and an attendance event
//! writer. The embedding producer and pose sampler for each stream drive a
//! [`pipeline::PipelineHandle`]; camera capture and durable storage connect
//! externally.

pub mod config;
pub mod pipeline;
pub mod sink;
