#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **aegis-processor** – Processing pipeline for Aegis.
//!
//! The [`Processor`] runs the pull-based loop at the heart of the system:
//! drain the work queue in batches, load the recent-event window from the
//! store, run the correlation engine once per batch, compute a risk score
//! per event, dispatch alerts through the pub-sub sink and record each
//! outcome back on the stored event.
//!
//! The loop never panics and acks a message only after its event's outcome
//! is persisted; every failure mode leaves the message to redeliver after
//! the queue's visibility timeout.

pub mod alerting;
mod config;
mod pipeline;

pub use config::ProcessorConfig;
pub use pipeline::{CorrelationPass, PipelineStats, Processor};
