//! Run pipeline: prompt, extract, execute, check, retry.
//!
//! - `Pipeline` drives one run to a terminal status
//! - `FeedbackFormatter` writes the plain-text follow-up after a failure
//! - `RunObserver` lets the binary print progress as attempts finish

pub mod feedback;
mod loop_runner;

pub use feedback::FeedbackFormatter;
pub use loop_runner::{NoOpObserver, Pipeline, PipelineSettings, RetrySettings, RunObserver};
