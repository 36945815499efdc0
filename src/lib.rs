// src/lib.rs
pub mod config;
pub mod utils;
pub mod pipelines;
pub mod cli;
pub use cli::{Arguments, Sequencer};
pub use config::defs::{PipelineError, RunConfig};
