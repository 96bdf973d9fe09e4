#![forbid(unsafe_code)]

pub mod cli;
pub mod pack;
pub mod telemetry;

pub use cli::Cli;
pub use pack::{PackConfig, PackFailure, PackSummary, Stage};
