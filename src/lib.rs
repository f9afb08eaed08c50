pub mod cli;
pub mod config;
pub mod detect;
pub mod format;
pub mod image;
pub mod logging;
pub mod outdir;
pub mod pipeline;
pub mod types;

// Re-export commonly used items
pub use pipeline::{ProcessError, RunSummary, run_deepcr, run_lacosmic};
