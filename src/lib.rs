//! plainvoice - turn long documents into plain-language spoken audio
//!
//! A document is split into units, each unit is rewritten by a language model
//! with bounded concurrency, and the joined result can be read aloud by a
//! speech service one unit at a time.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod simplify;
pub mod speech;

#[cfg(test)]
mod test_env;

// Composition root
#[cfg(feature = "cli")]
pub mod app;

// Core seams (unit transform → join)
pub use pipeline::{Joiner, UnitTransform};
pub use simplify::Rewriter;
pub use speech::Synthesizer;

// Pipeline
pub use pipeline::{
    BoundedDispatcher, Chunker, PipelineConfig, RetryPolicy, Stage, StageOutput, StageReport,
};
pub use simplify::simplify;
pub use speech::{AudioTrack, synthesize};

// Error handling
pub use error::{PlainvoiceError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
