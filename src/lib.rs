//! Benchmark and regression harness for the Tamarin prover.
//!
//! Benchmark mode runs every protocol of a corpus against a trusted prover
//! build and records mean check and proof times. Test mode re-runs the corpus
//! against a candidate build with budgets derived from that baseline and
//! classifies each protocol.

pub mod config;
pub mod error;
pub mod harness;
pub mod protocol;
pub mod report;
pub mod reporter;
pub mod runners;
pub mod schema;
pub mod store;

pub use error::{Error, Result};

/// Which of the two runs to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Measure a baseline and write a benchmark file.
    Benchmark,
    /// Compare against an existing benchmark file.
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Benchmark => "benchmark",
            Mode::Test => "test",
        }
    }
}
