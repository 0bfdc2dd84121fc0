//! Benchmark and test orchestration over a scanned corpus.

pub mod bench;
