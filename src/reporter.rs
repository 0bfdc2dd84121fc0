//! Structured run events.
//!
//! The orchestrators never print. They hand [`RunEvent`]s to a [`Reporter`];
//! the binary uses [`TracingReporter`], tests collect events in memory.

use tracing::{debug, error, info, warn};

use crate::harness::{Outcome, TimingSample};
use crate::runners::test::{Status, TestVerdict};
use crate::store::Timing;

#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    /// Upper bound on the run's wall-clock time.
    Estimate { protocols: usize, secs: f64 },
    ProtocolStarted {
        protocol_id: String,
        index: usize,
        total: usize,
    },
    Sample {
        protocol_id: String,
        repetition: u32,
        sample: TimingSample,
    },
    Benchmarked {
        protocol_id: String,
        timing: Timing,
        completed: u32,
        attempted: u32,
    },
    Verdict(TestVerdict),
    /// Baseline records exceed the active max proof time but filtering is off.
    OvertimeNotFiltered { count: usize, max_proof_secs: f64 },
    /// Baseline record whose protocol is no longer in the corpus.
    MissingProtocol { protocol_id: String },
    FailFast { protocol_id: String },
}

pub trait Reporter {
    fn report(&mut self, event: RunEvent);
}

/// Forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&mut self, event: RunEvent) {
        match event {
            RunEvent::Estimate { protocols, secs } => {
                info!(protocols, estimated_secs = secs, "estimated maximum running time");
            }
            RunEvent::ProtocolStarted {
                protocol_id,
                index,
                total,
            } => {
                info!(protocol = %protocol_id, "[{}/{}] running", index + 1, total);
            }
            RunEvent::Sample {
                protocol_id,
                repetition,
                sample,
            } => {
                debug!(
                    protocol = %protocol_id,
                    repetition,
                    check_secs = sample.check_secs,
                    proof_secs = ?sample.proof_secs,
                    outcome = ?sample.outcome,
                    "sample"
                );
            }
            RunEvent::Benchmarked {
                protocol_id,
                timing,
                completed,
                attempted,
            } => match timing {
                Timing::Benchmarked {
                    mean_check_secs,
                    mean_proof_secs,
                } => info!(
                    protocol = %protocol_id,
                    mean_check_secs,
                    mean_proof_secs,
                    completed,
                    attempted,
                    "benchmarked"
                ),
                Timing::Unbenchmarkable => warn!(
                    protocol = %protocol_id,
                    attempted,
                    "no repetition completed, recorded as unbenchmarkable"
                ),
            },
            RunEvent::Verdict(v) => match v.status {
                Status::Pass => info!(
                    protocol = %v.protocol_id,
                    observed_secs = v.observed_secs,
                    allowed_secs = v.allowed_secs,
                    "PASS"
                ),
                Status::Fail | Status::Timeout => error!(
                    protocol = %v.protocol_id,
                    observed_secs = v.observed_secs,
                    allowed_secs = v.allowed_secs,
                    "{}",
                    v.status.as_str()
                ),
                Status::Overtime | Status::Unbenchmarked => {
                    warn!(protocol = %v.protocol_id, "{}", v.status.as_str())
                }
            },
            RunEvent::OvertimeNotFiltered {
                count,
                max_proof_secs,
            } => warn!(
                count,
                max_proof_secs,
                "protocols are expected to exceed the max proof time; pass --overtime to skip them"
            ),
            RunEvent::MissingProtocol { protocol_id } => {
                warn!(protocol = %protocol_id, "benchmarked protocol not found in protocol directory")
            }
            RunEvent::FailFast { protocol_id } => {
                error!(protocol = %protocol_id, "stopping at first failure")
            }
        }
    }
}

/// Collects events in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<RunEvent>,
}

impl Reporter for RecordingReporter {
    fn report(&mut self, event: RunEvent) {
        self.events.push(event);
    }
}

impl RecordingReporter {
    pub fn samples(&self) -> impl Iterator<Item = (&str, Outcome)> {
        self.events.iter().filter_map(|e| match e {
            RunEvent::Sample {
                protocol_id,
                sample,
                ..
            } => Some((protocol_id.as_str(), sample.outcome)),
            _ => None,
        })
    }
}
