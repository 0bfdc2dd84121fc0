use crate::error::Result;
use crate::harness::{Outcome, PhaseBudgets, Runner, TimingSample};
use crate::protocol::Protocol;
use crate::reporter::{Reporter, RunEvent};
use crate::store::{BenchmarkRecord, BenchmarkStore, Timing};

/// Upper bound on a benchmark run: every repetition of every protocol uses
/// its full budgets.
pub fn estimate_total_time(protocols: &[Protocol], repetitions: u32, budgets: PhaseBudgets) -> f64 {
    f64::from(repetitions) * protocols.len() as f64 * (budgets.check_secs + budgets.proof_secs)
}

/// Running sums over the samples of one protocol.
#[derive(Clone, Copy, Debug, Default)]
struct SampleStats {
    attempted: u32,
    completed: u32,
    check_total: f64,
    proof_total: f64,
}

impl SampleStats {
    fn add(&mut self, sample: &TimingSample) {
        self.attempted += 1;
        if sample.outcome != Outcome::Completed {
            return;
        }
        self.completed += 1;
        self.check_total += sample.check_secs;
        self.proof_total += sample.proof_secs.unwrap_or(0.0);
    }

    fn timing(&self) -> Timing {
        if self.completed == 0 {
            return Timing::Unbenchmarkable;
        }
        let n = f64::from(self.completed);
        Timing::Benchmarked {
            mean_check_secs: self.check_total / n,
            mean_proof_secs: self.proof_total / n,
        }
    }

    /// Completed samples for a benchmarked record, attempts otherwise.
    fn repetitions(&self) -> u32 {
        if self.completed == 0 {
            self.attempted
        } else {
            self.completed
        }
    }
}

/// Arithmetic mean over the completed samples only.
pub fn aggregate(samples: &[TimingSample]) -> Timing {
    let mut stats = SampleStats::default();
    for s in samples {
        stats.add(s);
    }
    stats.timing()
}

pub struct Bencher<'a> {
    runner: &'a mut dyn Runner,
    reporter: &'a mut dyn Reporter,
    budgets: PhaseBudgets,
    repetitions: u32,
}

impl<'a> Bencher<'a> {
    pub fn new(
        runner: &'a mut dyn Runner,
        reporter: &'a mut dyn Reporter,
        budgets: PhaseBudgets,
        repetitions: u32,
    ) -> Self {
        debug_assert!(repetitions > 0, "benchmarking needs at least one repetition");
        Self {
            runner,
            reporter,
            budgets,
            repetitions,
        }
    }

    pub fn estimate_total_time(&self, protocols: &[Protocol]) -> f64 {
        estimate_total_time(protocols, self.repetitions, self.budgets)
    }

    /// Benchmarks every protocol in order. Protocols that never complete are
    /// kept as unbenchmarkable records rather than dropped.
    pub fn run_all(&mut self, protocols: &[Protocol]) -> Result<BenchmarkStore> {
        self.reporter.report(RunEvent::Estimate {
            protocols: protocols.len(),
            secs: self.estimate_total_time(protocols),
        });

        let mut store = BenchmarkStore::new();
        for (index, protocol) in protocols.iter().enumerate() {
            self.reporter.report(RunEvent::ProtocolStarted {
                protocol_id: protocol.id.clone(),
                index,
                total: protocols.len(),
            });

            let mut stats = SampleStats::default();
            for repetition in 0..self.repetitions {
                let sample = self.runner.run(protocol, self.budgets)?;
                stats.add(&sample);
                self.reporter.report(RunEvent::Sample {
                    protocol_id: protocol.id.clone(),
                    repetition,
                    sample,
                });
            }

            let timing = stats.timing();
            self.reporter.report(RunEvent::Benchmarked {
                protocol_id: protocol.id.clone(),
                timing,
                completed: stats.completed,
                attempted: stats.attempted,
            });
            store.insert(BenchmarkRecord {
                protocol_id: protocol.id.clone(),
                timing,
                repetitions: stats.repetitions(),
            });
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::RecordingReporter;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Replays a fixed sequence of samples per protocol.
    struct ScriptedRunner {
        samples: HashMap<String, Vec<TimingSample>>,
        calls: Vec<(String, PhaseBudgets)>,
    }

    impl Runner for ScriptedRunner {
        fn run(&mut self, protocol: &Protocol, budgets: PhaseBudgets) -> Result<TimingSample> {
            self.calls.push((protocol.id.clone(), budgets));
            Ok(self.samples.get_mut(&protocol.id).unwrap().remove(0))
        }
    }

    fn protocol(id: &str) -> Protocol {
        Protocol {
            id: id.to_string(),
            path: PathBuf::from(id),
            extra_flags: String::new(),
        }
    }

    fn completed(check: f64, proof: f64) -> TimingSample {
        TimingSample {
            check_secs: check,
            proof_secs: Some(proof),
            outcome: Outcome::Completed,
        }
    }

    fn timed_out() -> TimingSample {
        TimingSample {
            check_secs: 1.0,
            proof_secs: Some(10.0),
            outcome: Outcome::Timeout,
        }
    }

    const BUDGETS: PhaseBudgets = PhaseBudgets {
        check_secs: 5.0,
        proof_secs: 10.0,
    };

    #[test]
    fn test_estimate_is_repetitions_times_budget_sum() {
        let protocols = vec![protocol("a"), protocol("b")];
        assert_eq!(estimate_total_time(&protocols, 3, BUDGETS), 90.0);
        assert_eq!(estimate_total_time(&[], 3, BUDGETS), 0.0);
    }

    #[test]
    fn test_mean_over_three_repetitions() {
        let timing = aggregate(&[completed(1.0, 2.0), completed(1.0, 2.0), completed(1.2, 2.3)]);
        match timing {
            Timing::Benchmarked {
                mean_check_secs,
                mean_proof_secs,
            } => {
                assert!((mean_check_secs - 1.0667).abs() < 1e-4);
                assert!((mean_proof_secs - 2.1).abs() < 1e-9);
            }
            Timing::Unbenchmarkable => panic!("expected benchmarked timing"),
        }
    }

    #[test]
    fn test_mean_ignores_failed_samples() {
        let error = TimingSample {
            check_secs: 0.1,
            proof_secs: None,
            outcome: Outcome::Error,
        };
        assert_eq!(
            aggregate(&[timed_out(), completed(2.0, 4.0), error]),
            Timing::Benchmarked {
                mean_check_secs: 2.0,
                mean_proof_secs: 4.0
            }
        );
    }

    #[test]
    fn test_run_all_keeps_unbenchmarkable_protocols_in_order() {
        let mut runner = ScriptedRunner {
            samples: HashMap::from([
                ("a".to_string(), vec![completed(1.0, 1.0), timed_out()]),
                ("b".to_string(), vec![timed_out(), timed_out()]),
            ]),
            calls: Vec::new(),
        };
        let mut reporter = RecordingReporter::default();
        let protocols = vec![protocol("a"), protocol("b")];

        let store = Bencher::new(&mut runner, &mut reporter, BUDGETS, 2)
            .run_all(&protocols)
            .unwrap();

        let a = store.get("a").unwrap();
        assert_eq!(a.repetitions, 1);
        assert_eq!(a.mean_proof_secs(), Some(1.0));
        let b = store.get("b").unwrap();
        assert_eq!(b.timing, Timing::Unbenchmarkable);
        assert_eq!(b.repetitions, 2);

        let ids: Vec<&str> = store.records().iter().map(|r| r.protocol_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(runner.calls.iter().all(|(_, b)| *b == BUDGETS));
        assert_eq!(runner.calls.len(), 4);
        assert_eq!(reporter.samples().count(), 4);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "at least one repetition")]
    fn test_zero_repetitions_is_not_clamped() {
        let mut runner = ScriptedRunner {
            samples: HashMap::new(),
            calls: Vec::new(),
        };
        let mut reporter = RecordingReporter::default();
        Bencher::new(&mut runner, &mut reporter, BUDGETS, 0);
    }
}
