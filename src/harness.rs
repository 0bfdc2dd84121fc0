//! Timed invocation of the prover binary.
//!
//! Each phase runs in its own process group. The harness owns the wall-clock
//! budget: the prover is assumed not to limit itself, so on expiry the whole
//! group is killed. Every way out of the running state (completion, expiry,
//! an error while waiting, unwinding) kills the group and reaps the child, so
//! helper processes the prover started (Maude, for instance) never outlive
//! the phase.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::Protocol;

/// Flag that switches the prover from the well-formedness check to proof search.
pub const PROVE_FLAG: &str = "--prove";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Process group of the phase currently running, 0 when idle.
static ACTIVE_GROUP: Mutex<u32> = Mutex::new(0);

fn active_group() -> MutexGuard<'static, u32> {
    ACTIVE_GROUP.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Timeout,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Check,
    Proof,
}

/// Wall-clock allowance per phase, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseBudgets {
    pub check_secs: f64,
    pub proof_secs: f64,
}

/// Result of a single phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseRun {
    /// True elapsed time, or the budget itself on timeout.
    pub secs: f64,
    pub outcome: Outcome,
}

/// One measured two-phase invocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimingSample {
    pub check_secs: f64,
    /// `None` when the check phase did not complete.
    pub proof_secs: Option<f64>,
    pub outcome: Outcome,
}

/// Seam between the orchestrators and process execution.
pub trait Runner {
    fn run(&mut self, protocol: &Protocol, budgets: PhaseBudgets) -> Result<TimingSample>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProcessState {
    Spawned,
    Running,
    Completed,
    TimedOut,
    Errored,
}

/// A child process that cannot leave `Running` without its group being reclaimed.
struct Supervised {
    child: Child,
    state: ProcessState,
}

impl Supervised {
    fn spawn(binary: &Path, args: &[String]) -> Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        // Held across spawn: an interrupt either sees no child yet or its group.
        let mut active = active_group();
        let child = cmd.spawn().map_err(|source| Error::Spawn {
            binary: binary.to_path_buf(),
            source,
        })?;
        *active = child.id();
        drop(active);
        trace!(pid = child.id(), "spawned");
        Ok(Self {
            child,
            state: ProcessState::Spawned,
        })
    }

    fn wait_with_budget(&mut self, budget_secs: f64) -> Result<PhaseRun> {
        let budget = budget_duration(budget_secs);
        let start = Instant::now();
        self.state = ProcessState::Running;

        loop {
            let status = match self.child.try_wait() {
                Ok(status) => status,
                Err(source) => {
                    self.leave_running(ProcessState::Errored);
                    return Err(Error::io(format!("pid {}", self.child.id()), source));
                }
            };
            let elapsed = start.elapsed();

            if let Some(status) = status {
                return Ok(self.finished(status, elapsed, budget, budget_secs));
            }
            if elapsed > budget {
                self.leave_running(ProcessState::TimedOut);
                return Ok(PhaseRun {
                    secs: budget_secs,
                    outcome: Outcome::Timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL.min(budget - elapsed));
        }
    }

    fn finished(
        &mut self,
        status: ExitStatus,
        elapsed: Duration,
        budget: Duration,
        budget_secs: f64,
    ) -> PhaseRun {
        // Exit noticed after the deadline: the process did not finish in time.
        if elapsed > budget {
            self.leave_running(ProcessState::TimedOut);
            return PhaseRun {
                secs: budget_secs,
                outcome: Outcome::Timeout,
            };
        }
        if status.success() {
            self.leave_running(ProcessState::Completed);
            PhaseRun {
                secs: elapsed.as_secs_f64(),
                outcome: Outcome::Completed,
            }
        } else {
            self.leave_running(ProcessState::Errored);
            PhaseRun {
                secs: elapsed.as_secs_f64(),
                outcome: Outcome::Error,
            }
        }
    }

    fn leave_running(&mut self, next: ProcessState) {
        kill_group(&mut self.child);
        let _ = self.child.wait();
        let mut active = active_group();
        if *active == self.child.id() {
            *active = 0;
        }
        drop(active);
        trace!(pid = self.child.id(), from = ?self.state, to = ?next, "process left running state");
        self.state = next;
    }
}

impl Drop for Supervised {
    fn drop(&mut self) {
        if matches!(self.state, ProcessState::Spawned | ProcessState::Running) {
            self.leave_running(ProcessState::Errored);
        }
    }
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    signal_group(child.id());
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn signal_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // ESRCH just means the group is already gone.
    let _ = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32) {}

fn budget_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Kills the running phase's process group and exits on Ctrl-C.
pub fn install_interrupt_handler() -> std::result::Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        let pgid = std::mem::take(&mut *active_group());
        if pgid != 0 {
            signal_group(pgid);
        }
        std::process::exit(130);
    })
}

/// Runs `binary args` once under a wall-clock budget of `budget_secs`.
///
/// Finishing exactly at the budget counts as in time.
pub fn run_phase(binary: &Path, args: &[String], budget_secs: f64) -> Result<PhaseRun> {
    let mut process = Supervised::spawn(binary, args)?;
    process.wait_with_budget(budget_secs)
}

/// [`Runner`] that invokes the real prover binary.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    binary: PathBuf,
    user_flags: Vec<String>,
}

impl ProcessRunner {
    /// `user_flags` is appended to every invocation, split on whitespace.
    pub fn new(binary: impl Into<PathBuf>, user_flags: &str) -> Self {
        Self {
            binary: binary.into(),
            user_flags: user_flags.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn args(&self, phase: Phase, protocol: &Protocol) -> Vec<String> {
        let mut args = Vec::new();
        if phase == Phase::Proof {
            args.push(PROVE_FLAG.to_string());
        }
        args.extend(self.user_flags.iter().cloned());
        args.extend(protocol.flag_args().map(str::to_string));
        args.push(protocol.path.to_string_lossy().into_owned());
        args
    }
}

impl Runner for ProcessRunner {
    fn run(&mut self, protocol: &Protocol, budgets: PhaseBudgets) -> Result<TimingSample> {
        let check = run_phase(
            &self.binary,
            &self.args(Phase::Check, protocol),
            budgets.check_secs,
        )?;
        if check.outcome != Outcome::Completed {
            return Ok(TimingSample {
                check_secs: check.secs,
                proof_secs: None,
                outcome: check.outcome,
            });
        }

        let proof = run_phase(
            &self.binary,
            &self.args(Phase::Proof, protocol),
            budgets.proof_secs,
        )?;
        Ok(TimingSample {
            check_secs: check.secs,
            proof_secs: Some(proof.secs),
            outcome: proof.outcome,
        })
    }
}
