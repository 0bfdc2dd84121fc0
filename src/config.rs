//! Validated settings for the two modes.
//!
//! The command line hands raw values in; everything that would make a run
//! meaningless is rejected here as [`Error::Config`] before any protocol runs.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::harness::PhaseBudgets;
use crate::store::DEFAULT_FILE_NAME;

/// Settings shared by both modes.
#[derive(Clone, Debug)]
pub struct Common {
    pub binary: PathBuf,
    pub protocols: PathBuf,
    /// Appended to every invocation.
    pub user_flags: String,
}

#[derive(Clone, Debug)]
pub struct BenchSettings {
    pub common: Common,
    pub budgets: PhaseBudgets,
    pub repetitions: u32,
    pub output: PathBuf,
}

#[derive(Clone, Debug)]
pub struct TestSettings {
    pub common: Common,
    pub input: PathBuf,
    pub contingency: f64,
    pub max_check_secs: Option<f64>,
    pub max_proof_secs: Option<f64>,
    pub overtime: bool,
    pub fail_fast: bool,
}

fn positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::Config(format!("{name} must be a positive number, got {value}")))
    }
}

fn validate_common(common: &Common) -> Result<()> {
    if !common.binary.is_file() {
        return Err(Error::Config(format!(
            "prover binary {} does not exist",
            common.binary.display()
        )));
    }
    if !common.protocols.is_dir() {
        return Err(Error::Config(format!(
            "protocol directory {} does not exist",
            common.protocols.display()
        )));
    }
    Ok(())
}

fn default_file(protocols: &Path) -> PathBuf {
    protocols.join(DEFAULT_FILE_NAME)
}

impl BenchSettings {
    /// Both max times are mandatory in benchmark mode.
    pub fn new(
        common: Common,
        max_check_secs: Option<f64>,
        max_proof_secs: Option<f64>,
        repetitions: u32,
        output: Option<PathBuf>,
    ) -> Result<Self> {
        validate_common(&common)?;
        let (Some(check), Some(proof)) = (max_check_secs, max_proof_secs) else {
            return Err(Error::Config(
                "benchmark mode requires both --max-check and --max-proof".to_string(),
            ));
        };
        let budgets = PhaseBudgets {
            check_secs: positive("--max-check", check)?,
            proof_secs: positive("--max-proof", proof)?,
        };
        if repetitions == 0 {
            return Err(Error::Config("--repetitions must be at least 1".to_string()));
        }

        let output = output.unwrap_or_else(|| default_file(&common.protocols));
        if output.exists() {
            return Err(Error::Config(format!(
                "benchmark file already exists at {}",
                output.display()
            )));
        }
        Ok(Self {
            common,
            budgets,
            repetitions,
            output,
        })
    }
}

impl TestSettings {
    pub fn new(
        common: Common,
        input: Option<PathBuf>,
        contingency: f64,
        max_check_secs: Option<f64>,
        max_proof_secs: Option<f64>,
        overtime: bool,
        fail_fast: bool,
    ) -> Result<Self> {
        validate_common(&common)?;
        let input = input.unwrap_or_else(|| default_file(&common.protocols));
        if !input.is_file() {
            return Err(Error::Config(format!(
                "could not find benchmark file {}",
                input.display()
            )));
        }
        let contingency = positive("--contingency", contingency)?;
        let max_check_secs = max_check_secs
            .map(|v| positive("--max-check", v))
            .transpose()?;
        let max_proof_secs = max_proof_secs
            .map(|v| positive("--max-proof", v))
            .transpose()?;
        Ok(Self {
            common,
            input,
            contingency,
            max_check_secs,
            max_proof_secs,
            overtime,
            fail_fast,
        })
    }
}
