use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::report::SummaryCounts;
use crate::runners::test::TestVerdict;
use crate::store::BenchmarkRecord;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub tester_version: String,
    pub mode: String,
    pub timestamp_utc: String,
    pub binary: String,
    /// Lets a test report be matched to the exact prover build.
    pub binary_sha256: Option<String>,
    pub git_sha: Option<String>,
}

impl RunMeta {
    pub fn new(mode: &str, binary: &Path) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            tester_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: mode.to_string(),
            timestamp_utc: now_utc(),
            binary: binary.to_string_lossy().into_owned(),
            binary_sha256: sha256_file(binary).ok().map(hex),
            git_sha: git_sha_short(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport<'a> {
    pub run: RunMeta,
    pub repetitions: u32,
    pub max_check_secs: f64,
    pub max_proof_secs: f64,
    pub records: &'a [BenchmarkRecord],
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport<'a> {
    pub run: RunMeta,
    pub contingency: f64,
    pub verdicts: &'a [TestVerdict],
    pub missing: &'a [String],
    pub summary: SummaryCounts,
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    // Best-effort: read from environment set by CI/build scripts.
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn sha256_file(path: &Path) -> io::Result<[u8; 32]> {
    let bytes = fs::read(path)?;
    Ok(Sha256::digest(&bytes).into())
}

fn hex(d: [u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in d {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Writes `report` as pretty JSON, or to stdout when `out` is `None`.
pub fn emit<T: Serialize>(report: &T, out: Option<&Path>) -> io::Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    match out {
        Some(path) => fs::write(path, json),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
