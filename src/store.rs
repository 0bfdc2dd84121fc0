//! Benchmark file reading and writing.
//!
//! # Format
//!
//! ```text
//! <protocol id> <mean check secs> <mean proof secs> [<repetitions>]
//! ```
//!
//! One record per line, whitespace separated, written in scan order.
//! Unbenchmarkable protocols are written with `inf` for both times. Blank
//! lines and lines starting with `#` are skipped on load, so ids may not start
//! with `#` or contain whitespace. A line without the repetitions field loads
//! with one repetition.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};

/// Default benchmark file name inside the protocol root.
pub const DEFAULT_FILE_NAME: &str = "benchmark.res";

const SENTINEL: &str = "inf";

const COMMENT: char = '#';

/// True if `id` survives a write and load as a single record.
pub fn is_encodable_id(id: &str) -> bool {
    !id.is_empty() && !id.starts_with(COMMENT) && !id.chars().any(char::is_whitespace)
}

/// Baseline timing of a protocol.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timing {
    Benchmarked { mean_check_secs: f64, mean_proof_secs: f64 },
    /// No repetition completed within the benchmark budgets.
    Unbenchmarkable,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BenchmarkRecord {
    pub protocol_id: String,
    pub timing: Timing,
    /// Number of completed samples behind the means.
    pub repetitions: u32,
}

impl BenchmarkRecord {
    pub fn mean_proof_secs(&self) -> Option<f64> {
        match self.timing {
            Timing::Benchmarked {
                mean_proof_secs, ..
            } => Some(mean_proof_secs),
            Timing::Unbenchmarkable => None,
        }
    }

    pub fn mean_check_secs(&self) -> Option<f64> {
        match self.timing {
            Timing::Benchmarked {
                mean_check_secs, ..
            } => Some(mean_check_secs),
            Timing::Unbenchmarkable => None,
        }
    }
}

/// Protocol id to baseline record. Keeps insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BenchmarkStore {
    records: Vec<BenchmarkRecord>,
    index: HashMap<String, usize>,
}

impl BenchmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record. Returns `false` and leaves the store unchanged when the
    /// id is already present.
    pub fn insert(&mut self, record: BenchmarkRecord) -> bool {
        if self.index.contains_key(&record.protocol_id) {
            return false;
        }
        self.index
            .insert(record.protocol_id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    pub fn get(&self, protocol_id: &str) -> Option<&BenchmarkRecord> {
        self.index.get(protocol_id).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[BenchmarkRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose id is in `ids`, in store order.
    pub fn subset<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> BenchmarkStore {
        let keep: HashSet<&str> = ids.into_iter().collect();
        let mut out = BenchmarkStore::new();
        for record in &self.records {
            if keep.contains(record.protocol_id.as_str()) {
                out.insert(record.clone());
            }
        }
        out
    }

    /// Largest benchmarked check time, ignoring unbenchmarkable records.
    pub fn max_check_secs(&self) -> Option<f64> {
        self.records
            .iter()
            .filter_map(BenchmarkRecord::mean_check_secs)
            .reduce(f64::max)
    }

    /// Largest benchmarked proof time, ignoring unbenchmarkable records.
    pub fn max_proof_secs(&self) -> Option<f64> {
        self.records
            .iter()
            .filter_map(BenchmarkRecord::mean_proof_secs)
            .reduce(f64::max)
    }
}

fn encode_line(record: &BenchmarkRecord) -> Result<String> {
    let id = &record.protocol_id;
    if !is_encodable_id(id) {
        return Err(Error::UnencodableId(id.clone()));
    }
    Ok(match record.timing {
        Timing::Benchmarked {
            mean_check_secs,
            mean_proof_secs,
        } => format!(
            "{id} {mean_check_secs} {mean_proof_secs} {}",
            record.repetitions
        ),
        Timing::Unbenchmarkable => {
            format!("{id} {SENTINEL} {SENTINEL} {}", record.repetitions)
        }
    })
}

/// Serializes `store` to `path`. Never overwrites an existing file.
pub fn write(path: &Path, store: &BenchmarkStore) -> Result<()> {
    // Encode everything first so a bad id cannot leave a partial file behind.
    let lines = store
        .records()
        .iter()
        .map(encode_line)
        .collect::<Result<Vec<_>>>()?;

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => Error::OutputExists {
                path: path.to_path_buf(),
            },
            _ => Error::io(path, e),
        })?;

    let mut writer = BufWriter::new(file);
    for line in &lines {
        writeln!(writer, "{line}").map_err(|e| Error::io(path, e))?;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}

fn parse_secs(field: &str) -> std::result::Result<f64, String> {
    let secs: f64 = field
        .parse()
        .map_err(|_| format!("`{field}` is not a number"))?;
    if secs.is_nan() || secs < 0.0 {
        return Err(format!("`{field}` is not a valid duration"));
    }
    Ok(secs)
}

fn parse_line(line: &str) -> std::result::Result<BenchmarkRecord, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (id, check, proof, reps) = match fields.as_slice() {
        [id, check, proof] => (*id, *check, *proof, None),
        [id, check, proof, reps] => (*id, *check, *proof, Some(*reps)),
        _ => return Err(format!("expected 3 or 4 fields, found {}", fields.len())),
    };

    let check = parse_secs(check)?;
    let proof = parse_secs(proof)?;
    let repetitions = match reps {
        None => 1,
        Some(r) => match r.parse::<u32>() {
            Ok(0) | Err(_) => return Err(format!("`{r}` is not a positive repetition count")),
            Ok(n) => n,
        },
    };

    let timing = if check.is_infinite() || proof.is_infinite() {
        Timing::Unbenchmarkable
    } else {
        Timing::Benchmarked {
            mean_check_secs: check,
            mean_proof_secs: proof,
        }
    };
    Ok(BenchmarkRecord {
        protocol_id: id.to_string(),
        timing,
        repetitions,
    })
}

/// Parses benchmark file contents. `path` only labels errors.
pub fn parse(path: &Path, contents: &str) -> Result<BenchmarkStore> {
    let mut store = BenchmarkStore::new();
    for (i, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(COMMENT) {
            continue;
        }
        let malformed = |reason: String| Error::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            content: line.to_string(),
            reason,
        };
        let record = parse_line(line).map_err(malformed)?;
        if !store.insert(record) {
            return Err(malformed("duplicate protocol id".to_string()));
        }
    }
    Ok(store)
}

pub fn load(path: &Path) -> Result<BenchmarkStore> {
    let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse(path, &contents)
}
