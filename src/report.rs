//! End-of-run summary for test mode.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::runners::test::{Status, TestRun, TestVerdict};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub pass: usize,
    pub fail: usize,
    pub timeout: usize,
    pub overtime: usize,
    pub unbenchmarked: usize,
    pub missing: usize,
    pub aborted: bool,
}

impl SummaryCounts {
    pub fn from_run(run: &TestRun) -> Self {
        let mut counts = Self {
            missing: run.missing.len(),
            aborted: run.aborted,
            ..Self::default()
        };
        for v in &run.verdicts {
            *counts.slot(v.status) += 1;
        }
        counts
    }

    fn slot(&mut self, status: Status) -> &mut usize {
        match status {
            Status::Pass => &mut self.pass,
            Status::Fail => &mut self.fail,
            Status::Timeout => &mut self.timeout,
            Status::Overtime => &mut self.overtime,
            Status::Unbenchmarked => &mut self.unbenchmarked,
        }
    }

    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Pass => self.pass,
            Status::Fail => self.fail,
            Status::Timeout => self.timeout,
            Status::Overtime => self.overtime,
            Status::Unbenchmarked => self.unbenchmarked,
        }
    }
}

fn row_rank(status: Status) -> u8 {
    match status {
        Status::Fail => 0,
        Status::Timeout => 1,
        Status::Overtime => 2,
        Status::Unbenchmarked => 3,
        Status::Pass => 4,
    }
}

fn secs_cell(secs: Option<f64>) -> String {
    secs.map_or_else(|| "-".to_string(), |s| format!("{s:.2}s"))
}

/// Renders one row per verdict, failures grouped first, then the totals.
pub fn render_table(run: &TestRun) -> String {
    let width = run
        .verdicts
        .iter()
        .map(|v| v.protocol_id.len())
        .chain(std::iter::once("PROTOCOL".len()))
        .max()
        .unwrap_or(0);

    // Failures first; scan order within each status.
    let mut grouped: BTreeMap<u8, Vec<&TestVerdict>> = BTreeMap::new();
    for v in &run.verdicts {
        grouped.entry(row_rank(v.status)).or_default().push(v);
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:<13}  {:>10}  {:>10}",
        "PROTOCOL", "STATUS", "OBSERVED", "ALLOWED"
    );
    for v in grouped.values().flatten() {
        let _ = writeln!(
            out,
            "{:<width$}  {:<13}  {:>10}  {:>10}",
            v.protocol_id,
            v.status.as_str(),
            secs_cell(v.observed_secs),
            secs_cell(v.allowed_secs),
        );
    }
    for id in &run.missing {
        let _ = writeln!(out, "{id:<width$}  {:<13}", "MISSING");
    }

    let counts = SummaryCounts::from_run(run);
    out.push('\n');
    let totals: Vec<String> = Status::ALL
        .iter()
        .map(|s| format!("{} {}", counts.get(*s), s.as_str()))
        .collect();
    let _ = write!(out, "{}", totals.join(", "));
    if counts.missing > 0 {
        let _ = write!(out, ", {} MISSING", counts.missing);
    }
    out.push('\n');
    if counts.aborted {
        out.push_str("run stopped at the first failure (--fail-fast)\n");
    }
    out
}
