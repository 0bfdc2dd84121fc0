//! Protocol discovery.
//!
//! A protocol is any `.spthy` file below the protocol root. Per-protocol flags
//! live in a sidecar file next to it, named `<file>.spthy.flags`.
//!
//! Every id found must be storable in a benchmark file, so a corpus holding a
//! name the file format cannot carry is rejected before anything runs.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::store;

/// Extension of Tamarin specification files.
pub const PROTOCOL_EXTENSION: &str = "spthy";

/// Suffix appended to a protocol's file name to find its flag overrides.
pub const FLAGS_SUFFIX: &str = ".flags";

/// One specification file of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    /// Path relative to the protocol root, `/`-separated. Join key between
    /// benchmark and test runs.
    pub id: String,
    pub path: PathBuf,
    /// Extra flags for this protocol only; empty when there is no sidecar.
    pub extra_flags: String,
}

impl Protocol {
    pub fn flag_args(&self) -> impl Iterator<Item = &str> {
        self.extra_flags.split_whitespace()
    }
}

fn is_protocol_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(PROTOCOL_EXTENSION)
}

fn relative_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_flags(path: &Path) -> Result<String> {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(FLAGS_SUFFIX);
    let sidecar = PathBuf::from(sidecar);
    if !sidecar.is_file() {
        return Ok(String::new());
    }
    let raw = fs::read_to_string(&sidecar).map_err(|e| Error::io(&sidecar, e))?;
    Ok(raw.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Recursively collects every protocol under `root`, ordered by id.
///
/// The order only depends on the names in the tree, so two scans of an
/// unchanged directory yield the same sequence.
pub fn scan(root: &Path) -> Result<Vec<Protocol>> {
    if !root.exists() {
        return Err(Error::Scan {
            path: root.to_path_buf(),
            reason: "directory does not exist".to_string(),
        });
    }
    if !root.is_dir() {
        return Err(Error::Scan {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Scan {
            path: e.path().unwrap_or(root).to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() || !is_protocol_file(entry.path()) {
            continue;
        }
        let id = relative_id(root, entry.path());
        if !store::is_encodable_id(&id) {
            return Err(Error::Scan {
                path: entry.path().to_path_buf(),
                reason: format!(
                    "protocol id `{id}` cannot be stored in a benchmark file \
                     (ids may not contain whitespace or start with `#`)"
                ),
            });
        }
        out.push(Protocol {
            id,
            path: entry.path().to_path_buf(),
            extra_flags: read_flags(entry.path())?,
        });
    }
    // Walk order sorts per directory; ids must be globally lexicographic.
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str, content: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }

    #[test]
    fn test_scan_finds_only_spthy_files_recursively() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.spthy", "");
        touch(dir.path(), "a/nested/deep.spthy", "");
        touch(dir.path(), "a/readme.md", "");
        touch(dir.path(), "benchmark.res", "");
        touch(dir.path(), "a/x.spthy.flags", "--heuristic=O");

        let ids: Vec<String> = scan(dir.path()).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a/nested/deep.spthy", "b.spthy"]);
    }

    #[test]
    fn test_scan_order_is_lexicographic_by_id() {
        let dir = tempdir().unwrap();
        // "a-b" sorts before "a/" as a string even though a per-directory walk
        // would visit the "a" directory first.
        touch(dir.path(), "a/z.spthy", "");
        touch(dir.path(), "a-b.spthy", "");
        touch(dir.path(), "A.spthy", "");

        let ids: Vec<String> = scan(dir.path()).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["A.spthy", "a-b.spthy", "a/z.spthy"]);
    }

    #[test]
    fn test_scan_reads_sidecar_flags() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "p.spthy", "");
        touch(dir.path(), "p.spthy.flags", "  --heuristic=O\n--stop-on-trace=BFS \n");
        touch(dir.path(), "q.spthy", "");

        let protocols = scan(dir.path()).unwrap();
        assert_eq!(protocols[0].extra_flags, "--heuristic=O --stop-on-trace=BFS");
        assert_eq!(
            protocols[0].flag_args().collect::<Vec<_>>(),
            vec!["--heuristic=O", "--stop-on-trace=BFS"]
        );
        assert_eq!(protocols[1].extra_flags, "");
        assert_eq!(protocols[1].flag_args().count(), 0);
    }

    #[test]
    fn test_scan_rejects_ids_the_benchmark_file_cannot_store() {
        for name in ["my protocol.spthy", "#draft.spthy"] {
            let dir = tempdir().unwrap();
            touch(dir.path(), "ok.spthy", "");
            touch(dir.path(), name, "");
            match scan(dir.path()).unwrap_err() {
                Error::Scan { path, .. } => assert!(path.ends_with(name), "{name}"),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_scan_accepts_hash_below_root() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "drafts/#1.spthy", "");
        let ids: Vec<String> = scan(dir.path()).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["drafts/#1.spthy"]);
    }

    #[test]
    fn test_scan_missing_root_is_scan_error() {
        let dir = tempdir().unwrap();
        let err = scan(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Scan { .. }));
    }

    #[test]
    fn test_scan_file_root_is_scan_error() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "p.spthy", "");
        let err = scan(&dir.path().join("p.spthy")).unwrap_err();
        assert!(matches!(err, Error::Scan { .. }));
    }
}
