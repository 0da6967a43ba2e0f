use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::date::{truncate_to_seconds, Timestamp, TimestampError};
use crate::media::SourceFile;
use crate::transfer::Operation;

#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Root every destination is placed under
    pub target: PathBuf,
    /// Nest destinations into `YYYY/MM/DD`
    pub date_directories: bool,
    pub operation: Operation,
}

/// One planned copy or move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub operation: Operation,
    pub timestamp: Timestamp,
    /// 1-based position within the group sharing `timestamp`
    pub ordinal: u32,
}

/// A file left out of the plan because it has no usable capture timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: TimestampError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferPlan {
    pub entries: Vec<PlanEntry>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("destination {} is planned more than once", .0.display())]
    DuplicateDestination(PathBuf),
    #[error("ordinals for {timestamp} are not 1..={len}")]
    OrdinalGap { timestamp: Timestamp, len: usize },
}

/// Group files by capture timestamp and name each one `YYYYMMDD_HHMMSS_NN<ext>`.
///
/// Groups are emitted in order of first discovery and members keep their
/// discovery order, so the same input always yields the same plan.
pub fn build_plan(files: &[SourceFile], options: &PlanOptions) -> TransferPlan {
    let mut group_index: HashMap<Timestamp, usize> = HashMap::new();
    let mut groups: Vec<(Timestamp, Vec<&SourceFile>)> = Vec::new();
    let mut skipped = Vec::new();

    for file in files {
        let ts = match &file.timestamp {
            Ok(ts) => truncate_to_seconds(*ts),
            Err(reason) => {
                skipped.push(SkippedFile {
                    path: file.path.clone(),
                    reason: reason.clone(),
                });
                continue;
            }
        };
        let idx = *group_index.entry(ts).or_insert_with(|| {
            groups.push((ts, Vec::new()));
            groups.len() - 1
        });
        groups[idx].1.push(file);
    }

    let mut entries = Vec::with_capacity(files.len() - skipped.len());
    for (ts, members) in &groups {
        let dir = destination_dir(&options.target, ts, options.date_directories);
        for (i, file) in members.iter().enumerate() {
            let ordinal = i as u32 + 1;
            entries.push(PlanEntry {
                source: file.path.clone(),
                destination: dir.join(file_name(ts, ordinal, &file.extension())),
                operation: options.operation,
                timestamp: *ts,
                ordinal,
            });
        }
    }

    TransferPlan { entries, skipped }
}

/// `YYYYMMDD_HHMMSS_NN` followed by `ext` verbatim.
pub fn file_name(ts: &Timestamp, ordinal: u32, ext: &str) -> String {
    format!("{}_{:02}{}", ts.format("%Y%m%d_%H%M%S"), ordinal, ext)
}

/// Flat `target`, or `target/YYYY/MM/DD` when date directories are enabled.
pub fn destination_dir(target: &Path, ts: &Timestamp, date_directories: bool) -> PathBuf {
    if date_directories {
        target
            .join(ts.format("%Y").to_string())
            .join(ts.format("%m").to_string())
            .join(ts.format("%d").to_string())
    } else {
        target.to_path_buf()
    }
}

impl TransferPlan {
    /// Check the invariants the executor relies on before touching the filesystem.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen: HashSet<&Path> = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !seen.insert(&entry.destination) {
                return Err(PlanError::DuplicateDestination(entry.destination.clone()));
            }
        }

        let mut ordinals: HashMap<Timestamp, Vec<u32>> = HashMap::new();
        for entry in &self.entries {
            ordinals.entry(entry.timestamp).or_default().push(entry.ordinal);
        }
        for (timestamp, mut found) in ordinals {
            found.sort_unstable();
            let contiguous = found.iter().zip(1u32..).all(|(&got, want)| got == want);
            if !contiguous {
                return Err(PlanError::OrdinalGap {
                    timestamp,
                    len: found.len(),
                });
            }
        }

        Ok(())
    }

    /// Indices of `entries` in the order they can be applied.
    ///
    /// When a destination is the current path of another entry's source
    /// (organising a directory in place), the occupant is moved first.
    /// Cycles keep plan order and surface as conflicts.
    pub fn execution_order(&self) -> Vec<usize> {
        let by_source: HashMap<&Path, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.source.as_path(), i))
            .collect();

        let mut placed = vec![false; self.entries.len()];
        let mut chain_of: Vec<Option<usize>> = vec![None; self.entries.len()];
        let mut order = Vec::with_capacity(self.entries.len());

        for start in 0..self.entries.len() {
            let mut chain = Vec::new();
            let mut cur = start;
            while !placed[cur] && chain_of[cur] != Some(start) {
                chain_of[cur] = Some(start);
                chain.push(cur);
                match by_source.get(self.entries[cur].destination.as_path()) {
                    Some(&next) if next != cur => cur = next,
                    _ => break,
                }
            }
            for &i in chain.iter().rev() {
                placed[i] = true;
                order.push(i);
            }
        }

        order
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
