use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::date::Timestamp;
use crate::plan::{PlanEntry, TransferPlan};
use crate::ThrottledProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Copy,
    Move,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Copy => write!(f, "copy"),
            Operation::Move => write!(f, "move"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("destination already exists: {}", .0.display())]
    Conflict(PathBuf),
    #[error("cannot create directory {}: {source}", .path.display())]
    Directory { path: PathBuf, source: io::Error },
    #[error("{operation} failed: {source}")]
    Io { operation: Operation, source: io::Error },
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Stamp each destination's mtime with its capture timestamp
    pub set_mtime: bool,
}

/// A plan entry that could not be applied.
#[derive(Debug, Clone, Serialize)]
pub struct FailedTransfer {
    pub entry: PlanEntry,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub transferred: Vec<PlanEntry>,
    pub failed: Vec<FailedTransfer>,
    /// Entries never attempted because the run was cancelled
    pub not_attempted: Vec<PlanEntry>,
    pub cancelled: bool,
}

/// Create `path` and its ancestors. Existing directories are not an error.
pub fn ensure_directory(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Copy or move one file without ever replacing an existing destination.
pub fn transfer(source: &Path, destination: &Path, operation: Operation) -> Result<(), TransferError> {
    match operation {
        Operation::Copy => copy_new(source, destination),
        Operation::Move => move_new(source, destination),
    }
}

fn copy_new(source: &Path, destination: &Path) -> Result<(), TransferError> {
    let io_err = |source| TransferError::Io {
        operation: Operation::Copy,
        source,
    };

    let mut input = File::open(source).map_err(io_err)?;
    let permissions = input.metadata().map_err(io_err)?.permissions();

    let output = match OpenOptions::new().write(true).create_new(true).open(destination) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(TransferError::Conflict(destination.to_path_buf()));
        }
        Err(e) => return Err(io_err(e)),
    };

    let written = (|| -> io::Result<()> {
        let mut out = BufWriter::new(output);
        io::copy(&mut input, &mut out)?;
        out.flush()?;
        fs::set_permissions(destination, permissions)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(destination);
        return Err(io_err(e));
    }
    Ok(())
}

fn move_new(source: &Path, destination: &Path) -> Result<(), TransferError> {
    // rename() silently replaces on most platforms
    if destination.symlink_metadata().is_ok() {
        return Err(TransferError::Conflict(destination.to_path_buf()));
    }

    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // Cross-device moves land here; fall back to copy + delete.
            log::debug!(
                "rename {} -> {} failed ({}), copying instead",
                source.display(),
                destination.display(),
                rename_err
            );
            copy_new(source, destination).map_err(|e| match e {
                TransferError::Io { source, .. } => TransferError::Io {
                    operation: Operation::Move,
                    source,
                },
                other => other,
            })?;
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(destination);
                return Err(TransferError::Io {
                    operation: Operation::Move,
                    source: e,
                });
            }
            Ok(())
        }
    }
}

fn stamp_mtime(destination: &Path, ts: &Timestamp) {
    // Capture times carry no zone; treat them as local time. A reading
    // repeated by a DST fall-back resolves to its first occurrence.
    let Some(local) = ts.and_local_timezone(chrono::Local).earliest() else {
        log::warn!(
            "Not setting mtime on {}: {} does not exist in the local time zone",
            destination.display(),
            ts
        );
        return;
    };
    let ft = filetime::FileTime::from_unix_time(local.timestamp(), 0);
    if let Err(e) = filetime::set_file_mtime(destination, ft) {
        log::warn!("Could not set mtime on {}: {}", destination.display(), e);
    }
}

/// Apply every entry of a validated plan, one at a time.
///
/// A failing entry is recorded and the batch carries on. Cancellation stops
/// before the next entry; nothing already applied is rolled back.
pub fn execute_plan(
    plan: &TransferPlan,
    options: &ExecuteOptions,
    progress: &ThrottledProgress,
    cancel_token: Option<&CancellationToken>,
) -> anyhow::Result<ExecutionReport> {
    plan.validate()?;

    let total = plan.entries.len() as u64;
    let mut created_dirs: HashSet<PathBuf> = HashSet::new();
    let mut report = ExecutionReport::default();

    let order = plan.execution_order();
    for (idx, &entry_idx) in order.iter().enumerate() {
        if cancel_token.is_some_and(|t| t.is_cancelled()) {
            log::warn!("Cancelled, {} transfer(s) not attempted", order.len() - idx);
            report.not_attempted = order[idx..].iter().map(|&i| plan.entries[i].clone()).collect();
            report.cancelled = true;
            break;
        }

        let entry = &plan.entries[entry_idx];
        match apply_entry(entry, options, &mut created_dirs) {
            Ok(()) => {
                log::debug!(
                    "{} {} -> {}",
                    entry.operation,
                    entry.source.display(),
                    entry.destination.display()
                );
                report.transferred.push(entry.clone());
            }
            Err(e) => {
                log::warn!("Failed to {} {}: {}", entry.operation, entry.source.display(), e);
                report.failed.push(FailedTransfer {
                    entry: entry.clone(),
                    reason: e.to_string(),
                });
            }
        }

        progress.report("transfer", idx as u64, total, "Transferring files");
    }

    Ok(report)
}

fn apply_entry(
    entry: &PlanEntry,
    options: &ExecuteOptions,
    created_dirs: &mut HashSet<PathBuf>,
) -> Result<(), TransferError> {
    if let Some(dir) = entry.destination.parent() {
        if !created_dirs.contains(dir) {
            ensure_directory(dir).map_err(|source| TransferError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
            created_dirs.insert(dir.to_path_buf());
        }
    }

    // Re-running over an already organised tree plans files onto themselves
    if entry.source == entry.destination {
        log::debug!("{} is already in place", entry.source.display());
        return Ok(());
    }

    transfer(&entry.source, &entry.destination, entry.operation)?;

    if options.set_mtime {
        stamp_mtime(&entry.destination, &entry.timestamp);
    }
    Ok(())
}
