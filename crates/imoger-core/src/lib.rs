pub mod cancel;
pub mod date;
pub mod media;
pub mod plan;
pub mod report;
pub mod scan;
pub mod transfer;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use cancel::{CancellationToken, CancelledError};
pub use media::SourceFile;
pub use plan::{build_plan, PlanEntry, PlanOptions, SkippedFile, TransferPlan};
pub use transfer::{ExecuteOptions, FailedTransfer, Operation};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Directory to look for photographs in
    pub search: PathBuf,
    /// Directory the renamed files are written into; must already exist
    pub target: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    /// Lay destinations out as `YYYY/MM/DD`
    #[serde(default)]
    pub date_directories: bool,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub set_mtime: bool,
    #[serde(default)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessResult {
    pub total_files: u64,
    pub planned: u64,
    pub transferred: u64,
    pub skipped: Vec<SkippedFile>,
    pub failed: Vec<FailedTransfer>,
    pub cancelled: bool,
    pub dry_run: bool,
    /// Set when the transfers ran but the JSON report could not be written
    pub report_error: Option<String>,
}

impl ProcessResult {
    /// False when any transfer failed, the run was cut short or the report is missing.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled && self.report_error.is_none()
    }
}

/// Control options for process execution.
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn check(&self) -> Result<(), CancelledError> {
        match &self.cancel_token {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter: emits at most every 200ms or on completion.
///
/// A `total` of 0 means the total is not known yet.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new(Instant::now() - std::time::Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = total > 0 && current + 1 >= total;
        if !is_done {
            let Ok(mut last) = self.last_emit.lock() else {
                return;
            };
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Refuse to start unless both roots are usable. Runs before any file is touched.
fn preflight(options: &ProcessOptions) -> anyhow::Result<()> {
    if !options.search.is_dir() {
        anyhow::bail!("search root {} is not a directory", options.search.display());
    }
    let meta = std::fs::metadata(&options.target).map_err(|e| {
        anyhow::anyhow!("target root {} is not accessible: {}", options.target.display(), e)
    })?;
    if !meta.is_dir() {
        anyhow::bail!("target root {} is not a directory", options.target.display());
    }
    if !options.dry_run {
        check_writable(&options.target)?;
    }
    Ok(())
}

/// Mode bits say nothing about ownership or ACLs, so try an actual write.
fn check_writable(dir: &Path) -> anyhow::Result<()> {
    let marker = dir.join(format!(".imoger-write-check-{}", std::process::id()));
    match std::fs::OpenOptions::new().write(true).create_new(true).open(&marker) {
        Ok(_) => {
            let _ = std::fs::remove_file(&marker);
            Ok(())
        }
        Err(e) => anyhow::bail!("target root {} is not writable: {}", dir.display(), e),
    }
}

/// Read capture timestamps for every discovered file, keeping discovery order.
pub fn identify_files(paths: &[PathBuf], progress: &ThrottledProgress) -> Vec<SourceFile> {
    let total = paths.len() as u64;
    let counter = AtomicU64::new(0);
    paths
        .par_iter()
        .map(|path| {
            let file = SourceFile::identify(path);
            let current = counter.fetch_add(1, Ordering::Relaxed);
            progress.report("extract", current, total, "Reading EXIF");
            file
        })
        .collect()
}

/// Run the full pipeline with progress reporting.
pub fn process(
    options: &ProcessOptions,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    process_with_control(options, &ProcessControl::default(), progress_callback)
}

/// Run the full pipeline with progress reporting and cancellation.
///
/// Cancellation before the transfer stage returns `CancelledError` with the
/// filesystem untouched. Cancellation during transfers stops after the
/// current file and is reported through `ProcessResult::cancelled`.
pub fn process_with_control(
    options: &ProcessOptions,
    control: &ProcessControl,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);

    preflight(options)?;
    let target = options.target.canonicalize()?;
    control.check()?;

    // Stage 1: Scan
    let t = Instant::now();
    let paths = scan::collect_images(&options.search, options.recursive, &tp)?;
    log::debug!("Scan took {:.2}s", t.elapsed().as_secs_f64());
    control.check()?;

    // Stage 2: Extract timestamps
    let t = Instant::now();
    let files = identify_files(&paths, &tp);
    log::debug!("Extraction took {:.2}s", t.elapsed().as_secs_f64());
    control.check()?;

    // Stage 3: Plan
    let plan = build_plan(
        &files,
        &PlanOptions {
            target,
            date_directories: options.date_directories,
            operation: options.operation,
        },
    );
    for s in &plan.skipped {
        log::warn!("Skipping {}: {}", s.path.display(), s.reason);
    }
    log::info!(
        "Planned {} file(s), skipped {} without a capture timestamp",
        plan.entries.len(),
        plan.skipped.len()
    );

    let mut result = ProcessResult {
        total_files: files.len() as u64,
        planned: plan.entries.len() as u64,
        skipped: plan.skipped.clone(),
        dry_run: options.dry_run,
        ..Default::default()
    };

    if options.dry_run {
        plan.validate()?;
        for e in &plan.entries {
            log::info!("{} {} -> {}", e.operation, e.source.display(), e.destination.display());
        }
        write_report_if_requested(options, &plan, None)?;
        return Ok(result);
    }

    // Stage 4: Transfer
    let t = Instant::now();
    let execution = transfer::execute_plan(
        &plan,
        &ExecuteOptions {
            set_mtime: options.set_mtime,
        },
        &tp,
        control.cancel_token.as_ref(),
    )?;
    log::debug!("Transfer took {:.2}s", t.elapsed().as_secs_f64());

    // Files have already moved; a missing report must not hide the summary
    if let Err(e) = write_report_if_requested(options, &plan, Some(&execution)) {
        log::error!("Could not write report: {:#}", e);
        result.report_error = Some(format!("{:#}", e));
    }

    result.transferred = execution.transferred.len() as u64;
    result.cancelled = execution.cancelled;
    result.failed = execution.failed;
    Ok(result)
}

fn write_report_if_requested(
    options: &ProcessOptions,
    plan: &TransferPlan,
    execution: Option<&transfer::ExecutionReport>,
) -> anyhow::Result<()> {
    let Some(path) = options.report.as_deref() else {
        return Ok(());
    };
    // Report relative paths against the same root the plan was built with
    let resolved = ProcessOptions {
        target: options.target.canonicalize().unwrap_or_else(|_| options.target.clone()),
        ..options.clone()
    };
    report::write_report(&resolved, plan, execution, path)
}
