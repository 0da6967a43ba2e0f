use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::plan::TransferPlan;
use crate::transfer::{ExecutionReport, Operation};
use crate::ProcessOptions;

#[derive(Serialize)]
struct RunInfo<'a> {
    search: &'a Path,
    target: &'a Path,
    operation: Operation,
    recursive: bool,
    date_directories: bool,
    dry_run: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Transferred,
    Failed,
    NotAttempted,
    Planned,
}

#[derive(Serialize)]
struct EntryRecord {
    source: PathBuf,
    /// Relative to the target root, `/`-separated
    destination: String,
    ordinal: u32,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Serialize)]
struct SkippedRecord {
    path: PathBuf,
    reason: String,
}

#[derive(Serialize)]
struct Summary {
    planned: usize,
    transferred: usize,
    skipped: usize,
    failed: usize,
    cancelled: bool,
}

#[derive(Serialize)]
struct RunReport<'a> {
    run: RunInfo<'a>,
    summary: Summary,
    entries: Vec<EntryRecord>,
    skipped: Vec<SkippedRecord>,
}

fn relative_to(dest: &Path, target: &Path) -> String {
    pathdiff::diff_paths(dest, target)
        .unwrap_or_else(|| dest.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}

/// Write a JSON account of the run: every planned entry with its outcome plus skipped files.
///
/// Without an execution report (dry run) every entry is marked `planned`.
pub fn write_report(
    options: &ProcessOptions,
    plan: &TransferPlan,
    execution: Option<&ExecutionReport>,
    report_path: &Path,
) -> anyhow::Result<()> {
    // Sources are unique within a plan
    let failed: HashMap<&Path, &str> = execution
        .map(|e| {
            e.failed
                .iter()
                .map(|f| (f.entry.source.as_path(), f.reason.as_str()))
                .collect()
        })
        .unwrap_or_default();
    let not_attempted: HashSet<&Path> = execution
        .map(|e| e.not_attempted.iter().map(|n| n.source.as_path()).collect())
        .unwrap_or_default();

    let mut entries = Vec::with_capacity(plan.entries.len());
    for entry in &plan.entries {
        let (outcome, reason) = match execution {
            None => (Outcome::Planned, None),
            Some(_) => {
                if let Some(reason) = failed.get(entry.source.as_path()) {
                    (Outcome::Failed, Some(reason.to_string()))
                } else if not_attempted.contains(entry.source.as_path()) {
                    (Outcome::NotAttempted, None)
                } else {
                    (Outcome::Transferred, None)
                }
            }
        };
        entries.push(EntryRecord {
            source: entry.source.clone(),
            destination: relative_to(&entry.destination, &options.target),
            ordinal: entry.ordinal,
            outcome,
            reason,
        });
    }

    let skipped = plan
        .skipped
        .iter()
        .map(|s| SkippedRecord {
            path: s.path.clone(),
            reason: s.reason.to_string(),
        })
        .collect();

    let report = RunReport {
        run: RunInfo {
            search: &options.search,
            target: &options.target,
            operation: options.operation,
            recursive: options.recursive,
            date_directories: options.date_directories,
            dry_run: options.dry_run,
        },
        summary: Summary {
            planned: plan.entries.len(),
            transferred: execution.map_or(0, |e| e.transferred.len()),
            skipped: plan.skipped.len(),
            failed: execution.map_or(0, |e| e.failed.len()),
            cancelled: execution.map_or(false, |e| e.cancelled),
        },
        entries,
        skipped,
    };

    let file = std::fs::File::create(report_path)?;
    serde_json::to_writer_pretty(file, &report)?;
    log::info!("Wrote report to {}", report_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::TimestampError;
    use crate::media::SourceFile;
    use crate::plan::{build_plan, PlanOptions};
    use crate::transfer::FailedTransfer;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    #[test]
    fn test_report_records_outcomes() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target");
        let t = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
        let files = vec![
            SourceFile::new("/photos/a.JPG", Ok(t)),
            SourceFile::new("/photos/b.JPG", Ok(t)),
            SourceFile::new("/photos/c.JPG", Err(TimestampError::Missing)),
        ];
        let options = ProcessOptions {
            search: PathBuf::from("/photos"),
            target: target.clone(),
            date_directories: true,
            ..Default::default()
        };
        let plan = build_plan(
            &files,
            &PlanOptions {
                target: target.clone(),
                date_directories: true,
                operation: Operation::Copy,
            },
        );
        let execution = ExecutionReport {
            transferred: vec![plan.entries[0].clone()],
            failed: vec![FailedTransfer {
                entry: plan.entries[1].clone(),
                reason: "destination already exists".into(),
            }],
            not_attempted: vec![],
            cancelled: false,
        };

        let path = dir.path().join("report.json");
        write_report(&options, &plan, Some(&execution), &path).unwrap();
        let json: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();

        assert_eq!(json["summary"]["planned"], 2);
        assert_eq!(json["summary"]["transferred"], 1);
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["summary"]["skipped"], 1);
        assert_eq!(json["entries"][0]["destination"], "2023/05/01/20230501_100000_01.JPG");
        assert_eq!(json["entries"][0]["outcome"], "transferred");
        assert_eq!(json["entries"][1]["outcome"], "failed");
        assert_eq!(json["skipped"][0]["reason"], "no capture timestamp in metadata");
    }

    #[test]
    fn test_report_matches_outcomes_by_source() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target");
        let t = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
        let files: Vec<SourceFile> = (0..6)
            .map(|i| SourceFile::new(format!("/photos/{i}.JPG"), Ok(t)))
            .collect();
        let options = ProcessOptions {
            search: PathBuf::from("/photos"),
            target: target.clone(),
            ..Default::default()
        };
        let plan = build_plan(
            &files,
            &PlanOptions {
                target: target.clone(),
                date_directories: false,
                operation: Operation::Move,
            },
        );
        let failure = |i: usize, reason: &str| FailedTransfer {
            entry: plan.entries[i].clone(),
            reason: reason.into(),
        };
        // Recorded out of plan order, as an ordered execution may do
        let execution = ExecutionReport {
            transferred: vec![plan.entries[2].clone(), plan.entries[0].clone()],
            failed: vec![failure(3, "disk full"), failure(1, "permission denied")],
            not_attempted: vec![plan.entries[5].clone(), plan.entries[4].clone()],
            cancelled: true,
        };

        let path = dir.path().join("report.json");
        write_report(&options, &plan, Some(&execution), &path).unwrap();
        let json: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();

        let outcomes: Vec<&str> = json["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["outcome"].as_str().unwrap())
            .collect();
        assert_eq!(
            outcomes,
            ["transferred", "failed", "transferred", "failed", "not_attempted", "not_attempted"]
        );
        assert_eq!(json["entries"][1]["reason"], "permission denied");
        assert_eq!(json["entries"][3]["reason"], "disk full");
        assert!(json["entries"][0].get("reason").is_none());
        assert_eq!(json["summary"]["cancelled"], true);
    }
}
