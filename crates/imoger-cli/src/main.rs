mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use imoger_core::{CancellationToken, CancelledError, Operation, ProcessControl, ProcessOptions};

#[derive(Parser)]
#[command(name = "imoger", version, about = "Rename photographs after the capture date in their EXIF data")]
struct Cli {
    /// Directory to search for images
    search: PathBuf,

    /// Directory to write renamed images into (must exist)
    target: PathBuf,

    /// Search sub-directories too
    #[arg(short, long)]
    recursive: bool,

    /// Show progress bars
    #[arg(short, long)]
    progress: bool,

    /// Move files instead of copying them
    #[arg(short = 'm', long = "move")]
    move_files: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Organize into YYYY/MM/DD subdirectories
    #[arg(short, long)]
    date_dirs: bool,

    /// Print the plan without touching any file
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Set each written file's modification time to its capture time
    #[arg(long)]
    set_mtime: bool,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) if e.downcast_ref::<CancelledError>().is_some() => {
            eprintln!("Cancelled before any file was transferred");
            ExitCode::from(130)
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let t_total = std::time::Instant::now();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing the current file...");
        handler_token.cancel();
    })?;

    let options = ProcessOptions {
        search: cli.search,
        target: cli.target,
        recursive: cli.recursive,
        date_directories: cli.date_dirs,
        operation: if cli.move_files { Operation::Move } else { Operation::Copy },
        dry_run: cli.dry_run,
        set_mtime: cli.set_mtime,
        report: cli.report,
    };
    let control = ProcessControl::new().with_cancel_token(token);

    let bars = Arc::new(progress::CliProgress::new(cli.progress));
    let sink = Arc::clone(&bars);
    let on_progress = move |stage: &str, current: u64, total: u64, message: &str| {
        sink.update(stage, current, total, message);
    };
    let result = imoger_core::process_with_control(&options, &control, &on_progress);
    bars.finish();
    let result = result?;

    if result.dry_run {
        eprintln!(
            "Dry run: {} file(s) planned, {} skipped ({:.2}s)",
            result.planned,
            result.skipped.len(),
            t_total.elapsed().as_secs_f64()
        );
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!(
        "Done! {} transferred, {} skipped, {} failed ({:.2}s)",
        result.transferred,
        result.skipped.len(),
        result.failed.len(),
        t_total.elapsed().as_secs_f64()
    );
    if let Some(e) = &result.report_error {
        eprintln!("Report not written: {}", e);
    }

    Ok(if result.cancelled {
        ExitCode::from(130)
    } else if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
