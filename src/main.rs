//! ntfs-collector CLI
//!
//! Acquires artifact groups (or an explicit request list) from live volumes
//! or raw NTFS images into a zip archive.

use chrono::Local;
use clap::Parser;
use console::style;
use humansize::{format_size, BINARY};
use ntfs_collector::presets::{load_request_list, requests_for};
use ntfs_collector::{
    CollectionReport, Collector, CollectorError, ExportRequest, FileOpener, ImageVolumeOpener,
    LogContext, RawOnlyFileOpener, ResultSink, VolumeOpener, ZipSink,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// ntfs-collector - live NTFS forensic file collector
///
/// Walks the MFT of each volume of interest and copies the requested files,
/// locked or not, into a zip archive.
#[derive(Parser)]
#[command(name = "ntfs-collector")]
#[command(version)]
#[command(about = "Live NTFS forensic file collector", long_about = None)]
struct Cli {
    /// Output file name for the zip (default: collection_<timestamp>.zip)
    #[arg(short = 'z', long = "zipname")]
    zip_name: Option<PathBuf>,

    /// Log debug information to this file
    #[arg(short, long)]
    debug: Option<PathBuf>,

    /// Artifact groups to collect: a=all, m=$MFT, r=system hives,
    /// u=user hives, e=event logs, w=web history (e.g. "mrue")
    #[arg(short, long, default_value = "a")]
    gather: String,

    /// JSON request list to collect instead of the artifact groups
    #[arg(short, long)]
    requests: Option<PathBuf>,

    /// Read volume X from a raw NTFS image instead of the live device (X=PATH)
    #[arg(long = "image", value_parser = parse_image_mapping)]
    images: Vec<(char, PathBuf)>,

    /// Never open files through the API; read everything from raw clusters
    #[arg(long)]
    raw_only: bool,

    /// Print the collection report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_image_mapping(value: &str) -> Result<(char, PathBuf), String> {
    let (letter, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected X=PATH, got '{}'", value))?;
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() && !path.is_empty() => {
            Ok((letter.to_ascii_uppercase(), PathBuf::from(path)))
        }
        _ => Err(format!("expected X=PATH, got '{}'", value)),
    }
}

fn main() {
    let cli = Cli::parse();

    let max_level = match ntfs_collector::logging::init(cli.debug.as_deref()) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("{} failed to set up logging: {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    let log = LogContext::new(max_level);
    log.info("MAIN", &format!("ntfs-collector {} starting up", ntfs_collector::VERSION));

    if let Err(e) = run(&cli, log) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli, log: LogContext) -> ntfs_collector::Result<()> {
    let requests = match &cli.requests {
        Some(path) => load_request_list(path)?,
        None => requests_for(&cli.gather),
    };
    if requests.is_empty() {
        return Err(CollectorError::InvalidPath(format!(
            "nothing to collect for gather letters '{}'",
            cli.gather
        )));
    }

    let zip_name = cli.zip_name.clone().unwrap_or_else(default_zip_name);

    if cli.images.is_empty() {
        live_collect(cli, &requests, &zip_name, log)
    } else {
        let volumes = cli
            .images
            .iter()
            .fold(ImageVolumeOpener::new(), |opener, (letter, path)| {
                opener.with_image(*letter, path)
            });
        // Image paths do not exist on this machine, so the API would only miss
        collect_with(volumes, RawOnlyFileOpener, cli, &requests, &zip_name, log)
    }
}

#[cfg(windows)]
fn live_collect(
    cli: &Cli,
    requests: &[ExportRequest],
    zip_name: &Path,
    log: LogContext,
) -> ntfs_collector::Result<()> {
    let volumes = ntfs_collector::RawVolumeOpener;
    if cli.raw_only {
        collect_with(volumes, RawOnlyFileOpener, cli, requests, zip_name, log)
    } else {
        collect_with(volumes, ntfs_collector::ApiFileOpener, cli, requests, zip_name, log)
    }
}

#[cfg(not(windows))]
fn live_collect(
    _cli: &Cli,
    _requests: &[ExportRequest],
    _zip_name: &Path,
    _log: LogContext,
) -> ntfs_collector::Result<()> {
    Err(CollectorError::InvalidPath(
        "live volumes can only be read on Windows; map images with --image X=PATH".to_string(),
    ))
}

fn collect_with<O, F>(
    volumes: O,
    files: F,
    cli: &Cli,
    requests: &[ExportRequest],
    zip_name: &Path,
    log: LogContext,
) -> ntfs_collector::Result<()>
where
    O: VolumeOpener,
    F: FileOpener,
{
    let start = Instant::now();
    println!(
        "{} Collecting {} requests into {}",
        style("→").cyan().bold(),
        requests.len(),
        style(zip_name.display()).yellow()
    );

    let collector = Collector::new(volumes, files).with_log(log);
    let mut sink = ZipSink::create(zip_name)?;
    let collected = collector.collect(requests, &mut sink);
    // Close the archive even after a fatal error so queued entries survive
    let finished = sink.finish();
    let report = collected?;
    finished?;

    if cli.json {
        print_json(&report, zip_name, start.elapsed().as_secs_f64());
    } else {
        print_summary(&report, start.elapsed());
    }
    Ok(())
}

fn default_zip_name() -> PathBuf {
    PathBuf::from(format!("collection_{}.zip", Local::now().format("%Y%m%d_%H%M%S")))
}

fn print_summary(report: &CollectionReport, elapsed: std::time::Duration) {
    println!();
    println!(
        "{} Collection complete in {:.2?}",
        style("✓").green().bold(),
        elapsed
    );
    println!();
    println!("  {} {}", style("Files:").bold(), report.written.len());
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        style(format_size(report.total_bytes(), BINARY)).yellow()
    );

    for volume in &report.volumes {
        match &volume.error {
            Some(error) => println!(
                "  {} {}: {}",
                style("Volume").bold(),
                volume.letter,
                style(error).red()
            ),
            None => println!(
                "  {} {}: {} records, {} confirmed, {} queued",
                style("Volume").bold(),
                volume.letter,
                volume.records_read,
                volume.confirmed,
                volume.queued
            ),
        }
    }

    for skipped in &report.skipped_requests {
        println!(
            "  {} {} ({})",
            style("Skipped:").yellow(),
            skipped.full_path,
            skipped.reason
        );
    }
    for unmatched in &report.unmatched_requests {
        println!("  {} {}", style("Not found:").dim(), unmatched.full_path);
    }
    for failed in &report.failed {
        println!(
            "  {} {} ({})",
            style("Failed:").red(),
            failed.name,
            failed.reason
        );
    }
}

fn print_json(report: &CollectionReport, zip_name: &Path, elapsed_seconds: f64) {
    println!(
        "{}",
        serde_json::json!({
            "zip": zip_name.display().to_string(),
            "files": report.written.iter().map(|entry| serde_json::json!({
                "name": entry.name,
                "bytes": entry.bytes,
            })).collect::<Vec<_>>(),
            "total_bytes": report.total_bytes(),
            "total_size_formatted": format_size(report.total_bytes(), BINARY),
            "volumes": report.volumes.iter().map(|volume| serde_json::json!({
                "letter": volume.letter.to_string(),
                "records": volume.records_read,
                "candidates": volume.candidates,
                "confirmed": volume.confirmed,
                "queued": volume.queued,
                "error": volume.error,
            })).collect::<Vec<_>>(),
            "skipped": report.skipped_requests.iter().map(|s| serde_json::json!({
                "full_path": s.full_path,
                "reason": s.reason,
            })).collect::<Vec<_>>(),
            "not_found": report.unmatched_requests.iter().map(|u| u.full_path.clone()).collect::<Vec<_>>(),
            "failed": report.failed.iter().map(|f| serde_json::json!({
                "name": f.name,
                "reason": f.reason,
            })).collect::<Vec<_>>(),
            "elapsed_seconds": elapsed_seconds,
        })
    );
}
