//! Collection orchestration
//!
//! One [`Collector::collect`] call runs the whole acquisition: requests are
//! compiled, each volume of interest is opened and walked in turn, confirmed
//! files are resolved and queued, and a single worker thread streams the
//! queue into the sink.

use crate::config::CollectConfig;
use crate::error::{CollectorError, Result};
use crate::logging::LogContext;
use crate::mft::walk_mft;
use crate::pipeline::{
    run_sink_worker, stream_queue, FailedEntry, SinkReport, StreamQueue, StreamedFile,
    WrittenEntry,
};
use crate::reader::{open_file_content, FileOpener};
use crate::search::{
    build_search_terms, confirm, resolve, ExportRequest, SearchPlan, SkippedRequest,
};
use crate::sink::ResultSink;
use crate::volume::{VolumeHandle, VolumeOpener};
use std::thread;
use std::time::Instant;

/// Per-volume outcome
#[derive(Debug, Clone, Default)]
pub struct VolumeReport {
    pub letter: char,
    pub records_read: u64,
    pub candidates: usize,
    pub confirmed: usize,
    pub queued: usize,
    /// Set when the MFT walk failed and the volume was abandoned
    pub error: Option<String>,
}

/// A request that ran but found nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedRequest {
    pub request_index: usize,
    pub volume: char,
    pub full_path: String,
}

/// Outcome of a whole collection run
#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    pub volumes: Vec<VolumeReport>,
    pub skipped_requests: Vec<SkippedRequest>,
    pub unmatched_requests: Vec<UnmatchedRequest>,
    /// Entries the sink accepted, in write order
    pub written: Vec<WrittenEntry>,
    /// Files that were found but could not be resolved, opened or written
    pub failed: Vec<FailedEntry>,
}

impl CollectionReport {
    pub fn total_bytes(&self) -> u64 {
        self.written.iter().map(|entry| entry.bytes).sum()
    }

    fn merge_sink(&mut self, sink: SinkReport) {
        self.written = sink.written;
        self.failed.extend(sink.failed);
    }
}

/// Acquisition engine
pub struct Collector<O, F> {
    volumes: O,
    files: F,
    config: CollectConfig,
    log: LogContext,
}

impl<O, F> Collector<O, F>
where
    O: VolumeOpener,
    F: FileOpener,
{
    pub fn new(volumes: O, files: F) -> Self {
        Self {
            volumes,
            files,
            config: CollectConfig::default(),
            log: LogContext::default(),
        }
    }

    pub fn with_config(mut self, config: CollectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_log(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    /// Acquire every file `requests` name into `sink`.
    ///
    /// Fails on the first error that makes the run meaningless (a volume that
    /// cannot be opened, a boot record or MFT record zero that cannot be
    /// parsed). Entries queued before such a failure are still written.
    /// Everything narrower is logged and listed in the report. The sink is
    /// not finished here.
    pub fn collect<S>(&self, requests: &[ExportRequest], sink: &mut S) -> Result<CollectionReport>
    where
        S: ResultSink + Send + ?Sized,
    {
        let started = Instant::now();
        self.log.separator("COLLECT");
        self.log.debug(
            "COLLECT",
            &format!("Attempting to acquire the following files {:?}", requests),
        );

        let plan = build_search_terms(requests, &self.log)?;
        let mut report = CollectionReport {
            skipped_requests: plan.skipped.clone(),
            ..Default::default()
        };

        let (sender, receiver) = stream_queue(self.config.queue_capacity);
        let worker_log = self.log.clone();

        let (produced, sink_report) = thread::scope(|scope| {
            let worker = scope.spawn(move || run_sink_worker(receiver, sink, &worker_log));
            // The sender is moved in, so the queue closes however production ends
            let produced = self.produce(&plan, sender, &mut report);
            (produced, worker.join())
        });

        let sink_report = sink_report.map_err(|_| CollectorError::WorkerPanicked)?;
        report.merge_sink(sink_report);
        produced?;

        self.log.info(
            "COLLECT",
            &format!(
                "Collected {} files ({} failed) in {:.2?}",
                report.written.len(),
                report.failed.len(),
                started.elapsed()
            ),
        );
        Ok(report)
    }

    fn produce(
        &self,
        plan: &SearchPlan,
        queue: StreamQueue,
        report: &mut CollectionReport,
    ) -> Result<()> {
        for &letter in &plan.volumes {
            let volume_report = self.produce_volume(letter, plan, &queue, report)?;
            report.volumes.push(volume_report);
        }
        Ok(())
    }

    fn produce_volume(
        &self,
        letter: char,
        plan: &SearchPlan,
        queue: &StreamQueue,
        report: &mut CollectionReport,
    ) -> Result<VolumeReport> {
        let log = self.log.for_volume(letter);
        log.separator(&format!("VOLUME {}:", letter));

        let volume = VolumeHandle::open(&self.volumes, letter, &log)?;
        let terms = plan.terms_for(letter);
        let mut volume_report = VolumeReport {
            letter,
            ..Default::default()
        };

        let walk = match walk_mft(&volume, &terms, queue, &self.config, &log) {
            Ok(walk) => walk,
            Err(e) if e.is_fatal_to_run() => return Err(e),
            Err(e) => {
                log.error("COLLECT", &format!("Abandoning volume: {}", e));
                volume_report.error = Some(e.to_string());
                return Ok(volume_report);
            }
        };
        volume_report.records_read = walk.stats.records_read;
        volume_report.candidates = walk.candidates.len();
        volume_report.queued = walk.mft_requests.len().min(1);

        let confirmation = confirm(&walk.terms, &walk.candidates, &walk.tree);
        volume_report.confirmed = confirmation.confirmed.len();
        for request_index in confirmation.unmatched {
            let full_path = terms
                .iter()
                .find(|term| term.request_index == request_index)
                .map(|term| term.full_path_text.clone())
                .unwrap_or_default();
            log.warn("COLLECT", &format!("No file matched '{}'", full_path));
            report.unmatched_requests.push(UnmatchedRequest {
                request_index,
                volume: letter,
                full_path,
            });
        }

        let chunk_size = self.config.chunk_size_for(volume.cluster_size());
        for hit in &confirmation.confirmed {
            let opened = resolve(&volume, &walk.mft_runs, hit, chunk_size).and_then(|file| {
                let (reader, strategy) =
                    open_file_content(&volume, &file, &self.files, &self.config, &log)?;
                Ok((file.entry_name(), reader, strategy))
            });

            match opened {
                Ok((name, reader, strategy)) => {
                    log.debug(
                        "COLLECT",
                        &format!("Queueing '{}' as {} ({} read)", hit.full_path, name, strategy),
                    );
                    queue
                        .send(StreamedFile::new(name, reader))
                        .map_err(|_| CollectorError::WorkerPanicked)?;
                    volume_report.queued += 1;
                }
                Err(e) => {
                    let message = format!("Skipping '{}': {}", hit.full_path, e);
                    if e.is_recoverable() {
                        log.warn("COLLECT", &message);
                    } else {
                        log.error("COLLECT", &message);
                    }
                    report.failed.push(FailedEntry {
                        name: hit.full_path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        log.info(
            "COLLECT",
            &format!(
                "{} candidates, {} confirmed, {} queued",
                volume_report.candidates, volume_report.confirmed, volume_report.queued
            ),
        );
        Ok(volume_report)
    }
}
