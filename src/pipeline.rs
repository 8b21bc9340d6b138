//! Streaming pipeline
//!
//! Producers push named streams into a bounded queue; a single worker drains
//! it into the sink in enqueue order. Pushing blocks while the queue is
//! full. Dropping every sender closes the queue and lets the worker return.

use crate::logging::LogContext;
use crate::sink::ResultSink;
use crossbeam_channel::{bounded, Receiver, Sender};
use humansize::{format_size, BINARY};
use std::io::Read;

/// A named, read-once source headed for the sink
pub struct StreamedFile {
    pub name: String,
    pub reader: Box<dyn Read + Send>,
}

impl StreamedFile {
    pub fn new(name: impl Into<String>, reader: Box<dyn Read + Send>) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }
}

impl std::fmt::Debug for StreamedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedFile").field("name", &self.name).finish()
    }
}

/// Producer side of the queue
pub type StreamQueue = Sender<StreamedFile>;

/// Create the bounded queue between producers and the sink worker
pub fn stream_queue(capacity: usize) -> (Sender<StreamedFile>, Receiver<StreamedFile>) {
    bounded(capacity.max(1))
}

/// An entry the sink accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenEntry {
    pub name: String,
    pub bytes: u64,
}

/// A file that could not be acquired or written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    pub name: String,
    pub reason: String,
}

/// What the worker did with the queue
#[derive(Debug, Clone, Default)]
pub struct SinkReport {
    pub written: Vec<WrittenEntry>,
    pub failed: Vec<FailedEntry>,
}

impl SinkReport {
    pub fn total_bytes(&self) -> u64 {
        self.written.iter().map(|entry| entry.bytes).sum()
    }
}

/// Drain `queue` into `sink` until every sender is gone.
///
/// A failing entry is logged and recorded; the worker moves on to the next.
pub fn run_sink_worker<S>(queue: Receiver<StreamedFile>, sink: &mut S, log: &LogContext) -> SinkReport
where
    S: ResultSink + ?Sized,
{
    let mut report = SinkReport::default();

    for mut file in queue.iter() {
        match sink.write_entry(&file.name, &mut file.reader) {
            Ok(bytes) => {
                log.debug(
                    "SINK",
                    &format!("Wrote '{}' ({})", file.name, format_size(bytes, BINARY)),
                );
                report.written.push(WrittenEntry {
                    name: file.name,
                    bytes,
                });
            }
            Err(e) => {
                log.error("SINK", &format!("Failed to write '{}': {}", file.name, e));
                report.failed.push(FailedEntry {
                    name: file.name,
                    reason: e.to_string(),
                });
            }
        }
    }

    log.debug(
        "SINK",
        &format!(
            "Queue closed: {} entries written, {} failed",
            report.written.len(),
            report.failed.len()
        ),
    );
    report
}
