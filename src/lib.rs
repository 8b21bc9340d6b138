//! ntfs-collector - live NTFS forensic acquisition
//!
//! Reads locked system files (registry hives, event logs, the `$MFT` itself)
//! off a running Windows machine by going underneath the filesystem: the raw
//! volume is opened, the MFT is walked to find the requested files, and their
//! clusters are streamed straight into a sink such as a zip archive.
//!
//! # Features
//!
//! - **Raw volume access**: shares read/write with every other process, so
//!   exclusive file locks do not matter
//! - **Single MFT pass**: the table is read once, even when it is exported
//! - **Two read strategies**: API open first, raw extent reads as fallback
//! - **Streaming output**: bounded queue, no file is ever held in memory whole
//!
//! # Example
//!
//! ```no_run
//! use ntfs_collector::{ApiFileOpener, Collector, ExportRequest, ImageVolumeOpener, ResultSink, ZipSink};
//! use std::path::Path;
//!
//! fn main() -> ntfs_collector::Result<()> {
//!     let volumes = ImageVolumeOpener::new().with_image('C', "disk.img");
//!     let collector = Collector::new(volumes, ApiFileOpener);
//!
//!     let requests = vec![
//!         ExportRequest::literal(r"C:\$MFT", "$MFT"),
//!         ExportRequest::literal(r"C:\Windows\System32\config\SYSTEM", "SYSTEM"),
//!     ];
//!
//!     let mut sink = ZipSink::create(Path::new("evidence.zip"))?;
//!     let report = collector.collect(&requests, &mut sink)?;
//!     sink.finish()?;
//!
//!     println!("{} files, {} bytes", report.written.len(), report.total_bytes());
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod extents;
pub mod logging;
pub mod mft;
pub mod ntfs;
pub mod pipeline;
pub mod presets;
pub mod reader;
pub mod search;
pub mod sink;
pub mod tee;
pub mod tree;
pub mod volume;

// Re-export main types
pub use collector::{CollectionReport, Collector, UnmatchedRequest, VolumeReport};
pub use config::CollectConfig;
pub use error::{CollectorError, Result};
pub use extents::ExtentReader;
pub use logging::LogContext;
pub use mft::{walk_mft, MftWalk};
pub use pipeline::{FailedEntry, StreamedFile, WrittenEntry};
pub use reader::{open_file_content, ApiFileOpener, FileOpener, RawOnlyFileOpener, ReadStrategy};
pub use search::{
    build_search_terms, confirm, expand_environment, mft_entry_name, resolve, CandidateMatch,
    ConfirmedFile, ConfirmedMatch, ExportRequest, SearchTerm,
};
pub use sink::{ResultSink, ZipSink};
pub use tee::{tee, TeeBranch, TeeReader};
pub use tree::{build_tree, DirectoryTree};
pub use volume::{identify_volumes_of_interest, ImageVolumeOpener, VolumeHandle, VolumeOpener};

#[cfg(windows)]
pub use volume::RawVolumeOpener;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
