//! Dual-strategy file reader
//!
//! Files are first opened through the operating system, which is cheap and
//! consistent for anything not exclusively locked. When that fails the
//! content is read straight from the volume through the file's run list (or
//! served from the MFT record when it is resident).

use crate::config::CollectConfig;
use crate::error::{CollectorError, Result};
use crate::extents::ExtentReader;
use crate::logging::LogContext;
use crate::ntfs::structs::total_clusters;
use crate::ntfs::DataAttribute;
use crate::search::ConfirmedFile;
use crate::volume::VolumeHandle;
use std::io::{Cursor, Read, Seek};

/// Capability to open a file by its full path through the OS
pub trait FileOpener: Send + Sync {
    fn open(&self, full_path: &str) -> std::io::Result<Box<dyn Read + Send>>;
}

/// Opens files through the filesystem API
///
/// On Windows the file is opened with read, write and delete sharing plus
/// backup semantics, so files other processes hold open are still readable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApiFileOpener;

impl FileOpener for ApiFileOpener {
    #[cfg(windows)]
    fn open(&self, full_path: &str) -> std::io::Result<Box<dyn Read + Send>> {
        let file = crate::ntfs::winapi::open_file_shared(full_path)?;
        Ok(Box::new(file))
    }

    #[cfg(not(windows))]
    fn open(&self, full_path: &str) -> std::io::Result<Box<dyn Read + Send>> {
        let file = std::fs::File::open(full_path)?;
        Ok(Box::new(file))
    }
}

/// Never opens anything, forcing every read down the raw path
#[derive(Debug, Default, Clone, Copy)]
pub struct RawOnlyFileOpener;

impl FileOpener for RawOnlyFileOpener {
    fn open(&self, full_path: &str) -> std::io::Result<Box<dyn Read + Send>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("API reads are disabled ({})", full_path),
        ))
    }
}

/// How a file's content is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    Api,
    Raw,
    Resident,
}

impl std::fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadStrategy::Api => write!(f, "API"),
            ReadStrategy::Raw => write!(f, "raw"),
            ReadStrategy::Resident => write!(f, "resident"),
        }
    }
}

/// Open `file` for streaming, API first and raw second
pub fn open_file_content<D>(
    volume: &VolumeHandle<D>,
    file: &ConfirmedFile,
    api: &dyn FileOpener,
    config: &CollectConfig,
    log: &LogContext,
) -> Result<(Box<dyn Read + Send>, ReadStrategy)>
where
    D: Read + Seek + Send + 'static,
{
    match api.open(&file.full_path) {
        Ok(reader) => {
            log.debug("READER", &format!("Got an API reader for '{}'", file.full_path));
            return Ok((reader, ReadStrategy::Api));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log.warn(
                "READER",
                &format!(
                    "'{}' is in the MFT but the API cannot find it, reading raw",
                    file.full_path
                ),
            );
        }
        Err(e) => {
            log.debug(
                "READER",
                &format!("API open of '{}' failed ({}), reading raw", file.full_path, e),
            );
        }
    }

    match &file.data {
        DataAttribute::Resident(bytes) => {
            log.debug("READER", &format!("Serving resident data of '{}'", file.full_path));
            Ok((Box::new(Cursor::new(bytes.clone())), ReadStrategy::Resident))
        }
        DataAttribute::NonResident {
            runs, data_size, ..
        } => {
            // The rest of the runs live in an extension record, which is not followed
            let covered = total_clusters(runs).saturating_mul(volume.cluster_size());
            if covered < *data_size {
                return Err(CollectorError::ResolveError(
                    file.full_path.clone(),
                    format!(
                        "run list covers {} of {} bytes, cannot read raw",
                        covered, data_size
                    ),
                ));
            }

            log.debug(
                "READER",
                &format!(
                    "Got a raw reader for '{}' with data runs: {:?}",
                    file.full_path, runs
                ),
            );
            let chunk_size = config.chunk_size_for(volume.cluster_size());
            let reader = ExtentReader::new(volume, runs.clone(), chunk_size)
                .with_length_limit(*data_size);
            Ok((Box::new(reader), ReadStrategy::Raw))
        }
    }
}
