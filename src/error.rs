//! Error types for ntfs-collector
//!
//! One error enum for every stage of an acquisition, from opening the
//! volume device down to writing a single entry into the sink.

use thiserror::Error;

/// Main error type for collector operations
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Failed to open volume '{0}': {1}")]
    VolumeOpenError(char, std::io::Error),

    #[error("Failed to read the boot record of volume '{0}': {1}")]
    BootRecordReadError(char, std::io::Error),

    #[error("Volume '{0}' does not carry a usable NTFS boot record: {1}")]
    NotNtfsVolume(char, String),

    #[error("Failed to parse MFT record 0 on volume '{0}': {1}")]
    MftRecordZeroError(char, Box<CollectorError>),

    #[error("Failed to walk the MFT of volume '{0}': {1}")]
    MftWalkError(char, Box<CollectorError>),

    #[error("Invalid MFT record at index {0}: {1}")]
    InvalidMftRecord(u64, String),

    #[error("MFT fixup verification failed at record {0}")]
    FixupVerificationFailed(u64),

    #[error("Invalid attribute at offset {0}: {1}")]
    InvalidAttribute(u32, String),

    #[error("Data run decode error: {0}")]
    DataRunError(String),

    #[error("Extent read failed in run {run_index} at device offset {offset}: {source}")]
    ExtentReadError {
        run_index: usize,
        offset: u64,
        source: std::io::Error,
    },

    #[error("Run list of {run_count} runs ends {missing} bytes short of the stream length")]
    RunListTooShort { run_count: usize, missing: u64 },

    #[error("Failed to expand environment variables in '{path}': %{variable}% is not set")]
    EnvExpansionError { path: String, variable: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Failed to resolve the content of '{0}': {1}")]
    ResolveError(String, String),

    #[error("Failed to write entry '{0}': {1}")]
    SinkError(String, String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Request list error: {0}")]
    RequestListError(#[from] serde_json::Error),

    #[error("The sink worker terminated abnormally")]
    WorkerPanicked,
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

impl CollectorError {
    /// Check if this error aborts the whole collection run
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            CollectorError::VolumeOpenError(_, _)
                | CollectorError::BootRecordReadError(_, _)
                | CollectorError::NotNtfsVolume(_, _)
                | CollectorError::MftRecordZeroError(_, _)
                | CollectorError::InvalidPath(_)
                | CollectorError::WorkerPanicked
        )
    }

    /// Check if this error only affects a single record or file (collection can continue)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CollectorError::InvalidMftRecord(_, _)
                | CollectorError::FixupVerificationFailed(_)
                | CollectorError::InvalidAttribute(_, _)
                | CollectorError::ResolveError(_, _)
                | CollectorError::SinkError(_, _)
                | CollectorError::ExtentReadError { .. }
                | CollectorError::RunListTooShort { .. }
        )
    }

    /// Wrap this error so it can travel through an `std::io::Read` implementation
    pub fn into_io(self) -> std::io::Error {
        let kind = match &self {
            CollectorError::ExtentReadError { source, .. } => source.kind(),
            CollectorError::IoError(e) => e.kind(),
            CollectorError::RunListTooShort { .. } => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_open_error_names_letter() {
        let err = CollectorError::VolumeOpenError(
            'Q',
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such device"),
        );
        assert!(err.to_string().contains("'Q'"));
        assert!(err.is_fatal_to_run());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_extent_error_keeps_kind_through_io() {
        let err = CollectorError::ExtentReadError {
            run_index: 3,
            offset: 4096,
            source: std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
        };
        let message = err.to_string();
        assert!(message.contains("run 3"));
        assert!(message.contains("4096"));

        let io = err.into_io();
        assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
