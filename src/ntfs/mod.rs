//! NTFS on-disk format support
//!
//! This module provides the parsing the collector relies on:
//! - Volume boot record decoding (geometry, MFT location)
//! - MFT record parsing with fixup verification
//! - Data run decoding for non-resident attributes
//! - Raw volume handles on Windows

pub mod boot;
pub mod record;
pub mod structs;
#[cfg(windows)]
pub mod winapi;

// Re-export commonly used types
pub use boot::{parse_boot_record, VolumeGeometry};
pub use record::{parse_record, DataAttribute, MftRecord};
pub use structs::{DataRun, FileNameAttribute, FilenameNamespace, MftRecordHeader};
