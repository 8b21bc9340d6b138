//! Directory tree builder
//!
//! Consumes the MFT stream once, front to back. Directories are kept as a
//! record number -> (name, parent) map so full paths can be rebuilt later;
//! files are never stored, only matched by leaf name against the active
//! search terms as they stream past.

use crate::error::Result;
use crate::logging::LogContext;
use crate::ntfs::structs::{MFT_RECORD_SIGNATURE, ROOT_RECORD_NUMBER};
use crate::ntfs::{parse_record, MftRecord};
use crate::search::{CandidateMatch, SearchTerm};
use std::collections::{HashMap, HashSet};
use std::io::Read;

/// Directory records of one volume
#[derive(Debug, Clone)]
pub struct DirectoryTree {
    volume: char,
    directories: HashMap<u64, (String, u64)>,
}

impl DirectoryTree {
    pub fn new(volume: char) -> Self {
        Self {
            volume,
            directories: HashMap::new(),
        }
    }

    pub fn volume(&self) -> char {
        self.volume
    }

    pub fn insert(&mut self, record_number: u64, name: String, parent_record_number: u64) {
        self.directories
            .insert(record_number, (name, parent_record_number));
    }

    pub fn get(&self, record_number: u64) -> Option<(&str, u64)> {
        self.directories
            .get(&record_number)
            .map(|(name, parent)| (name.as_str(), *parent))
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    /// Rebuild `X:\dir\...\name` for an entry whose parent directory is
    /// `parent_record_number`. `None` when the chain does not reach the root
    /// (orphaned or looping).
    pub fn full_path(&self, parent_record_number: u64, name: &str) -> Option<String> {
        let mut components = vec![name];
        let mut visited = HashSet::new();
        let mut current = parent_record_number;

        while current != ROOT_RECORD_NUMBER {
            if !visited.insert(current) {
                return None;
            }
            let (dir_name, parent) = self.directories.get(&current)?;
            components.push(dir_name.as_str());
            current = *parent;
        }

        components.reverse();
        Some(format!("{}:\\{}", self.volume, components.join("\\")))
    }
}

/// Walk statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub records_read: u64,
    pub records_parsed: u64,
    pub records_failed: u64,
    pub directories: u64,
}

/// Read the MFT stream record by record, collecting directories and
/// name-matching candidates for `terms`.
///
/// Unused slots and records that fail to parse are skipped; only a failing
/// stream aborts the build.
pub fn build_tree<R: Read>(
    reader: &mut R,
    volume: char,
    record_size: u64,
    terms: &[SearchTerm],
    log: &LogContext,
) -> Result<(DirectoryTree, Vec<CandidateMatch>, TreeStats)> {
    let mut tree = DirectoryTree::new(volume);
    let mut candidates = Vec::new();
    let mut stats = TreeStats::default();
    let mut buffer = vec![0u8; record_size as usize];
    let mut record_number = 0u64;

    loop {
        let filled = read_record(reader, &mut buffer)?;
        if filled < buffer.len() {
            if filled > 0 {
                log.debug(
                    "TREE",
                    &format!("Ignoring {} trailing bytes after record {}", filled, record_number),
                );
            }
            break;
        }
        stats.records_read += 1;

        let signature = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        if signature == MFT_RECORD_SIGNATURE {
            match parse_record(record_number, &mut buffer) {
                Ok(record) => {
                    stats.records_parsed += 1;
                    visit_record(&record, terms, &mut tree, &mut candidates, &mut stats);
                }
                Err(e) => {
                    stats.records_failed += 1;
                    log.debug("TREE", &format!("Skipping record {}: {}", record_number, e));
                }
            }
        }
        record_number += 1;
    }

    log.info(
        "TREE",
        &format!(
            "Walked {} MFT records: {} parsed, {} unreadable, {} directories, {} candidates",
            stats.records_read,
            stats.records_parsed,
            stats.records_failed,
            stats.directories,
            candidates.len()
        ),
    );

    Ok((tree, candidates, stats))
}

fn visit_record(
    record: &MftRecord,
    terms: &[SearchTerm],
    tree: &mut DirectoryTree,
    candidates: &mut Vec<CandidateMatch>,
    stats: &mut TreeStats,
) {
    if !record.in_use || !record.is_base_record {
        return;
    }

    if record.is_directory {
        if let Some(name) = record.best_name() {
            tree.insert(
                record.record_number,
                name.name.clone(),
                name.parent_record_number(),
            );
            stats.directories += 1;
        }
        return;
    }

    // Each hard link is its own path; DOS aliases only when nothing else exists
    let names: Vec<_> = if record.long_names().next().is_some() {
        record.long_names().collect()
    } else {
        record.best_name().into_iter().collect()
    };

    for name in names {
        for (term_index, term) in terms.iter().enumerate() {
            if term.file_name.matches(&name.name) {
                candidates.push(CandidateMatch {
                    record_number: record.record_number,
                    sequence_number: record.sequence_number,
                    parent_record_number: name.parent_record_number(),
                    file_name: name.name.clone(),
                    term_index,
                });
            }
        }
    }
}

/// Fill `buffer` as far as the stream allows
fn read_record<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
