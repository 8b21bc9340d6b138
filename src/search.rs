//! Search and match engine
//!
//! Requests are expanded and compiled once into [`SearchTerm`]s. The tree
//! builder matches leaf names while it walks the MFT, which over-matches on
//! purpose; [`confirm`] then re-checks every candidate against the full path
//! and [`resolve`] re-reads the surviving records to get their content.

use crate::error::{CollectorError, Result};
use crate::extents::ExtentReader;
use crate::logging::LogContext;
use crate::ntfs::{parse_record, DataAttribute, DataRun};
use crate::tree::DirectoryTree;
use crate::volume::{identify_volumes_of_interest, volume_letter_of, VolumeHandle};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Seek};

/// Leaf name of the MFT itself, exported from the walk instead of being resolved
pub const MFT_FILE_NAME: &str = "$mft";

// ============================================================================
// Requests
// ============================================================================

/// One file (or family of files) to acquire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Full path including the volume letter; may hold `%VAR%` tokens
    pub full_path: String,
    #[serde(default)]
    pub is_full_path_regex: bool,
    /// Leaf name the MFT walk matches on
    pub file_name: String,
    #[serde(default)]
    pub is_file_name_regex: bool,
}

impl ExportRequest {
    /// Request for one exact path
    pub fn literal(full_path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            is_full_path_regex: false,
            file_name: file_name.into(),
            is_file_name_regex: false,
        }
    }

    /// Request whose full path is a pattern, with either a literal or pattern leaf name
    pub fn pattern(
        full_path: impl Into<String>,
        file_name: impl Into<String>,
        is_file_name_regex: bool,
    ) -> Self {
        Self {
            full_path: full_path.into(),
            is_full_path_regex: true,
            file_name: file_name.into(),
            is_file_name_regex,
        }
    }
}

/// Expand `%VAR%` tokens in the full path from the process environment
pub fn expand_environment(request: &ExportRequest) -> Result<ExportRequest> {
    expand_environment_with(request, |name| std::env::var(name).ok())
}

/// Expand `%VAR%` tokens using `lookup`. A lone `%` with no closing partner is
/// kept as is; `%%` stands for a literal `%`.
pub fn expand_environment_with<F>(request: &ExportRequest, lookup: F) -> Result<ExportRequest>
where
    F: Fn(&str) -> Option<String>,
{
    let source = request.full_path.as_str();
    let mut expanded = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find('%') {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(0) => {
                expanded.push('%');
                rest = &after[1..];
            }
            Some(end) => {
                let name = &after[..end];
                let value = lookup(name).ok_or_else(|| CollectorError::EnvExpansionError {
                    path: request.full_path.clone(),
                    variable: name.to_string(),
                })?;
                expanded.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                expanded.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    expanded.push_str(rest);

    Ok(ExportRequest {
        full_path: expanded,
        ..request.clone()
    })
}

// ============================================================================
// Search terms
// ============================================================================

/// Case-insensitive string predicate
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Exact match, stored lowercased
    Literal(String),
    /// Anchored, case-insensitive pattern
    Pattern(Regex),
}

impl Predicate {
    pub fn literal(text: &str) -> Self {
        Predicate::Literal(text.to_lowercase())
    }

    /// Compile `pattern` anchored at both ends
    pub fn pattern(pattern: &str) -> Result<Self> {
        RegexBuilder::new(&format!("^(?:{})$", pattern))
            .case_insensitive(true)
            .build()
            .map(Predicate::Pattern)
            .map_err(|source| CollectorError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Predicate::Literal(expected) => text.to_lowercase() == *expected,
            Predicate::Pattern(regex) => regex.is_match(text),
        }
    }

    fn is_literal(&self, text: &str) -> bool {
        matches!(self, Predicate::Literal(expected) if expected == text)
    }
}

/// A compiled request, bound to its volume
#[derive(Debug, Clone)]
pub struct SearchTerm {
    pub volume: char,
    /// Position of the originating request in the caller's list
    pub request_index: usize,
    /// Expanded full path, kept for reporting
    pub full_path_text: String,
    pub file_name: Predicate,
    pub full_path: Predicate,
}

impl SearchTerm {
    /// True for the request of the volume's own `$MFT`
    pub fn is_mft(&self) -> bool {
        self.file_name.is_literal(MFT_FILE_NAME)
    }
}

/// A request that was dropped before the search began
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRequest {
    pub request_index: usize,
    pub full_path: String,
    pub reason: String,
}

/// Everything the walk needs from the request list
#[derive(Debug, Clone, Default)]
pub struct SearchPlan {
    pub terms: Vec<SearchTerm>,
    /// Distinct volumes, in first-seen order
    pub volumes: Vec<char>,
    pub skipped: Vec<SkippedRequest>,
}

impl SearchPlan {
    /// Terms bound to one volume
    pub fn terms_for(&self, volume: char) -> Vec<SearchTerm> {
        self.terms
            .iter()
            .filter(|term| term.volume == volume)
            .cloned()
            .collect()
    }
}

/// Expand and compile every request.
///
/// Requests whose expansion or pattern compilation fails are skipped and
/// listed in the plan. A full path without a single-letter volume prefix
/// fails the whole plan.
pub fn build_search_terms(requests: &[ExportRequest], log: &LogContext) -> Result<SearchPlan> {
    let mut plan = SearchPlan::default();
    let mut expanded = Vec::with_capacity(requests.len());

    for (index, request) in requests.iter().enumerate() {
        match expand_environment(request) {
            Ok(request) => expanded.push((index, request)),
            Err(e) => {
                log.warn("SEARCH", &format!("Skipping request #{}: {}", index, e));
                plan.skipped.push(SkippedRequest {
                    request_index: index,
                    full_path: request.full_path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let expanded_requests: Vec<ExportRequest> =
        expanded.iter().map(|(_, request)| request.clone()).collect();
    plan.volumes = identify_volumes_of_interest(&expanded_requests)?;

    for (index, request) in expanded {
        match compile_term(index, &request) {
            Ok(term) => plan.terms.push(term),
            Err(e) => {
                log.warn("SEARCH", &format!("Skipping request #{}: {}", index, e));
                plan.skipped.push(SkippedRequest {
                    request_index: index,
                    full_path: request.full_path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    // A volume whose only requests failed to compile has nothing left to find
    let terms = &plan.terms;
    plan.volumes
        .retain(|letter| terms.iter().any(|term| term.volume == *letter));

    log.debug(
        "SEARCH",
        &format!(
            "{} search terms over volumes {:?}, {} requests skipped",
            plan.terms.len(),
            plan.volumes,
            plan.skipped.len()
        ),
    );
    Ok(plan)
}

fn compile_term(request_index: usize, request: &ExportRequest) -> Result<SearchTerm> {
    let volume = volume_letter_of(&request.full_path)?;
    let file_name = if request.is_file_name_regex {
        Predicate::pattern(&request.file_name)?
    } else {
        Predicate::literal(&request.file_name)
    };
    let full_path = if request.is_full_path_regex {
        Predicate::pattern(&request.full_path)?
    } else {
        Predicate::literal(&request.full_path)
    };

    Ok(SearchTerm {
        volume,
        request_index,
        full_path_text: request.full_path.clone(),
        file_name,
        full_path,
    })
}

/// Split the `$MFT` terms from the rest
pub fn partition_mft_terms(terms: &[SearchTerm]) -> (Vec<SearchTerm>, Vec<SearchTerm>) {
    terms.iter().cloned().partition(SearchTerm::is_mft)
}

// ============================================================================
// Candidates and confirmation
// ============================================================================

/// A record whose leaf name satisfied some term's name predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMatch {
    pub record_number: u64,
    pub sequence_number: u16,
    pub parent_record_number: u64,
    pub file_name: String,
    /// Index into the term slice the walk was given
    pub term_index: usize,
}

/// A candidate whose reconstructed full path satisfied its term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedMatch {
    pub volume: char,
    pub full_path: String,
    pub record_number: u64,
    pub sequence_number: u16,
    pub request_index: usize,
}

/// Outcome of [`confirm`]
#[derive(Debug, Clone, Default)]
pub struct Confirmation {
    pub confirmed: Vec<ConfirmedMatch>,
    /// Request indexes that matched nothing on this volume
    pub unmatched: Vec<usize>,
}

/// Re-apply every candidate's full-path predicate to its reconstructed path.
///
/// Hits are unique by full path (case-insensitive); the first candidate to
/// claim a path wins.
pub fn confirm(
    terms: &[SearchTerm],
    candidates: &[CandidateMatch],
    tree: &DirectoryTree,
) -> Confirmation {
    let mut confirmation = Confirmation::default();
    let mut seen_paths: HashSet<String> = HashSet::new();
    let mut satisfied: HashSet<usize> = HashSet::new();

    for candidate in candidates {
        let Some(term) = terms.get(candidate.term_index) else {
            continue;
        };
        let Some(full_path) = tree.full_path(candidate.parent_record_number, &candidate.file_name)
        else {
            continue;
        };
        if !term.full_path.matches(&full_path) {
            continue;
        }

        satisfied.insert(term.request_index);
        if seen_paths.insert(full_path.to_lowercase()) {
            confirmation.confirmed.push(ConfirmedMatch {
                volume: tree.volume(),
                full_path,
                record_number: candidate.record_number,
                sequence_number: candidate.sequence_number,
                request_index: term.request_index,
            });
        }
    }

    let mut unmatched: Vec<usize> = terms
        .iter()
        .map(|term| term.request_index)
        .filter(|index| !satisfied.contains(index))
        .collect();
    unmatched.dedup();
    confirmation.unmatched = unmatched;
    confirmation
}

// ============================================================================
// Resolution
// ============================================================================

/// A confirmed file together with its content description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedFile {
    pub volume: char,
    pub full_path: String,
    pub record_number: u64,
    pub data: DataAttribute,
}

impl ConfirmedFile {
    /// Sink entry name: the full path without `:` and with `/` separators
    pub fn entry_name(&self) -> String {
        entry_name_for(&self.full_path)
    }
}

// Entry names come in two shapes. A collected file keeps its directory
// structure (`C:\Windows\x` becomes `C/Windows/x`). A volume's exported MFT
// sits flat at the archive root as `C__$mft`; file entries always carry a
// `/` after the volume letter, so the two never collide.

/// Sink entry name for a collected file's full path
pub fn entry_name_for(full_path: &str) -> String {
    full_path.replace(':', "").replace('\\', "/")
}

/// Sink entry name of a volume's exported MFT
pub fn mft_entry_name(volume: char) -> String {
    format!("{}__$mft", volume.to_ascii_uppercase())
}

/// Re-read a confirmed record through the MFT run list and take its `$DATA`.
///
/// The record must still be in use and carry the sequence number seen during
/// the walk, otherwise the file changed underneath us.
pub fn resolve<D>(
    volume: &VolumeHandle<D>,
    mft_runs: &[DataRun],
    hit: &ConfirmedMatch,
    chunk_size: usize,
) -> Result<ConfirmedFile>
where
    D: Read + Seek + Send + 'static,
{
    let record_size = volume.geometry().mft_record_size;
    let resolve_error = |reason: String| CollectorError::ResolveError(hit.full_path.clone(), reason);

    let mut reader = ExtentReader::new(volume, mft_runs.to_vec(), chunk_size)
        .with_start_offset(hit.record_number.saturating_mul(record_size))
        .with_length_limit(record_size);

    let mut buffer = vec![0u8; record_size as usize];
    reader
        .read_exact(&mut buffer)
        .map_err(|e| resolve_error(format!("record {} unreadable: {}", hit.record_number, e)))?;

    let record = parse_record(hit.record_number, &mut buffer)
        .map_err(|e| resolve_error(e.to_string()))?;

    if !record.in_use {
        return Err(resolve_error(format!(
            "record {} is no longer in use",
            hit.record_number
        )));
    }
    if record.sequence_number != hit.sequence_number {
        return Err(resolve_error(format!(
            "record {} was reused (sequence {} during the walk, {} now)",
            hit.record_number, hit.sequence_number, record.sequence_number
        )));
    }

    let data = record
        .data
        .ok_or_else(|| resolve_error(format!("record {} has no unnamed $DATA", hit.record_number)))?;

    Ok(ConfirmedFile {
        volume: hit.volume,
        full_path: hit.full_path.clone(),
        record_number: hit.record_number,
        data,
    })
}
