//! MFT walker
//!
//! Locates the MFT through record zero, streams the whole table once through
//! the tree builder and, when the volume's `$MFT` was requested, tees that
//! same stream into the export queue so the device is not read twice.

use crate::config::CollectConfig;
use crate::error::{CollectorError, Result};
use crate::extents::ExtentReader;
use crate::logging::LogContext;
use crate::ntfs::structs::total_clusters;
use crate::ntfs::{parse_record, DataAttribute, DataRun};
use crate::pipeline::{StreamQueue, StreamedFile};
use crate::search::{mft_entry_name, partition_mft_terms, CandidateMatch, SearchTerm};
use crate::tee::tee;
use crate::tree::{build_tree, DirectoryTree, TreeStats};
use crate::volume::VolumeHandle;
use humansize::{format_size, BINARY};
use std::io::{Read, Seek};

/// Result of walking one volume's MFT
#[derive(Debug)]
pub struct MftWalk {
    /// Run list of the MFT itself
    pub mft_runs: Vec<DataRun>,
    pub tree: DirectoryTree,
    pub candidates: Vec<CandidateMatch>,
    /// Terms the candidates index into (the `$MFT` terms removed)
    pub terms: Vec<SearchTerm>,
    /// Requests served by the `$MFT` export
    pub mft_requests: Vec<usize>,
    pub stats: TreeStats,
}

/// Read and parse MFT record zero, returning the MFT's own run list
pub fn read_mft_runs<D>(volume: &VolumeHandle<D>, log: &LogContext) -> Result<Vec<DataRun>>
where
    D: Read + Seek + Send + 'static,
{
    let letter = volume.letter();
    let geometry = volume.geometry();
    let zero_error = |e: CollectorError| CollectorError::MftRecordZeroError(letter, Box::new(e));

    let mut buffer = vec![0u8; geometry.mft_record_size as usize];
    volume
        .read_at(geometry.mft_byte_offset, &mut buffer)
        .map_err(|e| zero_error(e.into()))?;

    let record = parse_record(0, &mut buffer).map_err(zero_error)?;
    let runs = match record.data {
        Some(DataAttribute::NonResident { runs, .. }) if !runs.is_empty() => runs,
        _ => {
            return Err(zero_error(CollectorError::InvalidMftRecord(
                0,
                "$MFT carries no non-resident $DATA".to_string(),
            )))
        }
    };

    log.debug(
        "MFT",
        &format!(
            "Parsed MFT record 0: {} clusters in {} runs {:?}",
            total_clusters(&runs),
            runs.len(),
            runs
        ),
    );
    Ok(runs)
}

/// Walk the MFT of `volume`, matching leaf names against `terms`.
///
/// When a term asks for `$mft`, the MFT stream is tee'd and its copy is
/// enqueued on `queue` as `<LETTER>__$mft` before the walk starts; the copy
/// is complete and closed by the time this returns. Record zero failures
/// are reported as [`CollectorError::MftRecordZeroError`], anything later
/// as [`CollectorError::MftWalkError`].
pub fn walk_mft<D>(
    volume: &VolumeHandle<D>,
    terms: &[SearchTerm],
    queue: &StreamQueue,
    config: &CollectConfig,
    log: &LogContext,
) -> Result<MftWalk>
where
    D: Read + Seek + Send + 'static,
{
    let letter = volume.letter();
    let geometry = *volume.geometry();
    let walk_error = |e: CollectorError| CollectorError::MftWalkError(letter, Box::new(e));

    let mft_runs = read_mft_runs(volume, log)?;

    volume
        .seek_to(geometry.mft_byte_offset)
        .map_err(|e| walk_error(e.into()))?;
    log.debug(
        "MFT",
        &format!("Seeked back to the MFT at offset {}", geometry.mft_byte_offset),
    );

    let chunk_size = config.chunk_size_for(geometry.cluster_size);
    let stream = ExtentReader::new(volume, mft_runs.clone(), chunk_size);
    log.info(
        "MFT",
        &format!("Reading {} of MFT", format_size(stream.remaining(), BINARY)),
    );

    let (mft_terms, active_terms) = partition_mft_terms(terms);
    let mft_requests: Vec<usize> = mft_terms.iter().map(|term| term.request_index).collect();
    let record_size = geometry.mft_record_size;

    let (tree, candidates, stats) = if mft_terms.is_empty() {
        let mut stream = stream;
        build_tree(&mut stream, letter, record_size, &active_terms, log).map_err(walk_error)?
    } else {
        let (mut primary, branch) = tee(stream, config.tee_buffer_chunks);
        queue
            .send(StreamedFile::new(mft_entry_name(letter), Box::new(branch)))
            .map_err(|_| CollectorError::WorkerPanicked)?;
        log.debug("MFT", &format!("Queued {} for export", mft_entry_name(letter)));

        let built = build_tree(&mut primary, letter, record_size, &active_terms, log)
            .map_err(walk_error)?;

        let drained = primary.finish().map_err(|e| walk_error(e.into()))?;
        if drained > 0 {
            log.debug(
                "MFT",
                &format!("Drained {} unread MFT bytes into the export", drained),
            );
        }
        built
    };

    Ok(MftWalk {
        mft_runs,
        tree,
        candidates,
        terms: active_terms,
        mft_requests,
        stats,
    })
}
