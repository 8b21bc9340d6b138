//! Shared helpers for integration tests: a synthetic NTFS image builder,
//! in-memory volume and file openers, and a sink that keeps entries in memory.

#![allow(dead_code)]

use ntfs_collector::{CollectorError, FileOpener, ResultSink, VolumeOpener};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

pub const CLUSTER_SIZE: u64 = 4096;
pub const RECORD_SIZE: usize = 1024;
pub const MFT_LCN: u64 = 100;
pub const ROOT: u64 = 5;

const FIRST_DATA_CLUSTER: u64 = 1000;
const FIRST_USER_RECORD: u64 = 6;
const SEQUENCE_NUMBER: u16 = 7;

const IN_USE: u16 = 0x0001;
const DIRECTORY: u16 = 0x0002;

const NAMESPACE_POSIX: u8 = 0;
const NAMESPACE_WIN32: u8 = 1;
const NAMESPACE_DOS: u8 = 2;
const NAMESPACE_WIN32_AND_DOS: u8 = 3;

/// Builds raw NTFS images with 4 KiB clusters and 1 KiB MFT records
pub struct ImageBuilder {
    mft_runs: Vec<(u64, u64)>,
    records: BTreeMap<u64, Vec<u8>>,
    data: Vec<(u64, Vec<u8>)>,
    next_record: u64,
    next_cluster: u64,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    /// Image whose MFT is one run of 4 clusters at cluster 100
    pub fn new() -> Self {
        Self::with_mft_runs(&[(4, MFT_LCN)])
    }

    /// Image whose MFT occupies `runs` (cluster count, starting cluster)
    pub fn with_mft_runs(runs: &[(u64, u64)]) -> Self {
        let mut builder = Self {
            mft_runs: runs.to_vec(),
            records: BTreeMap::new(),
            data: Vec::new(),
            next_record: FIRST_USER_RECORD,
            next_cluster: FIRST_DATA_CLUSTER,
        };

        let mft_bytes = builder.mft_bytes();
        let mapping_pairs = encode_runs(
            &runs
                .iter()
                .map(|&(count, lcn)| (count, Some(lcn)))
                .collect::<Vec<_>>(),
        );
        builder.records.insert(
            0,
            record(
                IN_USE,
                &[
                    file_name_attr(ROOT, "$MFT", NAMESPACE_WIN32_AND_DOS),
                    non_resident_data(&mapping_pairs, mft_bytes, mft_bytes),
                ],
            ),
        );
        builder.records.insert(
            ROOT,
            record(IN_USE | DIRECTORY, &[file_name_attr(ROOT, ".", NAMESPACE_WIN32_AND_DOS)]),
        );
        builder
    }

    /// Bytes covered by the MFT run list
    pub fn mft_bytes(&self) -> u64 {
        self.mft_runs.iter().map(|(count, _)| count * CLUSTER_SIZE).sum()
    }

    pub fn directory(&mut self, parent: u64, name: &str) -> u64 {
        let number = self.allocate_record();
        self.records.insert(
            number,
            record(IN_USE | DIRECTORY, &[file_name_attr(parent, name, NAMESPACE_WIN32_AND_DOS)]),
        );
        number
    }

    /// Create `a\b\c` below `parent`, returning the innermost directory
    pub fn directories(&mut self, parent: u64, path: &str) -> u64 {
        path.split('\\')
            .fold(parent, |parent, name| self.directory(parent, name))
    }

    /// Non-resident file stored contiguously
    pub fn file(&mut self, parent: u64, name: &str, content: &[u8]) -> u64 {
        let clusters = clusters_for(content.len());
        let lcn = self.place(content);
        self.non_resident_file(IN_USE, parent, name, &[(clusters, Some(lcn))], content.len())
    }

    /// Non-resident file stored in two fragments, the second one lower on disk
    pub fn fragmented_file(&mut self, parent: u64, name: &str, content: &[u8]) -> u64 {
        let split = (clusters_for(content.len()) / 2).max(1) as usize * CLUSTER_SIZE as usize;
        let split = split.min(content.len());
        let (head, tail) = content.split_at(split);

        let tail_lcn = self.place(tail);
        let head_lcn = self.place(head);
        let mut runs = vec![(clusters_for(head.len()), Some(head_lcn))];
        if !tail.is_empty() {
            runs.push((clusters_for(tail.len()), Some(tail_lcn)));
        }
        self.non_resident_file(IN_USE, parent, name, &runs, content.len())
    }

    /// Non-resident file with `hole_clusters` sparse clusters between `head`
    /// and `tail`; returns the record number and the file's logical content
    pub fn sparse_file(
        &mut self,
        parent: u64,
        name: &str,
        head: &[u8],
        hole_clusters: u64,
        tail: &[u8],
    ) -> (u64, Vec<u8>) {
        assert_eq!(head.len() as u64, CLUSTER_SIZE, "head must fill one cluster");
        let head_lcn = self.place(head);
        let tail_lcn = self.place(tail);
        let runs = [
            (1, Some(head_lcn)),
            (hole_clusters, None),
            (clusters_for(tail.len()), Some(tail_lcn)),
        ];

        let mut content = head.to_vec();
        content.resize(content.len() + (hole_clusters * CLUSTER_SIZE) as usize, 0);
        content.extend_from_slice(tail);

        let number = self.non_resident_file(IN_USE, parent, name, &runs, content.len());
        (number, content)
    }

    /// Non-resident file whose recorded size is past what its runs cover,
    /// as when the remaining runs sit in an extension record
    pub fn short_run_file(&mut self, parent: u64, name: &str, content: &[u8], data_size: usize) -> u64 {
        let clusters = clusters_for(content.len());
        let lcn = self.place(content);
        self.non_resident_file(IN_USE, parent, name, &[(clusters, Some(lcn))], data_size)
    }

    /// File whose content lives inside its MFT record
    pub fn resident_file(&mut self, parent: u64, name: &str, content: &[u8]) -> u64 {
        let number = self.allocate_record();
        self.records.insert(
            number,
            record(
                IN_USE,
                &[
                    file_name_attr(parent, name, NAMESPACE_WIN32_AND_DOS),
                    resident_data(content),
                ],
            ),
        );
        number
    }

    /// Non-resident file whose record is no longer in use
    pub fn deleted_file(&mut self, parent: u64, name: &str, content: &[u8]) -> u64 {
        let clusters = clusters_for(content.len());
        let lcn = self.place(content);
        self.non_resident_file(0, parent, name, &[(clusters, Some(lcn))], content.len())
    }

    /// File carrying a long name plus a DOS 8.3 alias
    pub fn file_with_alias(&mut self, parent: u64, name: &str, alias: &str, content: &[u8]) -> u64 {
        let clusters = clusters_for(content.len());
        let lcn = self.place(content);
        let number = self.allocate_record();
        let mapping_pairs = encode_runs(&[(clusters, Some(lcn))]);
        self.records.insert(
            number,
            record(
                IN_USE,
                &[
                    file_name_attr(parent, name, NAMESPACE_WIN32),
                    file_name_attr(parent, alias, NAMESPACE_DOS),
                    non_resident_data(
                        &mapping_pairs,
                        content.len() as u64,
                        clusters * CLUSTER_SIZE,
                    ),
                ],
            ),
        );
        number
    }

    /// Raw image bytes
    pub fn build(&self) -> Vec<u8> {
        let mft_end = self
            .mft_runs
            .iter()
            .map(|(count, lcn)| count + lcn)
            .max()
            .unwrap_or(0);
        let total_clusters = mft_end.max(self.next_cluster).max(1);
        let mut image = vec![0u8; (total_clusters * CLUSTER_SIZE) as usize];

        image[..512].copy_from_slice(&boot_sector(self.mft_runs[0].1, total_clusters));
        for (number, bytes) in &self.records {
            let offset = self.record_offset(*number);
            image[offset..offset + RECORD_SIZE].copy_from_slice(bytes);
        }
        for (lcn, bytes) in &self.data {
            let offset = (lcn * CLUSTER_SIZE) as usize;
            image[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        image
    }

    /// Write the image into `dir` and return its path
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }

    fn non_resident_file(
        &mut self,
        flags: u16,
        parent: u64,
        name: &str,
        runs: &[(u64, Option<u64>)],
        data_size: usize,
    ) -> u64 {
        let number = self.allocate_record();
        let allocated = runs.iter().map(|(count, _)| count * CLUSTER_SIZE).sum();
        let mapping_pairs = encode_runs(runs);
        self.records.insert(
            number,
            record(
                flags,
                &[
                    file_name_attr(parent, name, NAMESPACE_WIN32_AND_DOS),
                    non_resident_data(&mapping_pairs, data_size as u64, allocated),
                ],
            ),
        );
        number
    }

    fn allocate_record(&mut self) -> u64 {
        let number = self.next_record;
        assert!(
            (number + 1) * RECORD_SIZE as u64 <= self.mft_bytes(),
            "synthetic MFT is full"
        );
        self.next_record += 1;
        number
    }

    /// Store `content` at fresh clusters, leaving a one-cluster gap after it
    fn place(&mut self, content: &[u8]) -> u64 {
        let lcn = self.next_cluster;
        self.next_cluster += clusters_for(content.len()) + 1;
        self.data.push((lcn, content.to_vec()));
        lcn
    }

    fn record_offset(&self, number: u64) -> usize {
        let mut remaining = number * RECORD_SIZE as u64;
        for (count, lcn) in &self.mft_runs {
            let run_bytes = count * CLUSTER_SIZE;
            if remaining < run_bytes {
                return (lcn * CLUSTER_SIZE + remaining) as usize;
            }
            remaining -= run_bytes;
        }
        panic!("record {} lies past the MFT", number);
    }
}

fn clusters_for(len: usize) -> u64 {
    (len as u64).div_ceil(CLUSTER_SIZE).max(1)
}

fn boot_sector(mft_lcn: u64, total_clusters: u64) -> Vec<u8> {
    let mut data = vec![0u8; 512];
    data[0..3].copy_from_slice(&[0xEB, 0x52, 0x90]);
    data[0x03..0x0B].copy_from_slice(b"NTFS    ");
    data[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
    data[0x0D] = (CLUSTER_SIZE / 512) as u8;
    data[0x28..0x30].copy_from_slice(&(total_clusters * CLUSTER_SIZE / 512).to_le_bytes());
    data[0x30..0x38].copy_from_slice(&mft_lcn.to_le_bytes());
    data[0x40] = (-10i8) as u8;
    data[0x1FE] = 0x55;
    data[0x1FF] = 0xAA;
    data
}

/// One FILE record with fixups applied for both sectors
fn record(flags: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
    let mut data = vec![0u8; RECORD_SIZE];
    data[0..4].copy_from_slice(b"FILE");
    data[4..6].copy_from_slice(&0x30u16.to_le_bytes());
    data[6..8].copy_from_slice(&3u16.to_le_bytes());
    data[16..18].copy_from_slice(&SEQUENCE_NUMBER.to_le_bytes());
    data[18..20].copy_from_slice(&1u16.to_le_bytes());
    data[20..22].copy_from_slice(&0x38u16.to_le_bytes());
    data[22..24].copy_from_slice(&flags.to_le_bytes());
    data[28..32].copy_from_slice(&(RECORD_SIZE as u32).to_le_bytes());

    let mut offset = 0x38;
    for attribute in attributes {
        data[offset..offset + attribute.len()].copy_from_slice(attribute);
        offset += attribute.len();
    }
    data[offset..offset + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    data[24..28].copy_from_slice(&((offset + 8) as u32).to_le_bytes());

    data[0x30..0x32].copy_from_slice(&1u16.to_le_bytes());
    for sector in 1..=2 {
        let end = sector * 512 - 2;
        let saved = [data[end], data[end + 1]];
        data[0x30 + sector * 2..0x32 + sector * 2].copy_from_slice(&saved);
        data[end..end + 2].copy_from_slice(&1u16.to_le_bytes());
    }
    data
}

fn file_name_attr(parent: u64, name: &str, namespace: u8) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let value_length = 66 + units.len() * 2;
    let length = (24 + value_length).div_ceil(8) * 8;

    let mut attr = vec![0u8; length];
    attr[0..4].copy_from_slice(&0x30u32.to_le_bytes());
    attr[4..8].copy_from_slice(&(length as u32).to_le_bytes());
    attr[16..20].copy_from_slice(&(value_length as u32).to_le_bytes());
    attr[20..22].copy_from_slice(&24u16.to_le_bytes());

    let value = &mut attr[24..];
    // Parent reference: record number plus sequence number in the top 16 bits
    value[0..8].copy_from_slice(&(parent | (1u64 << 48)).to_le_bytes());
    value[64] = units.len() as u8;
    value[65] = namespace;
    for (i, unit) in units.iter().enumerate() {
        value[66 + i * 2..68 + i * 2].copy_from_slice(&unit.to_le_bytes());
    }
    attr
}

fn resident_data(content: &[u8]) -> Vec<u8> {
    let length = (24 + content.len()).div_ceil(8) * 8;
    let mut attr = vec![0u8; length];
    attr[0..4].copy_from_slice(&0x80u32.to_le_bytes());
    attr[4..8].copy_from_slice(&(length as u32).to_le_bytes());
    attr[16..20].copy_from_slice(&(content.len() as u32).to_le_bytes());
    attr[20..22].copy_from_slice(&24u16.to_le_bytes());
    attr[24..24 + content.len()].copy_from_slice(content);
    attr
}

fn non_resident_data(mapping_pairs: &[u8], data_size: u64, allocated_size: u64) -> Vec<u8> {
    let length = (64 + mapping_pairs.len()).div_ceil(8) * 8;
    let mut attr = vec![0u8; length];
    attr[0..4].copy_from_slice(&0x80u32.to_le_bytes());
    attr[4..8].copy_from_slice(&(length as u32).to_le_bytes());
    attr[8] = 1;
    attr[32..34].copy_from_slice(&64u16.to_le_bytes());
    attr[40..48].copy_from_slice(&allocated_size.to_le_bytes());
    attr[48..56].copy_from_slice(&data_size.to_le_bytes());
    attr[56..64].copy_from_slice(&data_size.to_le_bytes());
    attr[64..64 + mapping_pairs.len()].copy_from_slice(mapping_pairs);
    attr
}

/// Encode (cluster count, starting cluster or sparse) runs as mapping pairs
pub fn encode_runs(runs: &[(u64, Option<u64>)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut previous: i64 = 0;

    for &(count, lcn) in runs {
        let length = minimal_unsigned(count);
        match lcn {
            Some(lcn) => {
                let delta = minimal_signed(lcn as i64 - previous);
                out.push(((delta.len() as u8) << 4) | length.len() as u8);
                out.extend_from_slice(&length);
                out.extend_from_slice(&delta);
                previous = lcn as i64;
            }
            None => {
                out.push(length.len() as u8);
                out.extend_from_slice(&length);
            }
        }
    }
    out.push(0);
    out
}

fn minimal_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_le_bytes();
    let mut len = 8;
    while len > 1 && bytes[len - 1] == 0 {
        len -= 1;
    }
    bytes[..len].to_vec()
}

fn minimal_signed(value: i64) -> Vec<u8> {
    let bytes = value.to_le_bytes();
    let mut len = 8;
    while len > 1 {
        let top = bytes[len - 1];
        let next_sign = bytes[len - 2] & 0x80;
        if (top == 0x00 && next_sign == 0) || (top == 0xFF && next_sign != 0) {
            len -= 1;
        } else {
            break;
        }
    }
    bytes[..len].to_vec()
}

// ============================================================================
// Openers and sinks
// ============================================================================

/// Serves in-memory images by volume letter
#[derive(Default, Clone)]
pub struct MemoryVolumeOpener {
    images: HashMap<char, Vec<u8>>,
}

impl MemoryVolumeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, letter: char, image: Vec<u8>) -> Self {
        self.images.insert(letter.to_ascii_uppercase(), image);
        self
    }
}

impl VolumeOpener for MemoryVolumeOpener {
    type Device = Cursor<Vec<u8>>;

    fn open_device(&self, letter: char) -> std::io::Result<Cursor<Vec<u8>>> {
        self.images
            .get(&letter.to_ascii_uppercase())
            .cloned()
            .map(Cursor::new)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("volume {}: does not exist", letter),
                )
            })
    }
}

/// Stands in for the OS: serves files by full path (case-insensitive)
#[derive(Default, Clone)]
pub struct MapFileOpener {
    files: HashMap<String, Vec<u8>>,
}

impl MapFileOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, full_path: &str, content: &[u8]) -> Self {
        self.files.insert(full_path.to_lowercase(), content.to_vec());
        self
    }
}

impl FileOpener for MapFileOpener {
    fn open(&self, full_path: &str) -> std::io::Result<Box<dyn Read + Send>> {
        match self.files.get(&full_path.to_lowercase()) {
            Some(content) => Ok(Box::new(Cursor::new(content.clone()))),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "The process cannot access the file because it is being used by another process",
            )),
        }
    }
}

/// Keeps every entry in memory, in write order
#[derive(Default)]
pub struct MemorySink {
    pub entries: Vec<(String, Vec<u8>)>,
    pub finished: bool,
}

impl MemorySink {
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn content(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, content)| content.as_slice())
    }
}

impl ResultSink for MemorySink {
    fn write_entry(&mut self, name: &str, reader: &mut dyn Read) -> ntfs_collector::Result<u64> {
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(|e| CollectorError::SinkError(name.to_string(), e.to_string()))?;
        let bytes = content.len() as u64;
        self.entries.push((name.to_string(), content));
        Ok(bytes)
    }

    fn finish(&mut self) -> ntfs_collector::Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Deterministic filler content
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
