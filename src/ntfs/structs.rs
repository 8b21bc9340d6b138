//! NTFS on-disk structures and constants
//!
//! Only the fields the collector reads are decoded. Everything else in a
//! record or attribute header is skipped by offset.

use crate::error::{CollectorError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// "FILE" in little-endian
pub const MFT_RECORD_SIGNATURE: u32 = 0x454C4946;

pub const ATTRIBUTE_FILE_NAME: u32 = 0x30;
pub const ATTRIBUTE_DATA: u32 = 0x80;
pub const ATTRIBUTE_END_MARKER: u32 = 0xFFFFFFFF;

/// Update sequence stride; fixups always protect 512-byte blocks
pub const SECTOR_SIZE: u32 = 512;

/// Size of the volume boot record read at offset 0
pub const BOOT_RECORD_SIZE: usize = 512;

pub const ROOT_RECORD_NUMBER: u64 = 5;

/// Low 48 bits of a file reference
pub const RECORD_NUMBER_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

pub const MFT_RECORD_IN_USE: u16 = 0x0001;
pub const MFT_RECORD_IS_DIRECTORY: u16 = 0x0002;

fn u16_at(data: &[u8], offset: usize) -> u16 {
    LittleEndian::read_u16(&data[offset..offset + 2])
}

fn u32_at(data: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&data[offset..offset + 4])
}

fn u64_at(data: &[u8], offset: usize) -> u64 {
    LittleEndian::read_u64(&data[offset..offset + 8])
}

// ============================================================================
// Filename Namespace
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilenameNamespace {
    Posix = 0,
    Win32 = 1,
    Dos = 2,
    Win32AndDos = 3,
}

impl FilenameNamespace {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Posix,
            1 => Self::Win32,
            2 => Self::Dos,
            3 => Self::Win32AndDos,
            _ => return None,
        })
    }

    /// Paths are built from every name except the 8.3 alias
    pub fn is_long_name(&self) -> bool {
        *self != Self::Dos
    }

    /// Preference when a record carries several names (higher wins)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Win32 => 3,
            Self::Win32AndDos => 2,
            Self::Posix => 1,
            Self::Dos => 0,
        }
    }
}

// ============================================================================
// FILE Record Header
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MftRecordHeader {
    pub signature: u32,
    pub update_sequence_offset: u16,
    pub update_sequence_size: u16,
    pub sequence_number: u16,
    pub first_attribute_offset: u16,
    pub flags: u16,
    pub used_size: u32,
    pub base_record_reference: u64,
}

impl MftRecordHeader {
    pub const SIZE: usize = 48;

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let data = data.get(..Self::SIZE)?;
        Some(Self {
            signature: u32_at(data, 0),
            update_sequence_offset: u16_at(data, 4),
            update_sequence_size: u16_at(data, 6),
            sequence_number: u16_at(data, 16),
            first_attribute_offset: u16_at(data, 20),
            flags: u16_at(data, 22),
            used_size: u32_at(data, 24),
            base_record_reference: u64_at(data, 32),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.signature == MFT_RECORD_SIGNATURE
    }

    pub fn is_in_use(&self) -> bool {
        self.flags & MFT_RECORD_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & MFT_RECORD_IS_DIRECTORY != 0
    }

    /// Extension records point back at their base record
    pub fn is_base_record(&self) -> bool {
        self.base_record_reference & RECORD_NUMBER_MASK == 0
    }
}

// ============================================================================
// Attribute Headers
// ============================================================================

/// Common 16-byte prefix of every attribute
#[derive(Debug, Clone, Default)]
pub struct AttributeHeader {
    pub attribute_type: u32,
    pub length: u32,
    pub non_resident: bool,
    pub name_length: u8,
    pub name_offset: u16,
}

#[derive(Debug, Clone)]
pub struct ResidentAttributeHeader {
    pub base: AttributeHeader,
    pub value_length: u32,
    pub value_offset: u16,
}

#[derive(Debug, Clone)]
pub struct NonResidentAttributeHeader {
    pub base: AttributeHeader,
    pub lowest_vcn: u64,
    pub data_runs_offset: u16,
    pub allocated_size: u64,
    pub data_size: u64,
}

impl AttributeHeader {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let data = data.get(..16)?;
        Some(Self {
            attribute_type: u32_at(data, 0),
            length: u32_at(data, 4),
            non_resident: data[8] != 0,
            name_length: data[9],
            name_offset: u16_at(data, 10),
        })
    }

    /// Stream name, `None` for the unnamed stream
    pub fn name(&self, attr_data: &[u8]) -> Option<String> {
        if self.name_length == 0 {
            return None;
        }
        let start = self.name_offset as usize;
        let end = start + self.name_length as usize * 2;
        attr_data.get(start..end).map(decode_utf16le)
    }
}

impl ResidentAttributeHeader {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let base = AttributeHeader::from_bytes(data)?;
        if base.non_resident || data.len() < 24 {
            return None;
        }
        Some(Self {
            base,
            value_length: u32_at(data, 16),
            value_offset: u16_at(data, 20),
        })
    }

    pub fn value<'a>(&self, attr_data: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.value_offset as usize;
        attr_data.get(start..start + self.value_length as usize)
    }
}

impl NonResidentAttributeHeader {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let base = AttributeHeader::from_bytes(data)?;
        if !base.non_resident || data.len() < 64 {
            return None;
        }
        // highest VCN, compression unit and initialized size are not needed
        Some(Self {
            base,
            lowest_vcn: u64_at(data, 16),
            data_runs_offset: u16_at(data, 32),
            allocated_size: u64_at(data, 40),
            data_size: u64_at(data, 48),
        })
    }
}

// ============================================================================
// $FILE_NAME
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileNameAttribute {
    pub parent_reference: u64,
    pub data_size: u64,
    pub namespace: FilenameNamespace,
    pub name: String,
}

impl FileNameAttribute {
    const NAME_OFFSET: usize = 66;

    /// Parse the resident value of a `$FILE_NAME` attribute
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::NAME_OFFSET {
            return None;
        }
        let name_end = Self::NAME_OFFSET + data[64] as usize * 2;
        Some(Self {
            parent_reference: u64_at(data, 0),
            data_size: u64_at(data, 48),
            namespace: FilenameNamespace::from_u8(data[65])?,
            name: decode_utf16le(data.get(Self::NAME_OFFSET..name_end)?),
        })
    }

    pub fn parent_record_number(&self) -> u64 {
        self.parent_reference & RECORD_NUMBER_MASK
    }
}

fn decode_utf16le(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

// ============================================================================
// Data Runs
// ============================================================================

/// One extent of a non-resident attribute.
/// `lcn` is the absolute starting cluster, `None` for a sparse run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRun {
    pub cluster_count: u64,
    pub lcn: Option<u64>,
}

impl DataRun {
    pub fn new(cluster_count: u64, lcn: u64) -> Self {
        Self {
            cluster_count,
            lcn: Some(lcn),
        }
    }

    pub fn sparse(cluster_count: u64) -> Self {
        Self {
            cluster_count,
            lcn: None,
        }
    }

    pub fn is_sparse(&self) -> bool {
        self.lcn.is_none()
    }

    /// Decode a mapping-pairs array into absolute runs.
    ///
    /// Each run header byte holds the size of the length field in its low
    /// nibble and the size of the signed LCN delta in its high nibble. A zero
    /// delta size marks a sparse run. Decoding stops at a zero header byte.
    pub fn decode_runs(data: &[u8]) -> Result<Vec<DataRun>> {
        let mut runs = Vec::new();
        let mut pos = 0;
        let mut current_lcn: i64 = 0;

        while pos < data.len() {
            let header = data[pos];
            if header == 0 {
                break; // End marker
            }

            let length_bytes = (header & 0x0F) as usize;
            let offset_bytes = ((header >> 4) & 0x0F) as usize;

            if length_bytes == 0 || length_bytes > 8 || offset_bytes > 8 {
                return Err(CollectorError::DataRunError(format!(
                    "invalid run header 0x{:02X} at byte {}",
                    header, pos
                )));
            }

            pos += 1;

            if pos + length_bytes + offset_bytes > data.len() {
                return Err(CollectorError::DataRunError(format!(
                    "run at byte {} overruns the mapping pairs",
                    pos - 1
                )));
            }

            let mut cluster_count = 0u64;
            for i in 0..length_bytes {
                cluster_count |= (data[pos + i] as u64) << (i * 8);
            }
            pos += length_bytes;

            if offset_bytes == 0 {
                runs.push(DataRun::sparse(cluster_count));
                continue;
            }

            let mut lcn_delta = 0i64;
            for i in 0..offset_bytes {
                lcn_delta |= (data[pos + i] as i64) << (i * 8);
            }

            // Sign extend if high bit is set
            if offset_bytes < 8 && (data[pos + offset_bytes - 1] & 0x80) != 0 {
                for i in offset_bytes..8 {
                    lcn_delta |= 0xFFi64 << (i * 8);
                }
            }
            pos += offset_bytes;

            current_lcn += lcn_delta;
            if current_lcn < 0 {
                return Err(CollectorError::DataRunError(format!(
                    "run {} starts at negative cluster {}",
                    runs.len(),
                    current_lcn
                )));
            }

            runs.push(DataRun::new(cluster_count, current_lcn as u64));
        }

        Ok(runs)
    }
}

/// Total clusters covered by a run list
pub fn total_clusters(runs: &[DataRun]) -> u64 {
    runs.iter().map(|run| run.cluster_count).sum()
}
