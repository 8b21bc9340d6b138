//! MFT record parser
//!
//! Turns one raw FILE record into the pieces the collector cares about:
//! its flags, every `$FILE_NAME` it carries and its unnamed `$DATA`
//! attribute, either resident bytes or a decoded run list.

use crate::error::{CollectorError, Result};
use crate::ntfs::structs::*;

/// Content of the unnamed `$DATA` stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataAttribute {
    /// Data stored inside the MFT record itself
    Resident(Vec<u8>),
    /// Data stored in clusters described by a run list
    NonResident {
        runs: Vec<DataRun>,
        data_size: u64,
        allocated_size: u64,
    },
}

impl DataAttribute {
    /// Logical size of the stream in bytes
    pub fn data_size(&self) -> u64 {
        match self {
            DataAttribute::Resident(bytes) => bytes.len() as u64,
            DataAttribute::NonResident { data_size, .. } => *data_size,
        }
    }

    /// Run list of a non-resident stream
    pub fn runs(&self) -> Option<&[DataRun]> {
        match self {
            DataAttribute::Resident(_) => None,
            DataAttribute::NonResident { runs, .. } => Some(runs),
        }
    }
}

/// Parsed view of one MFT record
#[derive(Debug, Clone)]
pub struct MftRecord {
    pub record_number: u64,
    pub sequence_number: u16,
    pub in_use: bool,
    pub is_directory: bool,
    pub is_base_record: bool,
    pub file_names: Vec<FileNameAttribute>,
    pub data: Option<DataAttribute>,
}

impl MftRecord {
    /// Best display name (Win32 > Win32+DOS > POSIX > DOS)
    pub fn best_name(&self) -> Option<&FileNameAttribute> {
        self.file_names
            .iter()
            .max_by_key(|file_name| file_name.namespace.rank())
    }

    /// Every name a path can be built from (DOS 8.3 aliases excluded)
    pub fn long_names(&self) -> impl Iterator<Item = &FileNameAttribute> {
        self.file_names
            .iter()
            .filter(|file_name| file_name.namespace.is_long_name())
    }
}

/// Parse a raw MFT record buffer. Fixups are applied in place.
pub fn parse_record(record_number: u64, data: &mut [u8]) -> Result<MftRecord> {
    let header = MftRecordHeader::from_bytes(data).ok_or_else(|| {
        CollectorError::InvalidMftRecord(record_number, "Failed to parse header".to_string())
    })?;

    if !header.is_valid() {
        return Err(CollectorError::InvalidMftRecord(
            record_number,
            format!("Invalid signature 0x{:08X}", header.signature),
        ));
    }

    // Apply fixup array (critical for data integrity!)
    apply_fixup(record_number, data, &header)?;

    let mut record = MftRecord {
        record_number,
        sequence_number: header.sequence_number,
        in_use: header.is_in_use(),
        is_directory: header.is_directory(),
        is_base_record: header.is_base_record(),
        file_names: Vec::new(),
        data: None,
    };

    parse_attributes(data, &header, &mut record)?;

    Ok(record)
}

/// Apply fixup array to repair sector boundaries
///
/// NTFS stores the last 2 bytes of each sector in the fixup array
/// and replaces them with a sequence number for integrity verification.
pub fn apply_fixup(record_number: u64, data: &mut [u8], header: &MftRecordHeader) -> Result<()> {
    let sector_size = SECTOR_SIZE as usize;
    let update_seq_offset = header.update_sequence_offset as usize;
    let update_seq_count = header.update_sequence_size as usize;

    // The array holds the check value plus one entry per protected sector
    if update_seq_count == 0
        || update_seq_offset + update_seq_count * 2 > data.len()
        || (update_seq_count - 1) * sector_size > data.len()
    {
        return Err(CollectorError::FixupVerificationFailed(record_number));
    }

    // Read sequence number (first value in update sequence array)
    let seq_number = u16::from_le_bytes([data[update_seq_offset], data[update_seq_offset + 1]]);

    // Verify and restore each sector
    for i in 1..update_seq_count {
        let sector_end = i * sector_size - 2;
        let fixup_offset = update_seq_offset + i * 2;

        let stored_seq = u16::from_le_bytes([data[sector_end], data[sector_end + 1]]);
        if stored_seq != seq_number {
            return Err(CollectorError::FixupVerificationFailed(record_number));
        }

        // Restore original bytes from fixup array
        data[sector_end] = data[fixup_offset];
        data[sector_end + 1] = data[fixup_offset + 1];
    }

    Ok(())
}

fn parse_attributes(data: &[u8], header: &MftRecordHeader, record: &mut MftRecord) -> Result<()> {
    let used = (header.used_size as usize).min(data.len());
    let limit = if used >= 48 { used } else { data.len() };
    let mut offset = header.first_attribute_offset as usize;

    while offset + 16 <= limit {
        let attr_header = AttributeHeader::from_bytes(&data[offset..]).ok_or_else(|| {
            CollectorError::InvalidAttribute(offset as u32, "Failed to parse header".to_string())
        })?;

        // End of attributes
        if attr_header.attribute_type == ATTRIBUTE_END_MARKER {
            break;
        }

        let length = attr_header.length as usize;
        if length < 16 || offset + length > limit {
            return Err(CollectorError::InvalidAttribute(
                offset as u32,
                format!("length {} runs past the record", length),
            ));
        }

        let attr_data = &data[offset..offset + length];

        match attr_header.attribute_type {
            ATTRIBUTE_FILE_NAME => {
                if let Some(file_name) = parse_file_name(attr_data) {
                    record.file_names.push(file_name);
                }
            }
            ATTRIBUTE_DATA => {
                // Alternate data streams are not part of the file content
                if attr_header.name(attr_data).is_none() {
                    parse_data_attribute(offset, attr_data, &mut record.data)?;
                }
            }
            _ => {}
        }

        offset += length;
    }

    Ok(())
}

fn parse_file_name(attr_data: &[u8]) -> Option<FileNameAttribute> {
    let header = ResidentAttributeHeader::from_bytes(attr_data)?;
    FileNameAttribute::from_bytes(header.value(attr_data)?)
}

fn parse_data_attribute(
    offset: usize,
    attr_data: &[u8],
    slot: &mut Option<DataAttribute>,
) -> Result<()> {
    if let Some(nr_header) = NonResidentAttributeHeader::from_bytes(attr_data) {
        let runs_offset = nr_header.data_runs_offset as usize;
        let mapping_pairs = attr_data.get(runs_offset..).ok_or_else(|| {
            CollectorError::InvalidAttribute(offset as u32, "data runs offset out of range".to_string())
        })?;
        let mut runs = DataRun::decode_runs(mapping_pairs)?;

        match slot {
            // A later piece of the same stream, continue its run list
            Some(DataAttribute::NonResident { runs: existing, .. }) if nr_header.lowest_vcn > 0 => {
                existing.append(&mut runs);
            }
            _ => {
                *slot = Some(DataAttribute::NonResident {
                    runs,
                    data_size: nr_header.data_size,
                    allocated_size: nr_header.allocated_size,
                });
            }
        }
        return Ok(());
    }

    let r_header = ResidentAttributeHeader::from_bytes(attr_data).ok_or_else(|| {
        CollectorError::InvalidAttribute(offset as u32, "truncated $DATA header".to_string())
    })?;
    let value = r_header.value(attr_data).ok_or_else(|| {
        CollectorError::InvalidAttribute(offset as u32, "resident $DATA value out of range".to_string())
    })?;
    *slot = Some(DataAttribute::Resident(value.to_vec()));
    Ok(())
}
