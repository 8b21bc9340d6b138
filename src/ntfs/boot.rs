//! NTFS volume boot record
//!
//! Decodes the geometry the collector needs out of the first sector of a
//! volume: sector and cluster sizes, where the MFT starts, how big one MFT
//! record is.

use crate::ntfs::structs::BOOT_RECORD_SIZE;
use byteorder::{ByteOrder, LittleEndian};

/// Parsed NTFS boot sector (first 512 bytes of an NTFS partition)
#[derive(Debug, Clone)]
pub struct NtfsBootSector {
    /// OEM ID - must be "NTFS    " (8 bytes at offset 0x03)
    pub oem_id: [u8; 8],
    /// Bytes per sector (offset 0x0B, typically 512)
    pub bytes_per_sector: u16,
    /// Sectors per cluster (offset 0x0D, typically 8 -> 4096 byte clusters)
    pub sectors_per_cluster: u8,
    /// Total sectors on volume (offset 0x28)
    pub total_sectors: u64,
    /// MFT starting cluster number / LCN (offset 0x30)
    pub mft_cluster_number: u64,
    /// Clusters per MFT record (offset 0x40, signed)
    /// If negative, record size = 2^|value| bytes
    /// If positive, record size = value * bytes_per_cluster
    pub clusters_per_mft_record: i8,
    /// Boot signature (offset 0x1FE, 0xAA55)
    pub end_marker: u16,
}

impl NtfsBootSector {
    /// Parse from raw 512-byte boot sector data
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < BOOT_RECORD_SIZE {
            return None;
        }

        let mut oem_id = [0u8; 8];
        oem_id.copy_from_slice(&data[0x03..0x0B]);

        Some(Self {
            oem_id,
            bytes_per_sector: LittleEndian::read_u16(&data[0x0B..0x0D]),
            sectors_per_cluster: data[0x0D],
            total_sectors: LittleEndian::read_u64(&data[0x28..0x30]),
            mft_cluster_number: LittleEndian::read_u64(&data[0x30..0x38]),
            clusters_per_mft_record: data[0x40] as i8,
            end_marker: LittleEndian::read_u16(&data[0x1FE..0x200]),
        })
    }

    /// Why this sector cannot be used, or `None` if it is a sane NTFS boot sector
    pub fn validation_error(&self) -> Option<String> {
        if &self.oem_id != b"NTFS    " {
            return Some(format!(
                "OEM id is {:?}, expected \"NTFS    \"",
                String::from_utf8_lossy(&self.oem_id)
            ));
        }
        if self.end_marker != 0xAA55 {
            return Some(format!("boot signature is 0x{:04X}", self.end_marker));
        }
        if self.bytes_per_sector < 256 || !self.bytes_per_sector.is_power_of_two() {
            return Some(format!("bytes per sector is {}", self.bytes_per_sector));
        }
        if self.sectors_per_cluster == 0 || !self.sectors_per_cluster.is_power_of_two() {
            return Some(format!("sectors per cluster is {}", self.sectors_per_cluster));
        }
        let record_size = self.bytes_per_mft_record();
        if !(256..=65_536).contains(&record_size) {
            return Some(format!("MFT record size is {}", record_size));
        }
        None
    }

    /// Calculate bytes per cluster
    pub fn bytes_per_cluster(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// Calculate bytes per MFT record
    pub fn bytes_per_mft_record(&self) -> u64 {
        if self.clusters_per_mft_record < 0 {
            let shift = self.clusters_per_mft_record.unsigned_abs() as u32;
            1u64.checked_shl(shift).unwrap_or(0)
        } else {
            self.clusters_per_mft_record as u64 * self.bytes_per_cluster()
        }
    }
}

/// Geometry of an NTFS volume as needed for raw reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeGeometry {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub cluster_size: u64,
    pub mft_byte_offset: u64,
    pub mft_record_size: u64,
}

/// Parse the first sector of a volume into its geometry
pub fn parse_boot_record(data: &[u8]) -> std::result::Result<VolumeGeometry, String> {
    let boot_sector = NtfsBootSector::from_bytes(data)
        .ok_or_else(|| format!("boot record is {} bytes, expected {}", data.len(), BOOT_RECORD_SIZE))?;

    if let Some(reason) = boot_sector.validation_error() {
        return Err(reason);
    }

    let cluster_size = boot_sector.bytes_per_cluster();
    let mft_byte_offset = boot_sector
        .mft_cluster_number
        .checked_mul(cluster_size)
        .ok_or_else(|| format!("MFT cluster {} is out of range", boot_sector.mft_cluster_number))?;

    Ok(VolumeGeometry {
        bytes_per_sector: boot_sector.bytes_per_sector,
        sectors_per_cluster: boot_sector.sectors_per_cluster,
        cluster_size,
        mft_byte_offset,
        mft_record_size: boot_sector.bytes_per_mft_record(),
    })
}
