//! Volume access
//!
//! Opens the raw device behind a volume letter, reads its boot record and
//! keeps the device open for the rest of that volume's acquisition. Every
//! reader that needs the device (the MFT walk, raw file streams) shares it
//! through a mutex and seeks explicitly before each read, since the device
//! has a single cursor.

use crate::error::{CollectorError, Result};
use crate::logging::LogContext;
use crate::ntfs::structs::BOOT_RECORD_SIZE;
use crate::ntfs::{parse_boot_record, VolumeGeometry};
use crate::search::ExportRequest;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

/// A volume device shared between the walker and raw file streams
pub type SharedDevice<D> = Arc<Mutex<D>>;

/// Capability to open the raw device behind a volume letter
pub trait VolumeOpener {
    type Device: Read + Seek + Send + 'static;

    fn open_device(&self, letter: char) -> std::io::Result<Self::Device>;
}

/// Opens `\\.\X:` device nodes on a live Windows system
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RawVolumeOpener;

#[cfg(windows)]
impl VolumeOpener for RawVolumeOpener {
    type Device = File;

    fn open_device(&self, letter: char) -> std::io::Result<File> {
        crate::ntfs::winapi::open_volume(letter)
    }
}

/// Serves volumes from raw NTFS image files, one image per letter
#[derive(Debug, Default, Clone)]
pub struct ImageVolumeOpener {
    images: BTreeMap<char, PathBuf>,
}

impl ImageVolumeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a volume letter to an image file
    pub fn with_image(mut self, letter: char, path: impl Into<PathBuf>) -> Self {
        self.images.insert(letter.to_ascii_uppercase(), path.into());
        self
    }

    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        self.images.keys().copied()
    }
}

impl VolumeOpener for ImageVolumeOpener {
    type Device = File;

    fn open_device(&self, letter: char) -> std::io::Result<File> {
        let path = self.images.get(&letter.to_ascii_uppercase()).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no image is mapped to volume {}:", letter),
            )
        })?;
        File::open(path)
    }
}

/// An open volume and its decoded geometry
pub struct VolumeHandle<D> {
    letter: char,
    geometry: VolumeGeometry,
    device: SharedDevice<D>,
}

impl<D: Read + Seek + Send + 'static> VolumeHandle<D> {
    /// Open the volume through `opener` and parse its boot record
    pub fn open<O>(opener: &O, letter: char, log: &LogContext) -> Result<Self>
    where
        O: VolumeOpener<Device = D>,
    {
        let letter = letter.to_ascii_uppercase();
        let device = opener
            .open_device(letter)
            .map_err(|e| CollectorError::VolumeOpenError(letter, e))?;
        Self::from_device(letter, device, log)
    }

    /// Wrap an already open device and parse its boot record
    pub fn from_device(letter: char, mut device: D, log: &LogContext) -> Result<Self> {
        let mut boot_record = vec![0u8; BOOT_RECORD_SIZE];
        device
            .seek(SeekFrom::Start(0))
            .and_then(|_| device.read_exact(&mut boot_record))
            .map_err(|e| CollectorError::BootRecordReadError(letter, e))?;

        let geometry = parse_boot_record(&boot_record)
            .map_err(|reason| CollectorError::NotNtfsVolume(letter, reason))?;

        log.debug(
            "VOLUME",
            &format!(
                "Opened volume {}: bytes_per_sector={}, sectors_per_cluster={}, cluster_size={}, \
                 mft_offset={}, mft_record_size={}",
                letter,
                geometry.bytes_per_sector,
                geometry.sectors_per_cluster,
                geometry.cluster_size,
                geometry.mft_byte_offset,
                geometry.mft_record_size,
            ),
        );

        Ok(Self {
            letter,
            geometry,
            device: Arc::new(Mutex::new(device)),
        })
    }

    /// Read exactly `buffer.len()` bytes at an absolute device offset
    pub fn read_at(&self, offset: u64, buffer: &mut [u8]) -> std::io::Result<()> {
        let mut device = self.device.lock();
        device.seek(SeekFrom::Start(offset))?;
        device.read_exact(buffer)
    }

    /// Move the device cursor to an absolute offset
    pub fn seek_to(&self, offset: u64) -> std::io::Result<()> {
        self.device.lock().seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

impl<D> VolumeHandle<D> {
    pub fn letter(&self) -> char {
        self.letter
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn cluster_size(&self) -> u64 {
        self.geometry.cluster_size
    }

    /// Shared device, for readers that outlive the current call
    pub fn device(&self) -> SharedDevice<D> {
        Arc::clone(&self.device)
    }
}

/// Find every distinct volume the requests point at.
///
/// The volume is whatever precedes the first `:` of the full path and must
/// be a single letter. Letters are compared case-insensitively and returned
/// uppercased in first-seen order.
pub fn identify_volumes_of_interest(requests: &[ExportRequest]) -> Result<Vec<char>> {
    let mut volumes: Vec<char> = Vec::new();

    for request in requests {
        let letter = volume_letter_of(&request.full_path)?;
        if !volumes.contains(&letter) {
            volumes.push(letter);
        }
    }

    Ok(volumes)
}

/// Volume letter a full path starts with
pub fn volume_letter_of(full_path: &str) -> Result<char> {
    let prefix = full_path.split(':').next().unwrap_or_default();
    let mut chars = prefix.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() && full_path.contains(':') => {
            Ok(letter.to_ascii_uppercase())
        }
        (None, _) => Err(CollectorError::InvalidPath(format!(
            "'{}' does not start with a volume letter",
            full_path
        ))),
        _ => Err(CollectorError::InvalidPath(format!(
            "'{}' starts with '{}', expected a single volume letter",
            full_path, prefix
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn request(path: &str) -> ExportRequest {
        ExportRequest::literal(path, "x")
    }

    #[test]
    fn test_identify_volumes_dedupes_case_insensitively() {
        let requests = vec![
            request(r"C:\$MFT"),
            request(r"c:\Windows\System32\config\SYSTEM"),
            request(r"D:\data\file.txt"),
            request(r"d:\other.txt"),
        ];
        let volumes = identify_volumes_of_interest(&requests).unwrap();
        assert_eq!(volumes, vec!['C', 'D']);
    }

    #[test]
    fn test_identify_volumes_rejects_multi_letter_prefix() {
        let requests = vec![request(r"CD:\file")];
        assert!(matches!(
            identify_volumes_of_interest(&requests),
            Err(CollectorError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_identify_volumes_rejects_missing_prefix() {
        assert!(identify_volumes_of_interest(&[request(r"\Windows\file")]).is_err());
        assert!(identify_volumes_of_interest(&[request(r":\file")]).is_err());
        assert!(identify_volumes_of_interest(&[request(r"1:\file")]).is_err());
    }

    #[test]
    fn test_image_opener_reports_unmapped_letter() {
        let opener = ImageVolumeOpener::new();
        let err = VolumeHandle::open(&opener, 'z', &LogContext::silent())
            .err()
            .unwrap();
        match err {
            CollectorError::VolumeOpenError(letter, _) => assert_eq!(letter, 'Z'),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_device_rejects_blank_volume() {
        let device = Cursor::new(vec![0u8; 4096]);
        let err = VolumeHandle::from_device('C', device, &LogContext::silent())
            .err()
            .unwrap();
        assert!(matches!(err, CollectorError::NotNtfsVolume('C', _)));
    }

    #[test]
    fn test_from_device_reports_short_device() {
        let device = Cursor::new(vec![0u8; 100]);
        let err = VolumeHandle::from_device('C', device, &LogContext::silent())
            .err()
            .unwrap();
        assert!(matches!(err, CollectorError::BootRecordReadError('C', _)));
    }
}
