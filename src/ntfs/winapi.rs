//! Windows API bindings for raw volume and shared file access
//!
//! Thin wrappers around `CreateFileW` that hand back owned `std::fs::File`s,
//! so the rest of the crate only ever sees `Read + Seek`.

use std::ffi::OsStr;
use std::fs::File;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{FromRawHandle, RawHandle};

// File attributes for CreateFile
pub const GENERIC_READ: u32 = 0x80000000;
pub const FILE_SHARE_READ: u32 = 0x00000001;
pub const FILE_SHARE_WRITE: u32 = 0x00000002;
pub const FILE_SHARE_DELETE: u32 = 0x00000004;
pub const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x02000000;

/// Device path of a volume letter, e.g. `\\.\C:`
pub fn volume_device_path(drive_letter: char) -> String {
    format!("\\\\.\\{}:", drive_letter)
}

/// Open a volume for raw read access.
///
/// Other processes keep read and write access to the volume, which is what
/// lets the collector read files they hold exclusively open.
pub fn open_volume(drive_letter: char) -> std::io::Result<File> {
    create_file(
        &volume_device_path(drive_letter),
        FILE_SHARE_READ | FILE_SHARE_WRITE,
        0,
    )
}

/// Open a file by path with read access, sharing read, write and delete
pub fn open_file_shared(path: &str) -> std::io::Result<File> {
    create_file(
        path,
        FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
        FILE_FLAG_BACKUP_SEMANTICS,
    )
}

fn create_file(path: &str, share_mode: u32, flags: u32) -> std::io::Result<File> {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_MODE, OPEN_EXISTING,
    };

    let wide_path: Vec<u16> = OsStr::new(path)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let handle = unsafe {
        CreateFileW(
            PCWSTR::from_raw(wide_path.as_ptr()),
            GENERIC_READ,
            FILE_SHARE_MODE(share_mode),
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(flags),
            HANDLE::default(),
        )
    };

    match handle {
        Ok(h) if !h.is_invalid() => {
            // The File takes ownership and closes the handle on drop
            Ok(unsafe { File::from_raw_handle(h.0 as RawHandle) })
        }
        Ok(_) => Err(std::io::Error::last_os_error()),
        // HRESULT_FROM_WIN32 keeps the Win32 code in the low word
        Err(e) => Err(std::io::Error::from_raw_os_error(e.code().0 & 0xFFFF)),
    }
}
