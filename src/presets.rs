//! Built-in artifact groups and request lists
//!
//! Gather letters select groups of well-known artifacts:
//!
//! | letter | artifacts |
//! |--------|-----------|
//! | `a`    | everything below |
//! | `m`    | `$MFT` of the system drive |
//! | `r`    | SYSTEM and SOFTWARE hives |
//! | `u`    | every user's NTUSER.DAT and UsrClass.dat |
//! | `e`    | event logs |
//! | `w`    | every user's WebCache database |

use crate::error::Result;
use crate::search::ExportRequest;
use std::path::Path;

pub const GATHER_ALL: char = 'a';
pub const GATHER_MFT: char = 'm';
pub const GATHER_REGISTRY: char = 'r';
pub const GATHER_USER_HIVES: char = 'u';
pub const GATHER_EVENT_LOGS: char = 'e';
pub const GATHER_WEB_HISTORY: char = 'w';

pub fn mft() -> Vec<ExportRequest> {
    vec![ExportRequest::literal(r"%SYSTEMDRIVE%\$MFT", "$MFT")]
}

pub fn registry() -> Vec<ExportRequest> {
    vec![
        ExportRequest::literal(r"%SYSTEMDRIVE%\Windows\System32\config\SYSTEM", "SYSTEM"),
        ExportRequest::literal(r"%SYSTEMDRIVE%\Windows\System32\config\SOFTWARE", "SOFTWARE"),
    ]
}

pub fn user_hives() -> Vec<ExportRequest> {
    vec![
        ExportRequest::pattern(r"%SYSTEMDRIVE%\\Users\\[^\\]+\\ntuser\.dat", "ntuser.dat", false),
        ExportRequest::pattern(
            r"%SYSTEMDRIVE%\\Users\\[^\\]+\\AppData\\Local\\Microsoft\\Windows\\usrclass\.dat",
            "usrclass.dat",
            false,
        ),
    ]
}

pub fn event_logs() -> Vec<ExportRequest> {
    vec![ExportRequest::pattern(
        r"%SYSTEMDRIVE%\\Windows\\System32\\winevt\\Logs\\.*\.evtx",
        r".*\.evtx",
        true,
    )]
}

pub fn web_history() -> Vec<ExportRequest> {
    vec![ExportRequest::pattern(
        r"%SYSTEMDRIVE%\\Users\\[^\\]+\\AppData\\Local\\Microsoft\\Windows\\WebCache\\WebCacheV01\.dat",
        "WebCacheV01.dat",
        false,
    )]
}

/// Requests selected by a string of gather letters; unknown letters are ignored
pub fn requests_for(gather: &str) -> Vec<ExportRequest> {
    let gather = gather.to_ascii_lowercase();
    let wants = |letter: char| gather.contains(GATHER_ALL) || gather.contains(letter);

    let mut requests = Vec::new();
    if wants(GATHER_MFT) {
        requests.extend(mft());
    }
    if wants(GATHER_REGISTRY) {
        requests.extend(registry());
    }
    if wants(GATHER_USER_HIVES) {
        requests.extend(user_hives());
    }
    if wants(GATHER_EVENT_LOGS) {
        requests.extend(event_logs());
    }
    if wants(GATHER_WEB_HISTORY) {
        requests.extend(web_history());
    }
    requests
}

/// Load a JSON array of requests
pub fn load_request_list(path: &Path) -> Result<Vec<ExportRequest>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
