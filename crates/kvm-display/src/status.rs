//! Sysfs connector status polling (spec §4.1.7).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use kvm_core::Result;

/// Tracks the sysfs `status` file for a single connector, re-reading it on
/// every [`ConnectorStatus::check`] call rather than reopening it, and
/// closing it for later retry on a read error.
pub struct ConnectorStatus {
    sysfs_path: PathBuf,
    file: Option<File>,
}

impl ConnectorStatus {
    /// Build the path `/sys/class/drm/card{minor}-{port}/status` for
    /// `device_path` (e.g. `/dev/dri/card0`) and `port` (e.g. `HDMI-A-1`).
    #[must_use]
    pub fn new(device_path: &Path, port: &str) -> Self {
        let minor = device_path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("card"))
            .unwrap_or("0")
            .to_string();
        let sysfs_path = PathBuf::from(format!("/sys/class/drm/card{minor}-{port}/status"));
        Self {
            sysfs_path,
            file: None,
        }
    }

    /// True if the connector is connected. Opens the status file lazily on
    /// first call, then seeks to start and re-reads on each subsequent
    /// call. A read error closes the file so the next call retries the
    /// open from scratch.
    pub fn is_connected(&mut self) -> Result<bool> {
        if self.file.is_none() {
            self.file = File::open(&self.sysfs_path).ok();
        }

        let Some(file) = self.file.as_mut() else {
            // No sysfs status file for this connector: treat as connected,
            // matching a connector type (e.g. composite/LVDS) that never
            // reports disconnect.
            return Ok(true);
        };

        let mut byte = [0u8; 1];
        let read_ok = file.seek(SeekFrom::Start(0)).is_ok() && file.read_exact(&mut byte).is_ok();
        if !read_ok {
            self.file = None;
            return Ok(true);
        }

        Ok(byte[0] != b'd')
    }
}
