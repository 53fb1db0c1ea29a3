//! Atomic file replacement.
//!
//! Contents go to `<file>.tmp` first, are flushed to disk, and the temp file is
//! renamed over the canonical path. A crash at any point leaves either the old
//! or the new canonical file, never a truncated one.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Sibling temp path used while replacing `path`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace `path` with `contents` atomically. The temp file is removed on failure.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path_for(path);

    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        if tmp.exists() {
            if let Err(cleanup_err) = fs::remove_file(&tmp) {
                log::warn!("Could not remove temp file {}: {}", tmp.display(), cleanup_err);
            }
        }
        return Err(e.into());
    }

    Ok(())
}
