// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Small filesystem helpers shared by the knowledge store, config and journal

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sibling temp path used while writing `path`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `contents` to `path` so that readers only ever see the old or the
/// new file: write a sibling temp file, fsync it, then rename over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path_for(path);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() && tmp.exists() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Move a file, falling back to copy + remove when a plain rename fails
/// (for example across devices or sync-provider mount points).
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!("Rename {:?} -> {:?} failed ({}), trying copy", from, to, rename_err);
            if to.exists() {
                return Err(rename_err);
            }
            if let Err(copy_err) = fs::copy(from, to) {
                let _ = fs::remove_file(to);
                return Err(copy_err);
            }
            fs::remove_file(from)
        }
    }
}
