// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexSpaces.
//
// PlexSpaces is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexSpaces is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexSpaces. If not, see <https://www.gnu.org/licenses/>.

//! File-based backends for processes sharing a synchronization directory.
//!
//! ## Layout
//! Every name maps to `<root>/<area>/<h & 1023>/<(h >> 10) & 1023>/<safe-name>.<ext>`
//! where `h` is a stable hash of the name, so one directory never collects
//! more than a bounded share of the entries.
//!
//! ## Lock status files
//! Each gate key has a status file holding an integer:
//! - `0` (or no file): free
//! - `-1`: one process holds the exclusive write
//! - `< -1`: `-(n + 1)` processes hold non-exclusive writes
//! - `> 0`: that many processes hold reads
//!
//! A status file is only read or written while its `.lock` marker file exists;
//! the marker is created with exclusive-create semantics, and a marker that is
//! already present makes the caller back off and retry.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::GlobalLockBackend;
use crate::store::SharedStore;
use crate::{LockError, LockResult};

const STATUS_WRITE_LOCKED: i32 = -1;

/// Stable 32-bit FNV-1a hash; identical in every process.
fn bucket_hash(name: &str) -> u32 {
    name.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

/// Escape everything outside `[A-Za-z0-9_-]` as `.xx` hex bytes.
fn safe_file_name(name: &str) -> String {
    let mut safe = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            safe.push(char::from(byte));
        } else {
            safe.push_str(&format!(".{:02x}", byte));
        }
    }
    safe
}

/// One area (locks, flags, data) of a synchronization directory.
#[derive(Debug, Clone)]
struct SyncArea {
    root: PathBuf,
}

impl SyncArea {
    fn new(sync_directory: &Path, area: &str) -> Self {
        Self {
            root: sync_directory.join(area),
        }
    }

    fn path_for(&self, name: &str, extension: &str) -> LockResult<PathBuf> {
        let hash = bucket_hash(name);
        let dir = self
            .root
            .join((hash & 1023).to_string())
            .join(((hash >> 10) & 1023).to_string());
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}.{}", safe_file_name(name), extension)))
    }
}

/// Cross-process gate backend keeping per-key status files.
#[derive(Debug, Clone)]
pub struct FileLockBackend {
    area: SyncArea,
}

impl FileLockBackend {
    /// Use `sync_directory` (shared by all cooperating processes).
    pub fn new(sync_directory: impl AsRef<Path>) -> Self {
        Self {
            area: SyncArea::new(sync_directory.as_ref(), "locks"),
        }
    }

    /// Current status value for `lock_key` (0 when free). Intended for diagnostics.
    pub fn status(&self, lock_key: &str) -> LockResult<i32> {
        read_status(&self.area.path_for(lock_key, "file")?)
    }

    /// Run `update` on the status of `lock_key` while holding its marker.
    ///
    /// `Ok(None)` means the marker was held by someone else. `update` returns the
    /// new status to write, or `None` to refuse without writing.
    fn with_status<F>(&self, lock_key: &str, update: F) -> LockResult<Option<bool>>
    where
        F: FnOnce(i32) -> LockResult<Option<i32>>,
    {
        let marker = self.area.path_for(lock_key, "lock")?;
        let status_path = self.area.path_for(lock_key, "file")?;
        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        let result = read_status(&status_path).and_then(|status| match update(status)? {
            Some(next) => {
                write_status(&status_path, next)?;
                Ok(Some(true))
            }
            None => Ok(Some(false)),
        });

        if let Err(err) = fs::remove_file(&marker) {
            tracing::error!(marker = %marker.display(), error = %err, "Failed to remove lock marker");
            return Err(err.into());
        }
        result
    }

    fn obtain_with<F>(&self, lock_key: &str, update: F) -> LockResult<bool>
    where
        F: FnOnce(i32) -> LockResult<Option<i32>>,
    {
        Ok(self.with_status(lock_key, update)?.unwrap_or(false))
    }

    fn clear_with<F>(&self, lock_key: &str, update: F) -> LockResult<bool>
    where
        F: FnOnce(i32) -> LockResult<Option<i32>>,
    {
        Ok(self.with_status(lock_key, update)?.is_some())
    }
}

fn read_status(path: &Path) -> LockResult<i32> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            trimmed.parse::<i32>().map_err(|err| {
                LockError::BackendError(format!(
                    "Corrupt lock status file '{}': {}",
                    path.display(),
                    err
                ))
            })
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
        Err(err) => Err(err.into()),
    }
}

fn write_status(path: &Path, status: i32) -> LockResult<()> {
    fs::write(path, status.to_string())?;
    Ok(())
}

fn unexpected_status(lock_key: &str, status: i32) -> LockError {
    LockError::BackendError(format!(
        "Lock status for '{}' is {} which does not match the hold being released",
        lock_key, status
    ))
}

impl GlobalLockBackend for FileLockBackend {
    fn obtain_read(&self, lock_key: &str) -> LockResult<bool> {
        self.obtain_with(lock_key, |status| {
            if status <= STATUS_WRITE_LOCKED {
                return Ok(None);
            }
            Ok(Some(status + 1))
        })
    }

    fn obtain_non_ex_write(&self, lock_key: &str) -> LockResult<bool> {
        self.obtain_with(lock_key, |status| {
            if status == STATUS_WRITE_LOCKED || status > 0 {
                return Ok(None);
            }
            let base = if status == 0 { STATUS_WRITE_LOCKED } else { status };
            Ok(Some(base - 1))
        })
    }

    fn obtain_write(&self, lock_key: &str) -> LockResult<bool> {
        self.obtain_with(lock_key, |status| {
            if status != 0 {
                return Ok(None);
            }
            Ok(Some(STATUS_WRITE_LOCKED))
        })
    }

    fn clear_read(&self, lock_key: &str) -> LockResult<bool> {
        self.clear_with(lock_key, |status| {
            if status <= 0 {
                return Err(unexpected_status(lock_key, status));
            }
            Ok(Some(status - 1))
        })
    }

    fn clear_non_ex_write(&self, lock_key: &str) -> LockResult<bool> {
        self.clear_with(lock_key, |status| {
            if status >= STATUS_WRITE_LOCKED {
                return Err(unexpected_status(lock_key, status));
            }
            let next = status + 1;
            Ok(Some(if next == STATUS_WRITE_LOCKED { 0 } else { next }))
        })
    }

    fn clear_write(&self, lock_key: &str) -> LockResult<bool> {
        self.clear_with(lock_key, |_| Ok(Some(0)))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Flags and data kept as files in a synchronization directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    flags: SyncArea,
    data: SyncArea,
}

impl FileStore {
    /// Use `sync_directory` (shared by all cooperating processes).
    pub fn new(sync_directory: impl AsRef<Path>) -> Self {
        let root = sync_directory.as_ref();
        Self {
            flags: SyncArea::new(root, "flags"),
            data: SyncArea::new(root, "data"),
        }
    }
}

impl SharedStore for FileStore {
    fn set_flag(&self, flag_name: &str) -> LockResult<()> {
        let path = self.flags.path_for(flag_name, "flag")?;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn clear_flag(&self, flag_name: &str) -> LockResult<()> {
        let path = self.flags.path_for(flag_name, "flag")?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn check_flag(&self, flag_name: &str) -> LockResult<bool> {
        Ok(self.flags.path_for(flag_name, "flag")?.exists())
    }

    fn read_data(&self, resource_name: &str) -> LockResult<Option<Vec<u8>>> {
        let path = self.data.path_for(resource_name, "data")?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write_data(&self, resource_name: &str, data: Option<&[u8]>) -> LockResult<()> {
        let path = self.data.path_for(resource_name, "data")?;
        match data {
            Some(bytes) => {
                let temp = path.with_extension(format!(
                    "tmp-{}-{}",
                    std::process::id(),
                    TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
                ));
                fs::write(&temp, bytes)?;
                fs::rename(&temp, &path)?;
                Ok(())
            }
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            },
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
