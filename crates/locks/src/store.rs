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

//! Shared global flags and byte-blob data.
//!
//! Stores do no locking of their own beyond keeping single operations
//! consistent. Read-modify-write sequences must run under a lock on a key
//! covering the resource.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::LockResult;

/// Backing store for global flags and shared data.
pub trait SharedStore: Send + Sync {
    /// Raise a flag.
    fn set_flag(&self, flag_name: &str) -> LockResult<()>;

    /// Lower a flag. Lowering an absent flag is not an error.
    fn clear_flag(&self, flag_name: &str) -> LockResult<()>;

    /// Whether a flag is raised; absent flags are false.
    fn check_flag(&self, flag_name: &str) -> LockResult<bool>;

    /// Read a data blob, `None` if absent.
    fn read_data(&self, resource_name: &str) -> LockResult<Option<Vec<u8>>>;

    /// Write a data blob; `None` deletes it.
    fn write_data(&self, resource_name: &str, data: Option<&[u8]>) -> LockResult<()>;

    /// Store name for logging.
    fn name(&self) -> &'static str;
}

/// In-process store; contents live as long as the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    flags: Mutex<HashSet<String>>,
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStore for MemoryStore {
    fn set_flag(&self, flag_name: &str) -> LockResult<()> {
        self.flags.lock().insert(flag_name.to_string());
        Ok(())
    }

    fn clear_flag(&self, flag_name: &str) -> LockResult<()> {
        self.flags.lock().remove(flag_name);
        Ok(())
    }

    fn check_flag(&self, flag_name: &str) -> LockResult<bool> {
        Ok(self.flags.lock().contains(flag_name))
    }

    fn read_data(&self, resource_name: &str) -> LockResult<Option<Vec<u8>>> {
        Ok(self.data.lock().get(resource_name).cloned())
    }

    fn write_data(&self, resource_name: &str, data: Option<&[u8]>) -> LockResult<()> {
        let mut map = self.data.lock();
        match data {
            Some(bytes) => {
                map.insert(resource_name.to_string(), bytes.to_vec());
            }
            None => {
                map.remove(resource_name);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
