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

//! Per-thread lock bookkeeping.
//!
//! A [`LocalLockPool`] records how many read, non-exclusive write and write
//! holds the owning thread has on each key. It never blocks and has no
//! cross-thread visibility; the manager consults it before touching a shared
//! gate so re-entrant requests only bump a counter.

use std::collections::HashMap;
use std::fmt;

/// Lock strength, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockType {
    /// Shared read
    Read,
    /// Non-exclusive write: parallel with other non-exclusive writers, excludes readers
    NonExWrite,
    /// Exclusive write
    Write,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockType::Read => write!(f, "read"),
            LockType::NonExWrite => write!(f, "non-ex write"),
            LockType::Write => write!(f, "write"),
        }
    }
}

/// Counter bundle for one key held by one thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocalLock {
    read_count: usize,
    non_ex_write_count: usize,
    write_count: usize,
}

impl LocalLock {
    /// Number of holds of the given type.
    pub fn count(&self, lock_type: LockType) -> usize {
        match lock_type {
            LockType::Read => self.read_count,
            LockType::NonExWrite => self.non_ex_write_count,
            LockType::Write => self.write_count,
        }
    }

    /// Thread holds at least one read.
    pub fn has_read(&self) -> bool {
        self.read_count > 0
    }

    /// Thread holds at least one non-exclusive write.
    pub fn has_non_ex_write(&self) -> bool {
        self.non_ex_write_count > 0
    }

    /// Thread holds at least one write.
    pub fn has_write(&self) -> bool {
        self.write_count > 0
    }

    /// No holds of any type remain.
    pub fn is_idle(&self) -> bool {
        self.read_count == 0 && self.non_ex_write_count == 0 && self.write_count == 0
    }

    pub(crate) fn increment(&mut self, lock_type: LockType) {
        *self.slot(lock_type) += 1;
    }

    /// Returns false if there was no hold of that type to drop.
    pub(crate) fn decrement(&mut self, lock_type: LockType) -> bool {
        let slot = self.slot(lock_type);
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    fn slot(&mut self, lock_type: LockType) -> &mut usize {
        match lock_type {
            LockType::Read => &mut self.read_count,
            LockType::NonExWrite => &mut self.non_ex_write_count,
            LockType::Write => &mut self.write_count,
        }
    }
}

/// All of one thread's [`LocalLock`]s, keyed by lock name.
#[derive(Debug, Default)]
pub struct LocalLockPool {
    locks: HashMap<String, LocalLock>,
}

impl LocalLockPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter bundle for `key`, created on first use.
    pub fn get_local_lock(&mut self, key: &str) -> &mut LocalLock {
        self.locks.entry(key.to_string()).or_default()
    }

    /// Snapshot of the counters for `key` (idle if absent).
    pub fn snapshot(&self, key: &str) -> LocalLock {
        self.locks.get(key).cloned().unwrap_or_default()
    }

    /// Drop the bundle for `key` once all of its counters are zero.
    pub fn release_local_lock(&mut self, key: &str) {
        if self.locks.get(key).is_some_and(LocalLock::is_idle) {
            self.locks.remove(key);
        }
    }

    /// Drop the bundle for `key` regardless of its counters.
    pub(crate) fn clear_local_lock(&mut self, key: &str) {
        self.locks.remove(key);
    }

    /// Keys with a bundle in the pool.
    pub fn keys(&self) -> Vec<String> {
        self.locks.keys().cloned().collect()
    }

    /// Number of keys tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_type_strength_order() {
        assert!(LockType::Read < LockType::NonExWrite);
        assert!(LockType::NonExWrite < LockType::Write);
        assert_eq!(
            [LockType::Write, LockType::Read].iter().max(),
            Some(&LockType::Write)
        );
    }

    #[test]
    fn test_counters_track_each_type() {
        let mut pool = LocalLockPool::new();
        let lock = pool.get_local_lock("jobs");
        lock.increment(LockType::Write);
        lock.increment(LockType::Read);
        lock.increment(LockType::Read);

        let snapshot = pool.snapshot("jobs");
        assert!(snapshot.has_write());
        assert!(!snapshot.has_non_ex_write());
        assert_eq!(snapshot.count(LockType::Read), 2);
    }

    #[test]
    fn test_decrement_below_zero_is_rejected() {
        let mut lock = LocalLock::default();
        assert!(!lock.decrement(LockType::Read));
        lock.increment(LockType::Read);
        assert!(lock.decrement(LockType::Read));
        assert!(lock.is_idle());
    }

    #[test]
    fn test_release_only_removes_idle_entries() {
        let mut pool = LocalLockPool::new();
        pool.get_local_lock("a").increment(LockType::NonExWrite);
        pool.release_local_lock("a");
        assert_eq!(pool.len(), 1);

        pool.get_local_lock("a").decrement(LockType::NonExWrite);
        pool.release_local_lock("a");
        assert!(pool.is_empty());
        assert!(pool.snapshot("a").is_idle());
    }
}
