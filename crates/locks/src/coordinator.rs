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

//! The shared coordination namespace of one process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{GlobalLockBackend, ProcessLocalBackend};
use crate::config::{create_coordinator_from_config, LockManagerConfig};
use crate::manager::BaseLockManager;
use crate::pool::LockPool;
use crate::store::{MemoryStore, SharedStore};
use crate::LockResult;

/// Default back-off between admission re-checks and backend retries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

static NEXT_COORDINATOR_ID: AtomicU64 = AtomicU64::new(0);

/// Gate pools and shared store used by every [`BaseLockManager`] built from it.
///
/// Locks and critical sections live in separate pools, so the same key string
/// names two unrelated gates. Critical sections never leave the process.
/// Construct one coordinator per process (or per test) and share it with
/// `Arc`; each thread then creates its own manager with
/// [`LockCoordinator::lock_manager`].
pub struct LockCoordinator {
    id: u64,
    locks: LockPool,
    sections: LockPool,
    store: Arc<dyn SharedStore>,
    poll_interval: Duration,
}

impl LockCoordinator {
    /// Single-process coordinator with an in-memory store.
    pub fn new() -> Self {
        Self::with_backends(Arc::new(MemoryStore::new()), Arc::new(ProcessLocalBackend))
    }

    /// Coordinator over an explicit store and cross-process lock backend.
    pub fn with_backends(
        store: Arc<dyn SharedStore>,
        lock_backend: Arc<dyn GlobalLockBackend>,
    ) -> Self {
        Self::with_options(store, lock_backend, DEFAULT_POLL_INTERVAL)
    }

    /// Coordinator with an explicit poll interval.
    pub fn with_options(
        store: Arc<dyn SharedStore>,
        lock_backend: Arc<dyn GlobalLockBackend>,
        poll_interval: Duration,
    ) -> Self {
        tracing::debug!(
            store = store.name(),
            backend = lock_backend.name(),
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Creating lock coordinator"
        );
        Self {
            id: NEXT_COORDINATOR_ID.fetch_add(1, Ordering::Relaxed),
            locks: LockPool::new("locks", lock_backend, poll_interval),
            sections: LockPool::new("sections", Arc::new(ProcessLocalBackend), poll_interval),
            store,
            poll_interval,
        }
    }

    /// Coordinator built from configuration; see [`create_coordinator_from_config`].
    pub fn from_config(config: &LockManagerConfig) -> LockResult<Arc<Self>> {
        create_coordinator_from_config(config)
    }

    /// Lock manager bound to the calling thread.
    ///
    /// Managers the same thread gets from this coordinator share its holds.
    pub fn lock_manager(self: &Arc<Self>) -> BaseLockManager {
        BaseLockManager::new(Arc::clone(self))
    }

    /// Retire idle gates in both pools. Returns how many were dropped.
    pub fn expire_idle_gates(&self) -> usize {
        self.locks.expire_idle() + self.sections.expire_idle()
    }

    /// Number of cached lock gates.
    pub fn pooled_lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Number of cached critical-section gates.
    pub fn pooled_section_count(&self) -> usize {
        self.sections.len()
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn locks(&self) -> &LockPool {
        &self.locks
    }

    pub(crate) fn sections(&self) -> &LockPool {
        &self.sections
    }

    pub(crate) fn store(&self) -> &dyn SharedStore {
        self.store.as_ref()
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for LockCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("id", &self.id)
            .field("locks", &self.locks)
            .field("sections", &self.sections)
            .field("store", &self.store.name())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
