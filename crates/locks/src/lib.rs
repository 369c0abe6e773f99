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

//! # PlexSpaces Locks
//!
//! ## Purpose
//! Read, non-exclusive write and write locks over named keys, process-local
//! critical sections, global flags, shared byte-blob data, and a service
//! registration/liveness protocol for cooperating processes.
//!
//! ## Architecture Context
//! - [`LockCoordinator`]: one per process. Owns the gate pools for locks and
//!   for critical sections, the shared flag/data store and the cross-process
//!   lock backend. Shared between threads with `Arc`.
//! - [`BaseLockManager`]: one per thread. Tracks the thread's own holds so
//!   re-entrant requests never touch shared state, and only goes to a
//!   [`LockGate`] when the thread does not already hold a covering lock.
//! - [`ServiceRegistry`]: service registration built from flags and data
//!   under a write lock per service type. Available on every [`LockManager`].
//!
//! ## Design Decisions
//! - **Thread-bound managers**: re-entrancy is tracked per thread, so managers
//!   are neither `Send` nor `Sync`
//! - **Sorted multi-key acquisition**: `enter_locks` deduplicates and sorts keys
//!   so every caller acquires in the same order
//! - **All or nothing**: a failed multi-key acquisition releases what it took
//! - **Expiring gates**: a gate retires when its last holder leaves; waiters see
//!   [`Admission::Expired`] and retry against a fresh gate
//! - **Cooperative interruption**: blocking waits poll an [`InterruptHandle`]
//!
//! ## Backend Support
//! - **InMemory**: flags and data in process memory, no cross-process holds (default)
//! - **File**: flags, data and lock status files in a synchronization directory
//!   shared by cooperating processes (feature: `file-backend`)
//!
//! ## Examples
//!
//! ### Basic Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use plexspaces_locks::{LockCoordinator, LockManager};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = Arc::new(LockCoordinator::new());
//! let manager = coordinator.lock_manager();
//!
//! manager.enter_write_lock("jobs:42")?;
//! // Re-entrant read under our own write does not block
//! manager.enter_read_lock("jobs:42")?;
//! manager.leave_read_lock("jobs:42")?;
//! manager.leave_write_lock("jobs:42")?;
//!
//! // Several keys at once, in deadlock-free order
//! manager.enter_locks(&["queue"], &[], &["jobs:42", "jobs:7"])?;
//! manager.leave_locks(&["queue"], &[], &["jobs:42", "jobs:7"])?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Another Thread
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::thread;
//! use plexspaces_locks::{LockCoordinator, LockManager};
//!
//! let coordinator = Arc::new(LockCoordinator::new());
//! let shared = Arc::clone(&coordinator);
//! thread::spawn(move || {
//!     let manager = shared.lock_manager();
//!     if manager.enter_write_lock_no_wait("jobs:42").is_ok() {
//!         let _ = manager.leave_write_lock("jobs:42");
//!     }
//! })
//! .join()
//! .unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod interrupt;
pub mod local;
pub mod manager;
pub mod pool;
pub mod registry;
pub mod store;

#[cfg(feature = "file-backend")]
pub mod file;

pub use backend::{GlobalLockBackend, ProcessLocalBackend};
pub use config::{create_coordinator_from_config, create_coordinator_from_env, BackendType, LockManagerConfig};
pub use coordinator::{LockCoordinator, DEFAULT_POLL_INTERVAL};
pub use error::{LockError, LockResult};
pub use gate::{Admission, Departure, LockGate};
pub use interrupt::InterruptHandle;
pub use local::{LocalLock, LocalLockPool, LockType};
pub use manager::{BaseLockManager, LockManager};
pub use pool::LockPool;
pub use registry::{ServiceCleanup, ServiceDataAcceptor, ServiceRegistry};
pub use store::{MemoryStore, SharedStore};

#[cfg(feature = "file-backend")]
pub use file::{FileLockBackend, FileStore};
