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

//! Cross-process hold backends consulted by lock gates.
//!
//! A gate handles all contention between threads of one process. When the
//! first holder of a kind is admitted, the gate asks its backend for the
//! matching cross-process hold, and it clears that hold when the last holder
//! of the kind leaves. A backend answering `false` means another process is in
//! the way: the gate backs off and retries (or reports contention for NoWait).

use crate::local::LockType;
use crate::LockResult;

/// Cross-process lock state for gate keys.
pub trait GlobalLockBackend: Send + Sync {
    /// Obtain a cross-process read hold. `false` if a writer elsewhere blocks it.
    fn obtain_read(&self, lock_key: &str) -> LockResult<bool>;

    /// Obtain a cross-process non-exclusive write hold.
    fn obtain_non_ex_write(&self, lock_key: &str) -> LockResult<bool>;

    /// Obtain the cross-process exclusive write hold.
    fn obtain_write(&self, lock_key: &str) -> LockResult<bool>;

    /// Drop a read hold. `false` if the backend is busy and the call must be retried.
    fn clear_read(&self, lock_key: &str) -> LockResult<bool>;

    /// Drop a non-exclusive write hold.
    fn clear_non_ex_write(&self, lock_key: &str) -> LockResult<bool>;

    /// Drop the exclusive write hold.
    fn clear_write(&self, lock_key: &str) -> LockResult<bool>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Dispatch an obtain by lock type.
    fn obtain(&self, lock_type: LockType, lock_key: &str) -> LockResult<bool> {
        match lock_type {
            LockType::Read => self.obtain_read(lock_key),
            LockType::NonExWrite => self.obtain_non_ex_write(lock_key),
            LockType::Write => self.obtain_write(lock_key),
        }
    }

    /// Dispatch a clear by lock type.
    fn clear(&self, lock_type: LockType, lock_key: &str) -> LockResult<bool> {
        match lock_type {
            LockType::Read => self.clear_read(lock_key),
            LockType::NonExWrite => self.clear_non_ex_write(lock_key),
            LockType::Write => self.clear_write(lock_key),
        }
    }
}

/// Backend for a single process: every cross-process request succeeds.
///
/// Critical sections always use this backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLocalBackend;

impl GlobalLockBackend for ProcessLocalBackend {
    fn obtain_read(&self, _lock_key: &str) -> LockResult<bool> {
        Ok(true)
    }

    fn obtain_non_ex_write(&self, _lock_key: &str) -> LockResult<bool> {
        Ok(true)
    }

    fn obtain_write(&self, _lock_key: &str) -> LockResult<bool> {
        Ok(true)
    }

    fn clear_read(&self, _lock_key: &str) -> LockResult<bool> {
        Ok(true)
    }

    fn clear_non_ex_write(&self, _lock_key: &str) -> LockResult<bool> {
        Ok(true)
    }

    fn clear_write(&self, _lock_key: &str) -> LockResult<bool> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "process-local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_local_backend_never_contends() {
        let backend = ProcessLocalBackend;
        for lock_type in [LockType::Read, LockType::NonExWrite, LockType::Write] {
            assert!(backend.obtain(lock_type, "k").unwrap());
            assert!(backend.obtain(lock_type, "k").unwrap());
            assert!(backend.clear(lock_type, "k").unwrap());
        }
    }
}
