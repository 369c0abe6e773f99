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

//! Cooperative interruption of blocking lock waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle used by other threads to interrupt a thread's blocking lock waits.
///
/// Interruption is sticky until a blocking wait observes it; the wait then
/// fails with [`LockError::Interrupted`](crate::LockError::Interrupted) and
/// the flag is cleared.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Create a handle that is not interrupted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the owning thread interrupted.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt is pending.
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Consume a pending interrupt.
    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_is_consumed_once() {
        let handle = InterruptHandle::new();
        let remote = handle.clone();
        assert!(!handle.take());

        remote.interrupt();
        assert!(handle.is_interrupted());
        assert!(handle.take());
        assert!(!handle.take());
    }
}
