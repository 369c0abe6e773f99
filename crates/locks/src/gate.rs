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

//! Cross-thread admission control for one lock key.
//!
//! ## Admission rules
//! - An exclusive writer excludes everyone except itself (same thread re-entering).
//! - Non-exclusive writers run alongside each other but exclude readers and writers.
//! - Readers run alongside each other but exclude non-exclusive and exclusive writers.
//!
//! A gate retires itself (becomes expired) the moment its last holder leaves.
//! Anyone waiting on, or about to enter, a retired gate gets
//! [`Admission::Expired`] and must fetch a fresh gate from the pool.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::backend::GlobalLockBackend;
use crate::interrupt::InterruptHandle;
use crate::local::LockType;
use crate::{LockError, LockResult};

/// Outcome of an attempt to enter a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The hold was granted
    Admitted,
    /// The hold is not currently grantable (NoWait only)
    Contended,
    /// The gate was retired; retry against a fresh gate for the same key
    Expired,
}

/// Outcome of leaving a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The hold was dropped and other holders remain
    Released,
    /// The hold was dropped, no holders remain and the gate retired itself
    Drained,
    /// The gate was already retired; retry against the pool's current gate
    Expired,
}

#[derive(Debug, Default)]
struct GateState {
    read_count: usize,
    non_ex_write_count: usize,
    write_count: usize,
    write_holder: Option<ThreadId>,
    global_read: bool,
    global_non_ex_write: bool,
    global_write: bool,
    expired: bool,
}

impl GateState {
    fn is_idle(&self) -> bool {
        self.read_count == 0 && self.non_ex_write_count == 0 && self.write_count == 0
    }

    fn count(&self, lock_type: LockType) -> usize {
        match lock_type {
            LockType::Read => self.read_count,
            LockType::NonExWrite => self.non_ex_write_count,
            LockType::Write => self.write_count,
        }
    }

    fn admits(&self, lock_type: LockType, thread: ThreadId) -> bool {
        if self.write_holder == Some(thread) {
            return true;
        }
        if self.write_holder.is_some() {
            return false;
        }
        match lock_type {
            LockType::Read => self.non_ex_write_count == 0,
            LockType::NonExWrite => self.read_count == 0,
            LockType::Write => self.read_count == 0 && self.non_ex_write_count == 0,
        }
    }

    fn global_flag(&mut self, lock_type: LockType) -> &mut bool {
        match lock_type {
            LockType::Read => &mut self.global_read,
            LockType::NonExWrite => &mut self.global_non_ex_write,
            LockType::Write => &mut self.global_write,
        }
    }

    fn admit(&mut self, lock_type: LockType, thread: ThreadId) {
        match lock_type {
            LockType::Read => self.read_count += 1,
            LockType::NonExWrite => self.non_ex_write_count += 1,
            LockType::Write => {
                self.write_count += 1;
                self.write_holder = Some(thread);
            }
        }
    }

    fn release(&mut self, lock_type: LockType) {
        match lock_type {
            LockType::Read => self.read_count -= 1,
            LockType::NonExWrite => self.non_ex_write_count -= 1,
            LockType::Write => {
                self.write_count -= 1;
                if self.write_count == 0 {
                    self.write_holder = None;
                }
            }
        }
    }
}

enum Attempt {
    Admitted,
    Blocked,
    GlobalBusy,
    Expired,
}

/// The shared synchronization object for one key.
pub struct LockGate {
    key: String,
    state: Mutex<GateState>,
    changed: Condvar,
    backend: Arc<dyn GlobalLockBackend>,
    poll_interval: Duration,
}

impl LockGate {
    /// Create a gate for `key` that mirrors holds into `backend`.
    pub fn new(key: impl Into<String>, backend: Arc<dyn GlobalLockBackend>, poll_interval: Duration) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
            backend,
            poll_interval,
        }
    }

    /// Key this gate guards.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the gate has been retired.
    pub fn is_expired(&self) -> bool {
        self.state.lock().expired
    }

    /// Whether the gate currently has no holders.
    pub fn is_idle(&self) -> bool {
        self.state.lock().is_idle()
    }

    /// Retire the gate if nobody holds it. Returns true if this call retired it.
    pub(crate) fn expire_if_idle(&self) -> bool {
        let mut state = self.state.lock();
        if state.expired || !state.is_idle() {
            return false;
        }
        state.expired = true;
        self.changed.notify_all();
        true
    }

    /// Attempt immediate admission.
    pub fn try_enter(&self, lock_type: LockType, thread: ThreadId) -> LockResult<Admission> {
        let mut state = self.state.lock();
        match self.attempt(&mut state, lock_type, thread)? {
            Attempt::Admitted => Ok(Admission::Admitted),
            Attempt::Expired => Ok(Admission::Expired),
            Attempt::Blocked | Attempt::GlobalBusy => Ok(Admission::Contended),
        }
    }

    /// Block until admitted or the gate is retired.
    ///
    /// Never returns [`Admission::Contended`].
    pub fn enter(
        &self,
        lock_type: LockType,
        thread: ThreadId,
        interrupt: &InterruptHandle,
    ) -> LockResult<Admission> {
        let mut state = self.state.lock();
        loop {
            match self.attempt(&mut state, lock_type, thread)? {
                Attempt::Admitted => return Ok(Admission::Admitted),
                Attempt::Expired => return Ok(Admission::Expired),
                Attempt::Blocked => {
                    self.check_interrupt(interrupt, lock_type)?;
                    self.changed.wait_for(&mut state, self.poll_interval);
                }
                Attempt::GlobalBusy => {
                    tracing::debug!(lock_key = %self.key, lock_type = %lock_type, backend = self.backend.name(), "Held by another process, backing off");
                    let poll_interval = self.poll_interval;
                    MutexGuard::unlocked(&mut state, || thread::sleep(poll_interval));
                    self.check_interrupt(interrupt, lock_type)?;
                }
            }
        }
    }

    /// Drop one hold of `lock_type`.
    ///
    /// If the backend is busy the call backs off and retries; an interrupt
    /// during that back-off leaves the hold in place and reports
    /// [`LockError::Interrupted`].
    pub fn leave(&self, lock_type: LockType, interrupt: &InterruptHandle) -> LockResult<Departure> {
        let mut state = self.state.lock();
        loop {
            if state.expired {
                return Ok(Departure::Expired);
            }
            let count = state.count(lock_type);
            if count == 0 {
                return Err(LockError::IllegalSequence(format!(
                    "No {} hold on gate '{}' to release",
                    lock_type, self.key
                )));
            }
            if count == 1 && *state.global_flag(lock_type) {
                if !self.backend.clear(lock_type, &self.key)? {
                    tracing::warn!(lock_key = %self.key, lock_type = %lock_type, backend = self.backend.name(), "Backend busy while releasing, retrying");
                    let poll_interval = self.poll_interval;
                    MutexGuard::unlocked(&mut state, || thread::sleep(poll_interval));
                    self.check_interrupt(interrupt, lock_type)?;
                    continue;
                }
                *state.global_flag(lock_type) = false;
            }
            state.release(lock_type);
            self.changed.notify_all();
            if state.is_idle() {
                state.expired = true;
                return Ok(Departure::Drained);
            }
            return Ok(Departure::Released);
        }
    }

    fn attempt(
        &self,
        state: &mut GateState,
        lock_type: LockType,
        thread: ThreadId,
    ) -> LockResult<Attempt> {
        if state.expired {
            return Ok(Attempt::Expired);
        }
        if !state.admits(lock_type, thread) {
            return Ok(Attempt::Blocked);
        }
        // Re-entry under our own write already holds everything cross-process.
        let reentrant = state.write_holder == Some(thread);
        if !reentrant && !*state.global_flag(lock_type) {
            if !self.backend.obtain(lock_type, &self.key)? {
                return Ok(Attempt::GlobalBusy);
            }
            *state.global_flag(lock_type) = true;
        }
        state.admit(lock_type, thread);
        Ok(Attempt::Admitted)
    }

    fn check_interrupt(&self, interrupt: &InterruptHandle, lock_type: LockType) -> LockResult<()> {
        if interrupt.take() {
            return Err(LockError::Interrupted(format!(
                "Waiting for {} lock on '{}'",
                lock_type, self.key
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for LockGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGate")
            .field("key", &self.key)
            .field("backend", &self.backend.name())
            .finish()
    }
}
