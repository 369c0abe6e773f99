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

//! Lock manager trait and its thread-bound implementation.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::coordinator::LockCoordinator;
use crate::gate::{Admission, Departure};
use crate::interrupt::InterruptHandle;
use crate::local::{LocalLock, LocalLockPool, LockType};
use crate::pool::LockPool;
use crate::{LockError, LockResult};

/// Lock, critical section, flag and shared data operations.
///
/// ## Design Notes
/// - Blocking `enter_*` calls wait until admitted or interrupted; `*_no_wait`
///   forms fail with [`LockError::LockContention`] instead of waiting.
/// - Every successful `enter_*` must be paired with a `leave_*` of the same type.
/// - When several keys are needed together, use [`enter_locks`](Self::enter_locks):
///   it acquires in sorted key order, which is what keeps callers deadlock free.
/// - Flags and data are not locked implicitly; wrap read-modify-write
///   sequences in a lock on a key covering the resource.
pub trait LockManager {
    /// Raise a global flag.
    fn set_global_flag(&self, flag_name: &str) -> LockResult<()>;

    /// Lower a global flag.
    fn clear_global_flag(&self, flag_name: &str) -> LockResult<()>;

    /// Check a global flag; absent flags are false.
    fn check_global_flag(&self, flag_name: &str) -> LockResult<bool>;

    /// Read shared data, `None` if absent.
    fn read_data(&self, resource_name: &str) -> LockResult<Option<Vec<u8>>>;

    /// Write shared data; `None` deletes it.
    fn write_data(&self, resource_name: &str, data: Option<&[u8]>) -> LockResult<()>;

    /// Sleep for `time`, failing early if interrupted.
    fn timed_wait(&self, time: Duration) -> LockResult<()>;

    /// Enter an exclusive write lock.
    fn enter_write_lock(&self, lock_key: &str) -> LockResult<()>;

    /// Enter an exclusive write lock without waiting.
    fn enter_write_lock_no_wait(&self, lock_key: &str) -> LockResult<()>;

    /// Leave an exclusive write lock.
    fn leave_write_lock(&self, lock_key: &str) -> LockResult<()>;

    /// Enter a non-exclusive write lock.
    fn enter_non_ex_write_lock(&self, lock_key: &str) -> LockResult<()>;

    /// Enter a non-exclusive write lock without waiting.
    fn enter_non_ex_write_lock_no_wait(&self, lock_key: &str) -> LockResult<()>;

    /// Leave a non-exclusive write lock.
    fn leave_non_ex_write_lock(&self, lock_key: &str) -> LockResult<()>;

    /// Enter a read lock.
    fn enter_read_lock(&self, lock_key: &str) -> LockResult<()>;

    /// Enter a read lock without waiting.
    fn enter_read_lock_no_wait(&self, lock_key: &str) -> LockResult<()>;

    /// Leave a read lock.
    fn leave_read_lock(&self, lock_key: &str) -> LockResult<()>;

    /// Enter several locks at once, all or nothing.
    fn enter_locks(
        &self,
        read_locks: &[&str],
        non_ex_write_locks: &[&str],
        write_locks: &[&str],
    ) -> LockResult<()>;

    /// Enter several locks at once without waiting, all or nothing.
    fn enter_locks_no_wait(
        &self,
        read_locks: &[&str],
        non_ex_write_locks: &[&str],
        write_locks: &[&str],
    ) -> LockResult<()>;

    /// Leave locks entered with [`enter_locks`](Self::enter_locks).
    fn leave_locks(
        &self,
        read_locks: &[&str],
        non_ex_write_locks: &[&str],
        write_locks: &[&str],
    ) -> LockResult<()>;

    /// Release every lock the calling thread holds.
    fn clear_locks(&self) -> LockResult<()>;

    /// Enter a read critical section.
    fn enter_read_critical_section(&self, section_key: &str) -> LockResult<()>;

    /// Leave a read critical section.
    fn leave_read_critical_section(&self, section_key: &str) -> LockResult<()>;

    /// Enter a non-exclusive write critical section.
    fn enter_non_ex_write_critical_section(&self, section_key: &str) -> LockResult<()>;

    /// Leave a non-exclusive write critical section.
    fn leave_non_ex_write_critical_section(&self, section_key: &str) -> LockResult<()>;

    /// Enter an exclusive write critical section.
    fn enter_write_critical_section(&self, section_key: &str) -> LockResult<()>;

    /// Leave an exclusive write critical section.
    fn leave_write_critical_section(&self, section_key: &str) -> LockResult<()>;

    /// Enter several critical sections at once, all or nothing.
    fn enter_critical_sections(
        &self,
        read_sections: &[&str],
        non_ex_write_sections: &[&str],
        write_sections: &[&str],
    ) -> LockResult<()>;

    /// Leave critical sections entered with
    /// [`enter_critical_sections`](Self::enter_critical_sections).
    fn leave_critical_sections(
        &self,
        read_sections: &[&str],
        non_ex_write_sections: &[&str],
        write_sections: &[&str],
    ) -> LockResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Lock,
    Section,
}

impl Scope {
    fn describe(self) -> &'static str {
        match self {
            Scope::Lock => "lock",
            Scope::Section => "critical section",
        }
    }
}

enum GateRelease {
    Done,
    /// Released, but an interrupt arrived on the way and must still be reported
    DoneInterrupted(LockError),
    /// Not released; the thread still holds the gate
    Failed(LockError),
}

/// Whether existing holds already cover a request for `lock_type`.
fn covers(held: &LocalLock, lock_type: LockType) -> bool {
    match lock_type {
        LockType::Read => held.has_read() || held.has_non_ex_write() || held.has_write(),
        LockType::NonExWrite => held.has_non_ex_write() || held.has_write(),
        LockType::Write => held.has_write(),
    }
}

/// Strongest type held; that is the hold the thread has at the gate.
fn strongest(held: &LocalLock) -> Option<LockType> {
    [LockType::Write, LockType::NonExWrite, LockType::Read]
        .into_iter()
        .find(|lock_type| held.count(*lock_type) > 0)
}

/// Deduplicate keys (strongest requested type wins) and sort them.
pub(crate) fn sorted_unique_locks(
    read_keys: &[&str],
    non_ex_write_keys: &[&str],
    write_keys: &[&str],
) -> Vec<(String, LockType)> {
    let mut requests: BTreeMap<&str, LockType> = BTreeMap::new();
    let groups = [
        (read_keys, LockType::Read),
        (non_ex_write_keys, LockType::NonExWrite),
        (write_keys, LockType::Write),
    ];
    for (keys, lock_type) in groups {
        for key in keys {
            let entry = requests.entry(*key).or_insert(lock_type);
            *entry = (*entry).max(lock_type);
        }
    }
    requests
        .into_iter()
        .map(|(key, lock_type)| (key.to_string(), lock_type))
        .collect()
}

/// One thread's holds against one coordinator.
struct ThreadHolds {
    locks: RefCell<LocalLockPool>,
    sections: RefCell<LocalLockPool>,
    interrupt: InterruptHandle,
}

thread_local! {
    /// Coordinator id to the calling thread's holds. Entries die with the last manager.
    static THREAD_HOLDS: RefCell<HashMap<u64, Weak<ThreadHolds>>> = RefCell::new(HashMap::new());
}

fn thread_holds(coordinator_id: u64) -> Rc<ThreadHolds> {
    THREAD_HOLDS.with(|registry| {
        let mut registry = registry.borrow_mut();
        if let Some(holds) = registry.get(&coordinator_id).and_then(Weak::upgrade) {
            return holds;
        }
        registry.retain(|_, holds| holds.strong_count() > 0);
        let holds = Rc::new(ThreadHolds {
            locks: RefCell::new(LocalLockPool::new()),
            sections: RefCell::new(LocalLockPool::new()),
            interrupt: InterruptHandle::new(),
        });
        registry.insert(coordinator_id, Rc::downgrade(&holds));
        holds
    })
}

/// [`LockManager`] for the thread that created it.
///
/// Re-entrancy bookkeeping belongs to the thread: every manager a thread
/// creates from the same [`LockCoordinator`] shares the same counters and
/// interrupt handle, so holds taken through one are visible through the
/// others. Managers are neither `Send` nor `Sync`. Locks still held when the
/// thread's last manager for a coordinator is dropped are released.
pub struct BaseLockManager {
    coordinator: Arc<LockCoordinator>,
    thread_id: ThreadId,
    holds: Rc<ThreadHolds>,
}

impl BaseLockManager {
    /// Create a manager bound to the calling thread.
    pub fn new(coordinator: Arc<LockCoordinator>) -> Self {
        let holds = thread_holds(coordinator.id());
        Self {
            coordinator,
            thread_id: thread::current().id(),
            holds,
        }
    }

    /// Handle other threads can use to interrupt this thread's waits.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.holds.interrupt.clone()
    }

    /// Thread this manager acts for.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Coordinator shared with other threads.
    pub fn coordinator(&self) -> &Arc<LockCoordinator> {
        &self.coordinator
    }

    /// This thread's holds on lock `lock_key`.
    pub fn held_lock(&self, lock_key: &str) -> LocalLock {
        self.holds.locks.borrow().snapshot(lock_key)
    }

    /// This thread's holds on critical section `section_key`.
    pub fn held_section(&self, section_key: &str) -> LocalLock {
        self.holds.sections.borrow().snapshot(section_key)
    }

    /// Number of lock keys this thread holds.
    pub fn held_lock_count(&self) -> usize {
        self.holds.locks.borrow().len()
    }

    fn pool(&self, scope: Scope) -> &LockPool {
        match scope {
            Scope::Lock => self.coordinator.locks(),
            Scope::Section => self.coordinator.sections(),
        }
    }

    fn local(&self, scope: Scope) -> &RefCell<LocalLockPool> {
        match scope {
            Scope::Lock => &self.holds.locks,
            Scope::Section => &self.holds.sections,
        }
    }

    fn enter(&self, scope: Scope, key: &str, lock_type: LockType, wait: bool) -> LockResult<()> {
        tracing::debug!(lock_key = %key, lock_type = %lock_type, scope = scope.describe(), wait, "Entering");

        let held = self.local(scope).borrow().snapshot(key);
        if !covers(&held, lock_type) {
            if let Some(existing) = strongest(&held) {
                return Err(LockError::IllegalSequence(format!(
                    "{} {} '{}' can't be entered within {} {}",
                    lock_type,
                    scope.describe(),
                    key,
                    existing,
                    scope.describe()
                )));
            }
            self.acquire_gate(scope, key, lock_type, wait)?;
        }
        self.local(scope)
            .borrow_mut()
            .get_local_lock(key)
            .increment(lock_type);
        Ok(())
    }

    fn acquire_gate(&self, scope: Scope, key: &str, lock_type: LockType, wait: bool) -> LockResult<()> {
        let pool = self.pool(scope);
        loop {
            let gate = pool.get_object(key);
            let admission = if wait {
                gate.enter(lock_type, self.thread_id, &self.holds.interrupt)?
            } else {
                gate.try_enter(lock_type, self.thread_id)?
            };
            match admission {
                Admission::Admitted => return Ok(()),
                Admission::Expired => {
                    pool.release_object(key, &gate);
                }
                Admission::Contended => {
                    return Err(LockError::LockContention(format!(
                        "{} {} '{}' is held by another thread or process",
                        lock_type,
                        scope.describe(),
                        key
                    )));
                }
            }
        }
    }

    fn leave(&self, scope: Scope, key: &str, lock_type: LockType) -> LockResult<()> {
        tracing::debug!(lock_key = %key, lock_type = %lock_type, scope = scope.describe(), "Leaving");

        let mut after = self.local(scope).borrow().snapshot(key);
        if !after.decrement(lock_type) {
            return Err(LockError::IllegalSequence(format!(
                "Leaving {} {} '{}' that is not held",
                lock_type,
                scope.describe(),
                key
            )));
        }
        if covers(&after, lock_type) {
            self.local(scope).borrow_mut().get_local_lock(key).decrement(lock_type);
            return Ok(());
        }
        if !after.is_idle() {
            return Err(LockError::IllegalSequence(format!(
                "Leaving {} {} '{}' while weaker holds entered within it remain",
                lock_type,
                scope.describe(),
                key
            )));
        }

        match self.release_gate(scope, key, lock_type) {
            GateRelease::Done => {
                self.drop_local(scope, key, lock_type);
                Ok(())
            }
            GateRelease::DoneInterrupted(err) => {
                self.drop_local(scope, key, lock_type);
                Err(err)
            }
            GateRelease::Failed(err) => Err(err),
        }
    }

    fn drop_local(&self, scope: Scope, key: &str, lock_type: LockType) {
        let mut local = self.local(scope).borrow_mut();
        local.get_local_lock(key).decrement(lock_type);
        local.release_local_lock(key);
    }

    fn release_gate(&self, scope: Scope, key: &str, lock_type: LockType) -> GateRelease {
        let pool = self.pool(scope);
        loop {
            let gate = pool.get_object(key);
            match gate.leave(lock_type, &self.holds.interrupt) {
                Ok(Departure::Released) => return GateRelease::Done,
                Ok(Departure::Drained) => {
                    pool.release_object(key, &gate);
                    return GateRelease::Done;
                }
                Ok(Departure::Expired) => {
                    pool.release_object(key, &gate);
                }
                Err(err) if err.is_interrupted() => {
                    // One more attempt so the hold is not leaked.
                    tracing::warn!(lock_key = %key, lock_type = %lock_type, "Interrupted while releasing, retrying once");
                    return match gate.leave(lock_type, &self.holds.interrupt) {
                        Ok(Departure::Released) => GateRelease::DoneInterrupted(err),
                        Ok(Departure::Drained) => {
                            pool.release_object(key, &gate);
                            GateRelease::DoneInterrupted(err)
                        }
                        Ok(Departure::Expired) => GateRelease::Failed(err),
                        Err(retry_err) => GateRelease::Failed(retry_err),
                    };
                }
                Err(err) => return GateRelease::Failed(err),
            }
        }
    }

    fn enter_many(
        &self,
        scope: Scope,
        read_keys: &[&str],
        non_ex_write_keys: &[&str],
        write_keys: &[&str],
        wait: bool,
    ) -> LockResult<()> {
        let requests = sorted_unique_locks(read_keys, non_ex_write_keys, write_keys);
        for (index, (key, lock_type)) in requests.iter().enumerate() {
            if let Err(err) = self.enter(scope, key, *lock_type, wait) {
                let mut failure = err;
                let mut release_failed = false;
                for (acquired_key, acquired_type) in requests[..index].iter().rev() {
                    if let Err(release_err) = self.leave(scope, acquired_key, *acquired_type) {
                        tracing::warn!(lock_key = %acquired_key, error = %release_err, "Failed to unwind partial acquisition");
                        if !release_failed {
                            failure = release_err;
                            release_failed = true;
                        }
                    }
                }
                return Err(failure);
            }
        }
        Ok(())
    }

    fn leave_many(
        &self,
        scope: Scope,
        read_keys: &[&str],
        non_ex_write_keys: &[&str],
        write_keys: &[&str],
    ) -> LockResult<()> {
        let requests = sorted_unique_locks(read_keys, non_ex_write_keys, write_keys);
        let mut last_error = None;
        for (key, lock_type) in requests.iter().rev() {
            if let Err(err) = self.leave(scope, key, *lock_type) {
                tracing::warn!(lock_key = %key, error = %err, "Failed to leave");
                last_error = Some(err);
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn clear(&self, scope: Scope) -> LockResult<()> {
        let keys = self.local(scope).borrow().keys();
        let mut first_error = None;
        for key in keys {
            let held = self.local(scope).borrow().snapshot(&key);
            let Some(gate_type) = strongest(&held) else {
                continue;
            };
            let outcome = self.release_gate(scope, &key, gate_type);
            let error = match outcome {
                GateRelease::Done => None,
                GateRelease::DoneInterrupted(err) => Some(err),
                GateRelease::Failed(err) => {
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            self.local(scope).borrow_mut().clear_local_lock(&key);
            if let Some(err) = error {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl LockManager for BaseLockManager {
    fn set_global_flag(&self, flag_name: &str) -> LockResult<()> {
        self.coordinator.store().set_flag(flag_name)
    }

    fn clear_global_flag(&self, flag_name: &str) -> LockResult<()> {
        self.coordinator.store().clear_flag(flag_name)
    }

    fn check_global_flag(&self, flag_name: &str) -> LockResult<bool> {
        self.coordinator.store().check_flag(flag_name)
    }

    fn read_data(&self, resource_name: &str) -> LockResult<Option<Vec<u8>>> {
        self.coordinator.store().read_data(resource_name)
    }

    fn write_data(&self, resource_name: &str, data: Option<&[u8]>) -> LockResult<()> {
        self.coordinator.store().write_data(resource_name, data)
    }

    fn timed_wait(&self, time: Duration) -> LockResult<()> {
        let deadline = Instant::now() + time;
        loop {
            if self.holds.interrupt.take() {
                return Err(LockError::Interrupted("Timed wait".to_string()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(self.coordinator.poll_interval()));
        }
    }

    fn enter_write_lock(&self, lock_key: &str) -> LockResult<()> {
        self.enter(Scope::Lock, lock_key, LockType::Write, true)
    }

    fn enter_write_lock_no_wait(&self, lock_key: &str) -> LockResult<()> {
        self.enter(Scope::Lock, lock_key, LockType::Write, false)
    }

    fn leave_write_lock(&self, lock_key: &str) -> LockResult<()> {
        self.leave(Scope::Lock, lock_key, LockType::Write)
    }

    fn enter_non_ex_write_lock(&self, lock_key: &str) -> LockResult<()> {
        self.enter(Scope::Lock, lock_key, LockType::NonExWrite, true)
    }

    fn enter_non_ex_write_lock_no_wait(&self, lock_key: &str) -> LockResult<()> {
        self.enter(Scope::Lock, lock_key, LockType::NonExWrite, false)
    }

    fn leave_non_ex_write_lock(&self, lock_key: &str) -> LockResult<()> {
        self.leave(Scope::Lock, lock_key, LockType::NonExWrite)
    }

    fn enter_read_lock(&self, lock_key: &str) -> LockResult<()> {
        self.enter(Scope::Lock, lock_key, LockType::Read, true)
    }

    fn enter_read_lock_no_wait(&self, lock_key: &str) -> LockResult<()> {
        self.enter(Scope::Lock, lock_key, LockType::Read, false)
    }

    fn leave_read_lock(&self, lock_key: &str) -> LockResult<()> {
        self.leave(Scope::Lock, lock_key, LockType::Read)
    }

    fn enter_locks(
        &self,
        read_locks: &[&str],
        non_ex_write_locks: &[&str],
        write_locks: &[&str],
    ) -> LockResult<()> {
        self.enter_many(Scope::Lock, read_locks, non_ex_write_locks, write_locks, true)
    }

    fn enter_locks_no_wait(
        &self,
        read_locks: &[&str],
        non_ex_write_locks: &[&str],
        write_locks: &[&str],
    ) -> LockResult<()> {
        self.enter_many(Scope::Lock, read_locks, non_ex_write_locks, write_locks, false)
    }

    fn leave_locks(
        &self,
        read_locks: &[&str],
        non_ex_write_locks: &[&str],
        write_locks: &[&str],
    ) -> LockResult<()> {
        self.leave_many(Scope::Lock, read_locks, non_ex_write_locks, write_locks)
    }

    fn clear_locks(&self) -> LockResult<()> {
        self.clear(Scope::Lock)
    }

    fn enter_read_critical_section(&self, section_key: &str) -> LockResult<()> {
        self.enter(Scope::Section, section_key, LockType::Read, true)
    }

    fn leave_read_critical_section(&self, section_key: &str) -> LockResult<()> {
        self.leave(Scope::Section, section_key, LockType::Read)
    }

    fn enter_non_ex_write_critical_section(&self, section_key: &str) -> LockResult<()> {
        self.enter(Scope::Section, section_key, LockType::NonExWrite, true)
    }

    fn leave_non_ex_write_critical_section(&self, section_key: &str) -> LockResult<()> {
        self.leave(Scope::Section, section_key, LockType::NonExWrite)
    }

    fn enter_write_critical_section(&self, section_key: &str) -> LockResult<()> {
        self.enter(Scope::Section, section_key, LockType::Write, true)
    }

    fn leave_write_critical_section(&self, section_key: &str) -> LockResult<()> {
        self.leave(Scope::Section, section_key, LockType::Write)
    }

    fn enter_critical_sections(
        &self,
        read_sections: &[&str],
        non_ex_write_sections: &[&str],
        write_sections: &[&str],
    ) -> LockResult<()> {
        self.enter_many(Scope::Section, read_sections, non_ex_write_sections, write_sections, true)
    }

    fn leave_critical_sections(
        &self,
        read_sections: &[&str],
        non_ex_write_sections: &[&str],
        write_sections: &[&str],
    ) -> LockResult<()> {
        self.leave_many(Scope::Section, read_sections, non_ex_write_sections, write_sections)
    }
}

impl Drop for BaseLockManager {
    fn drop(&mut self) {
        if Rc::strong_count(&self.holds) > 1 {
            return;
        }
        for scope in [Scope::Lock, Scope::Section] {
            if self.local(scope).borrow().is_empty() {
                continue;
            }
            tracing::warn!(scope = scope.describe(), "Lock manager dropped while holding; releasing");
            if let Err(err) = self.clear(scope) {
                tracing::error!(scope = scope.describe(), error = %err, "Failed to release holds on drop");
            }
        }
    }
}

impl std::fmt::Debug for BaseLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseLockManager")
            .field("thread_id", &self.thread_id)
            .field("held_locks", &self.holds.locks.borrow().len())
            .field("held_sections", &self.holds.sections.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> BaseLockManager {
        Arc::new(LockCoordinator::new()).lock_manager()
    }

    #[test]
    fn test_sorted_unique_locks_orders_and_keeps_strongest() {
        let requests = sorted_unique_locks(&["b", "a", "c"], &["c"], &["a"]);
        assert_eq!(
            requests,
            vec![
                ("a".to_string(), LockType::Write),
                ("b".to_string(), LockType::Read),
                ("c".to_string(), LockType::NonExWrite),
            ]
        );
    }

    #[test]
    fn test_sorted_unique_locks_is_input_order_independent() {
        assert_eq!(
            sorted_unique_locks(&[], &[], &["B", "A"]),
            sorted_unique_locks(&[], &[], &["A", "B"])
        );
    }

    #[test]
    fn test_write_lock_reentrancy() {
        let manager = manager();
        manager.enter_write_lock("k").unwrap();
        manager.enter_read_lock("k").unwrap();
        manager.enter_non_ex_write_lock("k").unwrap();
        manager.enter_write_lock("k").unwrap();

        let held = manager.held_lock("k");
        assert_eq!(held.count(LockType::Write), 2);
        assert_eq!(held.count(LockType::Read), 1);
        assert_eq!(manager.coordinator().pooled_lock_count(), 1);

        manager.leave_read_lock("k").unwrap();
        manager.leave_non_ex_write_lock("k").unwrap();
        manager.leave_write_lock("k").unwrap();
        assert!(manager.held_lock("k").has_write());
        manager.leave_write_lock("k").unwrap();

        assert!(manager.held_lock("k").is_idle());
        assert_eq!(manager.held_lock_count(), 0);
        assert_eq!(manager.coordinator().pooled_lock_count(), 0);
    }

    #[test]
    fn test_read_then_write_is_illegal() {
        let manager = manager();
        manager.enter_read_lock("k").unwrap();

        let result = manager.enter_write_lock("k");
        assert!(matches!(result, Err(LockError::IllegalSequence(_))));
        let result = manager.enter_non_ex_write_lock_no_wait("k");
        assert!(matches!(result, Err(LockError::IllegalSequence(_))));

        manager.leave_read_lock("k").unwrap();
    }

    #[test]
    fn test_non_ex_then_write_is_illegal() {
        let manager = manager();
        manager.enter_non_ex_write_lock("k").unwrap();
        manager.enter_read_lock("k").unwrap();

        let result = manager.enter_write_lock("k");
        assert!(matches!(result, Err(LockError::IllegalSequence(_))));

        manager.leave_read_lock("k").unwrap();
        manager.leave_non_ex_write_lock("k").unwrap();
    }

    #[test]
    fn test_leaving_unheld_lock_is_illegal() {
        let manager = manager();
        let result = manager.leave_write_lock("k");
        assert!(matches!(result, Err(LockError::IllegalSequence(_))));
    }

    #[test]
    fn test_leaving_write_before_nested_read_is_illegal() {
        let manager = manager();
        manager.enter_write_lock("k").unwrap();
        manager.enter_read_lock("k").unwrap();

        let result = manager.leave_write_lock("k");
        assert!(matches!(result, Err(LockError::IllegalSequence(_))));
        assert!(manager.held_lock("k").has_write());

        manager.leave_read_lock("k").unwrap();
        manager.leave_write_lock("k").unwrap();
    }

    #[test]
    fn test_locks_and_sections_are_distinct_namespaces() {
        let manager = manager();
        manager.enter_write_lock("shared-name").unwrap();
        manager.enter_write_critical_section("shared-name").unwrap();
        assert_eq!(manager.coordinator().pooled_lock_count(), 1);
        assert_eq!(manager.coordinator().pooled_section_count(), 1);

        manager.leave_write_critical_section("shared-name").unwrap();
        assert!(manager.held_lock("shared-name").has_write());
        manager.leave_write_lock("shared-name").unwrap();
    }

    #[test]
    fn test_enter_locks_illegal_request_unwinds() {
        let manager = manager();
        manager.enter_read_lock("m").unwrap();

        // "a" is acquired first, then "m" fails as an illegal escalation.
        let result = manager.enter_locks(&[], &[], &["a", "m"]);
        assert!(matches!(result, Err(LockError::IllegalSequence(_))));
        assert!(manager.held_lock("a").is_idle());
        assert!(manager.held_lock("m").has_read());

        manager.leave_read_lock("m").unwrap();
    }

    #[test]
    fn test_clear_locks_releases_everything() {
        let manager = manager();
        manager.enter_write_lock("a").unwrap();
        manager.enter_read_lock("a").unwrap();
        manager.enter_non_ex_write_lock("b").unwrap();
        manager.enter_read_lock("c").unwrap();
        manager.enter_read_lock("c").unwrap();

        manager.clear_locks().unwrap();
        assert_eq!(manager.held_lock_count(), 0);
        assert_eq!(manager.coordinator().pooled_lock_count(), 0);

        manager.enter_write_lock_no_wait("a").unwrap();
        manager.leave_write_lock("a").unwrap();
    }

    #[test]
    fn test_flags_and_data() {
        let manager = manager();
        assert!(!manager.check_global_flag("shutdown").unwrap());
        manager.set_global_flag("shutdown").unwrap();
        assert!(manager.check_global_flag("shutdown").unwrap());
        manager.clear_global_flag("shutdown").unwrap();
        assert!(!manager.check_global_flag("shutdown").unwrap());

        manager.write_data("blob", Some(b"payload")).unwrap();
        assert_eq!(manager.read_data("blob").unwrap(), Some(b"payload".to_vec()));
        manager.write_data("blob", None).unwrap();
        assert_eq!(manager.read_data("blob").unwrap(), None);
    }

    #[test]
    fn test_timed_wait_sleeps_and_can_be_interrupted() {
        let manager = manager();
        let start = Instant::now();
        manager.timed_wait(Duration::from_millis(30)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));

        manager.interrupt_handle().interrupt();
        let result = manager.timed_wait(Duration::from_secs(60));
        assert!(matches!(result, Err(LockError::Interrupted(_))));
    }

    #[test]
    fn test_drop_releases_held_locks() {
        let coordinator = Arc::new(LockCoordinator::new());
        {
            let manager = coordinator.lock_manager();
            manager.enter_write_lock("k").unwrap();
        }
        let manager = coordinator.lock_manager();
        manager.enter_write_lock_no_wait("k").unwrap();
        manager.leave_write_lock("k").unwrap();
    }
}
