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

//! Keyed cache of [`LockGate`]s.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::GlobalLockBackend;
use crate::gate::LockGate;

/// Mints and caches one live gate per key.
///
/// Gates are shared through `Arc`, so a caller keeps a retired gate alive
/// until it notices the expiry and asks the pool again.
pub struct LockPool {
    name: &'static str,
    gates: Mutex<HashMap<String, Arc<LockGate>>>,
    backend: Arc<dyn GlobalLockBackend>,
    poll_interval: Duration,
}

impl LockPool {
    /// Create a pool whose gates mirror holds into `backend`.
    pub fn new(name: &'static str, backend: Arc<dyn GlobalLockBackend>, poll_interval: Duration) -> Self {
        Self {
            name,
            gates: Mutex::new(HashMap::new()),
            backend,
            poll_interval,
        }
    }

    /// Live gate for `lock_key`, minting a new one if none exists or the cached one expired.
    pub fn get_object(&self, lock_key: &str) -> Arc<LockGate> {
        let mut gates = self.gates.lock();
        if let Some(gate) = gates.get(lock_key) {
            if !gate.is_expired() {
                return Arc::clone(gate);
            }
        }
        let gate = Arc::new(LockGate::new(
            lock_key,
            Arc::clone(&self.backend),
            self.poll_interval,
        ));
        gates.insert(lock_key.to_string(), Arc::clone(&gate));
        gate
    }

    /// Forget `gate` if it is still the cached gate for `lock_key` and has retired.
    pub fn release_object(&self, lock_key: &str, gate: &Arc<LockGate>) {
        let mut gates = self.gates.lock();
        let current = gates
            .get(lock_key)
            .is_some_and(|cached| Arc::ptr_eq(cached, gate));
        if current && gate.is_expired() {
            gates.remove(lock_key);
        }
    }

    /// Retire and drop every gate nobody holds. Returns how many were dropped.
    pub fn expire_idle(&self) -> usize {
        let mut gates = self.gates.lock();
        let before = gates.len();
        gates.retain(|_, gate| {
            gate.expire_if_idle();
            !gate.is_expired()
        });
        let dropped = before - gates.len();
        if dropped > 0 {
            tracing::debug!(pool = self.name, dropped, "Expired idle gates");
        }
        dropped
    }

    /// Number of cached gates.
    pub fn len(&self) -> usize {
        self.gates.lock().len()
    }

    /// True if no gates are cached.
    pub fn is_empty(&self) -> bool {
        self.gates.lock().is_empty()
    }
}

impl std::fmt::Debug for LockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockPool")
            .field("name", &self.name)
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ProcessLocalBackend;
    use crate::gate::{Admission, Departure};
    use crate::interrupt::InterruptHandle;
    use crate::local::LockType;
    use std::thread;

    fn pool() -> LockPool {
        LockPool::new("test", Arc::new(ProcessLocalBackend), Duration::from_millis(5))
    }

    #[test]
    fn test_same_key_shares_one_gate() {
        let pool = pool();
        let a = pool.get_object("k");
        let b = pool.get_object("k");
        let c = pool.get_object("other");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_expired_gate_is_replaced_and_released() {
        let pool = pool();
        let me = thread::current().id();
        let interrupt = InterruptHandle::new();

        let first = pool.get_object("k");
        assert_eq!(first.try_enter(LockType::Write, me).unwrap(), Admission::Admitted);
        assert_eq!(first.leave(LockType::Write, &interrupt).unwrap(), Departure::Drained);

        let second = pool.get_object("k");
        assert!(!Arc::ptr_eq(&first, &second));

        // Releasing the stale gate must not evict its replacement.
        pool.release_object("k", &first);
        assert_eq!(pool.len(), 1);
        assert!(Arc::ptr_eq(&second, &pool.get_object("k")));
    }

    #[test]
    fn test_expire_idle_keeps_held_gates() {
        let pool = pool();
        let me = thread::current().id();
        let held = pool.get_object("held");
        held.try_enter(LockType::Read, me).unwrap();
        let idle = pool.get_object("idle");

        assert_eq!(pool.expire_idle(), 1);
        assert!(idle.is_expired());
        assert!(!held.is_expired());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_concurrent_get_object_yields_single_gate() {
        let pool = Arc::new(pool());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.get_object("shared"))
            })
            .collect();
        let gates: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(gates.iter().all(|g| Arc::ptr_eq(g, &gates[0])));
    }
}
