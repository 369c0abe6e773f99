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

//! Per-connection pool of connector instances.
//!
//! Each process registers one anonymous service under the pool's service type
//! and publishes `(target, in_use)` as its service data. [`Pool::poll_all`]
//! reads every peer's numbers under a cluster-wide write lock and moves the
//! local maximum toward a fair share of the global maximum.

use parking_lot::{Condvar, Mutex};
use plexspaces_locks::{LockManager, LockResult, ServiceDataAcceptor, ServiceRegistry};
use rand::Rng;

use crate::{ConfigParams, Connector, ConnectorRegistry, PoolResult};

/// Prefix of the lock serializing target calculation for a pool.
pub const TARGET_CALC_LOCK_PREFIX: &str = "_POOLTARGET_";

/// Point-in-time view of one pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances this process may hand out
    pub local_max: i32,
    /// Permits not currently handed out
    pub num_free: i32,
    /// Instances parked on the stack
    pub idle: usize,
    /// Cluster-wide maximum requested by callers
    pub global_max: i32,
}

struct PoolState {
    is_alive: bool,
    global_max: i32,
    stack: Vec<Box<dyn Connector>>,
    num_free: i32,
    local_max: i32,
}

pub(crate) struct Pool {
    service_type: String,
    service_name: String,
    target_calc_lock: String,
    state: Mutex<PoolState>,
    changed: Condvar,
}

/// Sums the published numbers of every other active instance.
struct ServiceTally<'a> {
    own_name: &'a str,
    num_services: i32,
    global_target: i32,
    global_in_use: i32,
}

impl ServiceDataAcceptor for ServiceTally<'_> {
    fn accept_service_data(&mut self, service_name: &str, service_data: Option<&[u8]>) -> LockResult<bool> {
        self.num_services += 1;
        if service_name != self.own_name {
            let (target, in_use) = unpack(service_data);
            self.global_target += target;
            self.global_in_use += in_use;
        }
        Ok(false)
    }
}

/// Encode `(target, in_use)` as two little-endian i32s.
pub(crate) fn pack(target: i32, in_use: i32) -> [u8; 8] {
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&target.to_le_bytes());
    data[4..].copy_from_slice(&in_use.to_le_bytes());
    data
}

/// Anything that is not exactly eight bytes reads as `(0, 0)`.
pub(crate) fn unpack(data: Option<&[u8]>) -> (i32, i32) {
    match data {
        Some(bytes) if bytes.len() == 8 => {
            let mut target = [0u8; 4];
            let mut in_use = [0u8; 4];
            target.copy_from_slice(&bytes[..4]);
            in_use.copy_from_slice(&bytes[4..]);
            (i32::from_le_bytes(target), i32::from_le_bytes(in_use))
        }
        _ => (0, 0),
    }
}

impl Pool {
    /// Register this process's pool service and start with zero permits.
    pub(crate) fn new<M: LockManager + ?Sized>(
        manager: &M,
        service_type_prefix: &str,
        connection_name: &str,
        global_max: i32,
    ) -> PoolResult<Self> {
        let service_type = format!("{}{}", service_type_prefix, connection_name);
        let service_name = manager.register_service_begin_service_activity(&service_type, None, None)?;
        tracing::debug!(
            service_type = %service_type,
            service_name = %service_name,
            global_max,
            "Created connector pool"
        );
        Ok(Self {
            target_calc_lock: format!("{}{}", TARGET_CALC_LOCK_PREFIX, service_type),
            service_type,
            service_name,
            state: Mutex::new(PoolState {
                is_alive: true,
                global_max,
                stack: Vec::new(),
                num_free: 0,
                local_max: 0,
            }),
            changed: Condvar::new(),
        })
    }

    pub(crate) fn service_type(&self) -> &str {
        &self.service_type
    }

    pub(crate) fn service_name(&self) -> &str {
        &self.service_name
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            local_max: state.local_max,
            num_free: state.num_free,
            idle: state.stack.len(),
            global_max: state.global_max,
        }
    }

    pub(crate) fn update_maximum_pool_size(&self, global_max: i32) {
        self.state.lock().global_max = global_max;
    }

    /// Wait for a permit and hand out a matching connector.
    ///
    /// Returns `None` if the pool was shut down while waiting.
    pub(crate) fn get_connector(
        &self,
        registry: &ConnectorRegistry,
        class_name: &str,
        config: &ConfigParams,
    ) -> PoolResult<Option<Box<dyn Connector>>> {
        let mut state = self.state.lock();
        while state.is_alive && state.num_free <= 0 {
            self.changed.wait(&mut state);
        }
        if !state.is_alive {
            return Ok(None);
        }

        loop {
            let mut connector = match state.stack.pop() {
                Some(connector) => connector,
                None => {
                    let mut connector = registry.create(class_name)?;
                    connector.connect(config)?;
                    connector
                }
            };
            if connector.class_name() != class_name || connector.configuration() != Some(config) {
                connector.disconnect()?;
                continue;
            }
            state.num_free -= 1;
            return Ok(Some(connector));
        }
    }

    /// Return a connector and give its permit back.
    pub(crate) fn release_connector(&self, connector: Box<dyn Connector>) -> PoolResult<()> {
        let mut state = self.state.lock();
        state.stack.push(connector);
        state.num_free += 1;
        let trimmed = Self::trim_excess(&mut state);
        self.changed.notify_all();
        trimmed
    }

    /// Recompute this process's share of the global maximum.
    pub(crate) fn poll_all<M: LockManager + ?Sized>(&self, manager: &M) -> PoolResult<()> {
        manager.enter_write_lock(&self.target_calc_lock)?;
        let outcome = self.apportion(manager);
        manager.leave_write_lock(&self.target_calc_lock)?;
        outcome?;

        let mut state = self.state.lock();
        Self::trim_excess(&mut state)
    }

    fn apportion<M: LockManager + ?Sized>(&self, manager: &M) -> PoolResult<()> {
        let mut tally = ServiceTally {
            own_name: &self.service_name,
            num_services: 0,
            global_target: 0,
            global_in_use: 0,
        };
        manager.scan_service_data(&self.service_type, &mut tally)?;
        if tally.num_services == 0 {
            return Ok(());
        }

        let mut state = self.state.lock();
        let global_max = state.global_max;
        let maximum_target = (global_max - tally.global_target)
            .min(global_max - tally.global_in_use)
            .max(0);

        let mut fair_target = global_max / tally.num_services;
        let remainder = global_max % tally.num_services;
        if rand::thread_rng().gen_range(0..tally.num_services) < remainder {
            fair_target += 1;
        }

        let mut local_in_use = state.local_max - state.num_free;
        for connector in state.stack.iter_mut() {
            connector.poll()?;
            if connector.is_connected() {
                local_in_use += 1;
            }
        }

        let optimal_target = if state.local_max > local_in_use {
            state.local_max - 1
        } else {
            state.local_max + (global_max >> 2).max(1)
        };

        let target = maximum_target.min(fair_target).min(optimal_target);
        manager.update_service_data(
            &self.service_type,
            &self.service_name,
            Some(&pack(target, local_in_use)[..]),
        )?;

        if target == state.local_max {
            return Ok(());
        }
        tracing::debug!(
            service_type = %self.service_type,
            from = state.local_max,
            to = target,
            "Adjusting local pool maximum"
        );
        let handed_out = state.local_max - state.num_free;
        state.local_max = target;
        state.num_free = target - handed_out;
        self.changed.notify_all();
        Ok(())
    }

    /// Disconnect every idle instance.
    pub(crate) fn flush_unused(&self) -> PoolResult<()> {
        let drained: Vec<Box<dyn Connector>> = std::mem::take(&mut self.state.lock().stack);
        let mut first_error = None;
        for mut connector in drained {
            if let Err(err) = connector.disconnect() {
                tracing::warn!(service_type = %self.service_type, error = %err, "Failed to disconnect connector");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Flush, wake all waiters and end this process's service activity.
    pub(crate) fn release_all<M: LockManager + ?Sized>(&self, manager: &M) -> PoolResult<()> {
        self.flush_unused()?;
        {
            let mut state = self.state.lock();
            if !state.is_alive {
                return Ok(());
            }
            state.is_alive = false;
            self.changed.notify_all();
        }
        manager.end_service_activity(&self.service_type, &self.service_name)?;
        tracing::debug!(service_type = %self.service_type, "Closed connector pool");
        Ok(())
    }

    /// Disconnect idle instances beyond the free permits, disconnected ones first.
    fn trim_excess(state: &mut PoolState) -> PoolResult<()> {
        while !state.stack.is_empty() && state.stack.len() as i32 > state.num_free {
            let index = state
                .stack
                .iter()
                .position(|connector| !connector.is_connected())
                .unwrap_or(state.stack.len() - 1);
            let mut connector = state.stack.remove(index);
            connector.disconnect()?;
        }
        Ok(())
    }
}
