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

//! Process-wide collection of connector pools, one per connection name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use plexspaces_locks::LockCoordinator;

use crate::pool::{Pool, PoolStats};
use crate::{ConfigParams, Connector, ConnectorRegistry, PoolError, PoolResult};

/// One entry of a [`ConnectorPool::grab_multiple`] call.
#[derive(Debug, Clone)]
pub struct GrabRequest {
    /// Global acquisition order; must be unique within a call
    pub ordering_key: String,
    /// Pool to draw from
    pub connection_name: String,
    /// Connector class to instantiate
    pub class_name: String,
    /// Parameters the instance must be connected with
    pub config: ConfigParams,
    /// Cluster-wide maximum for the pool
    pub max_pool_size: i32,
}

/// Hands out connector instances, keeping each connection's cluster-wide
/// instance count under its maximum.
pub struct ConnectorPool {
    service_type_prefix: String,
    coordinator: Arc<LockCoordinator>,
    registry: Arc<ConnectorRegistry>,
    pools: Mutex<HashMap<String, Arc<Pool>>>,
}

impl ConnectorPool {
    /// Create a pool set whose services register as `<prefix><connection>`.
    pub fn new(
        service_type_prefix: impl Into<String>,
        coordinator: Arc<LockCoordinator>,
        registry: Arc<ConnectorRegistry>,
    ) -> Self {
        Self {
            service_type_prefix: service_type_prefix.into(),
            coordinator,
            registry,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Connector factories in use.
    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    /// Counters of the pool for `connection_name`, if one exists.
    pub fn pool_stats(&self, connection_name: &str) -> Option<PoolStats> {
        self.pools.lock().get(connection_name).map(|pool| pool.stats())
    }

    /// Service `(type, name)` this process registered for `connection_name`.
    pub fn pool_service(&self, connection_name: &str) -> Option<(String, String)> {
        self.pools
            .lock()
            .get(connection_name)
            .map(|pool| (pool.service_type().to_string(), pool.service_name().to_string()))
    }

    /// Get a connected instance, blocking until this process has a free permit.
    pub fn grab(
        &self,
        connection_name: &str,
        class_name: &str,
        config: &ConfigParams,
        max_pool_size: i32,
    ) -> PoolResult<Box<dyn Connector>> {
        if !self.registry.is_installed(class_name) {
            return Err(PoolError::ConnectorNotInstalled(class_name.to_string()));
        }
        loop {
            let pool = self.pool_for(connection_name, max_pool_size)?;
            if let Some(connector) = pool.get_connector(&self.registry, class_name, config)? {
                tracing::trace!(connection_name = %connection_name, class_name = %class_name, "Grabbed connector");
                return Ok(connector);
            }
        }
    }

    /// Grab several instances in ordering-key order.
    ///
    /// Results come back in request order. On failure everything grabbed so
    /// far is released and the error returned.
    pub fn grab_multiple(&self, requests: &[GrabRequest]) -> PoolResult<Vec<Box<dyn Connector>>> {
        let mut seen = HashSet::new();
        for request in requests {
            if !seen.insert(request.ordering_key.as_str()) {
                return Err(PoolError::DuplicateOrderingKey(request.ordering_key.clone()));
            }
        }

        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by(|a, b| requests[*a].ordering_key.cmp(&requests[*b].ordering_key));

        let mut grabbed: Vec<(usize, Box<dyn Connector>)> = Vec::with_capacity(requests.len());
        for &index in &order {
            let request = &requests[index];
            match self.grab(
                &request.connection_name,
                &request.class_name,
                &request.config,
                request.max_pool_size,
            ) {
                Ok(connector) => grabbed.push((index, connector)),
                Err(err) => {
                    while let Some((index, connector)) = grabbed.pop() {
                        if let Err(release_err) = self.release(&requests[index].connection_name, connector) {
                            tracing::warn!(
                                connection_name = %requests[index].connection_name,
                                error = %release_err,
                                "Failed to release connector while unwinding"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        grabbed.sort_by_key(|(index, _)| *index);
        Ok(grabbed.into_iter().map(|(_, connector)| connector).collect())
    }

    /// Return an instance to its pool, or disconnect it if the pool is gone.
    pub fn release(&self, connection_name: &str, mut connector: Box<dyn Connector>) -> PoolResult<()> {
        let pool = self.pools.lock().get(connection_name).cloned();
        match pool {
            Some(pool) => pool.release_connector(connector),
            None => connector.disconnect(),
        }
    }

    /// Release every instance, reporting the first failure.
    pub fn release_multiple(
        &self,
        connection_names: &[&str],
        connectors: Vec<Box<dyn Connector>>,
    ) -> PoolResult<()> {
        let mut first_error = None;
        for (connection_name, connector) in connection_names.iter().zip(connectors) {
            if let Err(err) = self.release(connection_name, connector) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Rebalance every pool; pools whose connection is no longer valid are closed.
    pub fn poll_all_connectors<F>(&self, is_connection_valid: F) -> PoolResult<()>
    where
        F: Fn(&str) -> bool,
    {
        let manager = self.coordinator.lock_manager();
        let mut pools = self.pools.lock();
        let names: Vec<String> = pools.keys().cloned().collect();
        for name in names {
            let Some(pool) = pools.get(&name).cloned() else {
                continue;
            };
            if is_connection_valid(&name) {
                pool.poll_all(&manager)?;
            } else {
                tracing::info!(connection_name = %name, "Closing pool for removed connection");
                pool.release_all(&manager)?;
                pools.remove(&name);
            }
        }
        Ok(())
    }

    /// Disconnect idle instances in every pool.
    pub fn flush_unused_connectors(&self) -> PoolResult<()> {
        let pools: Vec<Arc<Pool>> = self.pools.lock().values().cloned().collect();
        for pool in pools {
            pool.flush_unused()?;
        }
        Ok(())
    }

    /// Shut down every pool and end its service activity.
    pub fn close_all_connectors(&self) -> PoolResult<()> {
        let manager = self.coordinator.lock_manager();
        let mut pools = self.pools.lock();
        for (name, pool) in pools.drain() {
            tracing::debug!(connection_name = %name, "Closing connector pool");
            pool.release_all(&manager)?;
        }
        Ok(())
    }

    fn pool_for(&self, connection_name: &str, max_pool_size: i32) -> PoolResult<Arc<Pool>> {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(connection_name) {
            pool.update_maximum_pool_size(max_pool_size);
            return Ok(Arc::clone(pool));
        }
        let manager = self.coordinator.lock_manager();
        let pool = Arc::new(Pool::new(
            &manager,
            &self.service_type_prefix,
            connection_name,
            max_pool_size,
        )?);
        pools.insert(connection_name.to_string(), Arc::clone(&pool));
        pool.poll_all(&manager)?;
        Ok(pool)
    }
}

impl std::fmt::Debug for ConnectorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.pools.lock().keys().cloned().collect();
        names.sort();
        f.debug_struct("ConnectorPool")
            .field("service_type_prefix", &self.service_type_prefix)
            .field("pools", &names)
            .finish()
    }
}
