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

//! Service registration and liveness protocol.
//!
//! ## Purpose
//! Lets cooperating processes register named instances of a service type,
//! publish per-instance data while live, and recover after instances that
//! died without ending their activity.
//!
//! ## Storage
//! Built entirely from the flag and data primitives of a [`LockManager`]; every
//! operation runs under a lock on `_SERVICELOCK_<type>`:
//! - `_SERVICELIST_<type>_<i>`: list of registered names, slots `0..n` with no gaps
//! - `_SERVICE_<type>_<name>`: registered flag
//! - `_ACTIVE_<type>_<name>`: active flag
//! - `_SERVICEDATA_<type>_<name>`: instance data, meaningful only while active
//! - `_SERVICECOUNTER_<type>`: counter for anonymous `_ANON_<n>` names (4 bytes, little endian)
//!
//! ## Lifecycle
//! unregistered → registered + active → registered (ended or crashed) → unregistered (cleaned up)

use crate::manager::LockManager;
use crate::{LockError, LockResult};

const SERVICE_TYPE_LOCK_PREFIX: &str = "_SERVICELOCK_";
const SERVICE_LIST_PREFIX: &str = "_SERVICELIST_";
const SERVICE_PREFIX: &str = "_SERVICE_";
const ACTIVE_PREFIX: &str = "_ACTIVE_";
const SERVICE_DATA_PREFIX: &str = "_SERVICEDATA_";
const ANONYMOUS_SERVICE_NAME_PREFIX: &str = "_ANON_";
const ANONYMOUS_SERVICE_TYPE_COUNTER: &str = "_SERVICECOUNTER_";

/// Cleanup hooks invoked while registering or recovering services.
pub trait ServiceCleanup {
    /// Clean up after one service instance that is no longer active.
    fn clean_up_service(&mut self, service_name: &str) -> LockResult<()>;

    /// Clean up after every instance of the service type.
    fn clean_up_all_services(&mut self) -> LockResult<()>;

    /// Initialize shared state for a cluster that has no live instances.
    fn cluster_init(&mut self) -> LockResult<()>;
}

/// Receives the data of each active service during a scan.
pub trait ServiceDataAcceptor {
    /// Return `true` to stop the scan.
    fn accept_service_data(&mut self, service_name: &str, service_data: Option<&[u8]>) -> LockResult<bool>;
}

impl<F> ServiceDataAcceptor for F
where
    F: FnMut(&str, Option<&[u8]>) -> LockResult<bool>,
{
    fn accept_service_data(&mut self, service_name: &str, service_data: Option<&[u8]>) -> LockResult<bool> {
        self(service_name, service_data)
    }
}

fn service_type_lock_name(service_type: &str) -> String {
    format!("{}{}", SERVICE_TYPE_LOCK_PREFIX, service_type)
}

fn service_list_entry(service_type: &str, index: usize) -> String {
    format!("{}{}_{}", SERVICE_LIST_PREFIX, service_type, index)
}

fn registered_flag_name(service_type: &str, service_name: &str) -> String {
    format!("{}{}_{}", SERVICE_PREFIX, service_type, service_name)
}

fn active_flag_name(service_type: &str, service_name: &str) -> String {
    format!("{}{}_{}", ACTIVE_PREFIX, service_type, service_name)
}

fn service_data_name(service_type: &str, service_name: &str) -> String {
    format!("{}{}_{}", SERVICE_DATA_PREFIX, service_type, service_name)
}

fn service_counter_name(service_type: &str) -> String {
    format!("{}{}", ANONYMOUS_SERVICE_TYPE_COUNTER, service_type)
}

fn read_service_name<M: LockManager + ?Sized>(manager: &M, resource_name: &str) -> LockResult<Option<String>> {
    match manager.read_data(resource_name)? {
        Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|err| {
            LockError::SerializationError(format!(
                "Service list entry '{}' is not UTF-8: {}",
                resource_name, err
            ))
        }),
        None => Ok(None),
    }
}

fn write_service_name<M: LockManager + ?Sized>(
    manager: &M,
    resource_name: &str,
    service_name: Option<&str>,
) -> LockResult<()> {
    manager.write_data(resource_name, service_name.map(str::as_bytes))
}

fn read_service_counter<M: LockManager + ?Sized>(manager: &M, counter_name: &str) -> LockResult<u32> {
    let counter = manager
        .read_data(counter_name)?
        .and_then(|bytes| <[u8; 4]>::try_from(bytes.as_slice()).ok())
        .map(u32::from_le_bytes)
        .unwrap_or(0);
    Ok(counter)
}

fn construct_unique_service_name<M: LockManager + ?Sized>(manager: &M, service_type: &str) -> LockResult<String> {
    let counter_name = service_counter_name(service_type);
    let service_uid = read_service_counter(manager, &counter_name)?;
    manager.write_data(&counter_name, Some(&service_uid.wrapping_add(1).to_le_bytes()))?;
    Ok(format!("{}{}", ANONYMOUS_SERVICE_NAME_PREFIX, service_uid))
}

/// Registered names in list order.
fn list_services<M: LockManager + ?Sized>(manager: &M, service_type: &str) -> LockResult<Vec<String>> {
    let mut names = Vec::new();
    while let Some(name) = read_service_name(manager, &service_list_entry(service_type, names.len()))? {
        names.push(name);
    }
    Ok(names)
}

fn with_lock<M, T, F>(manager: &M, service_type: &str, exclusive: bool, body: F) -> LockResult<T>
where
    M: LockManager + ?Sized,
    F: FnOnce() -> LockResult<T>,
{
    let lock_name = service_type_lock_name(service_type);
    if exclusive {
        manager.enter_write_lock(&lock_name)?;
    } else {
        manager.enter_read_lock(&lock_name)?;
    }
    let result = body();
    let released = if exclusive {
        manager.leave_write_lock(&lock_name)
    } else {
        manager.leave_read_lock(&lock_name)
    };
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            tracing::warn!(service_type, error = %release_err, "Failed to release service type lock");
            Err(err)
        }
    }
}

/// Service registry operations, available on every [`LockManager`].
///
/// ## Examples
/// ```rust
/// use std::sync::Arc;
/// use plexspaces_locks::{LockCoordinator, ServiceRegistry};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let coordinator = Arc::new(LockCoordinator::new());
/// let manager = coordinator.lock_manager();
///
/// let name = manager.register_service_begin_service_activity_with_data(
///     "agents",
///     Some("agent-1"),
///     Some(b"starting"),
///     None,
/// )?;
/// manager.update_service_data("agents", &name, Some(b"running"))?;
/// assert_eq!(manager.count_active_services("agents")?, 1);
/// manager.end_service_activity("agents", &name)?;
/// # Ok(())
/// # }
/// ```
pub trait ServiceRegistry: LockManager {
    /// Register a service (if not yet registered) and make it active, with no initial data.
    fn register_service_begin_service_activity(
        &self,
        service_type: &str,
        service_name: Option<&str>,
        cleanup: Option<&mut dyn ServiceCleanup>,
    ) -> LockResult<String> {
        self.register_service_begin_service_activity_with_data(service_type, service_name, None, cleanup)
    }

    /// Register a service (if not yet registered) and make it active.
    ///
    /// A `None` name gets a generated `_ANON_<n>` name. Fails with
    /// [`LockError::ServiceAlreadyActive`] if the instance is already active.
    /// When `cleanup` is given, it is called before registering: for an empty
    /// list every service is cleaned up and the cluster initialized; for a
    /// registered name while other instances are active only this instance is
    /// cleaned up; when no other instance is active every service is cleaned
    /// up, the cluster initialized and the whole list unregistered.
    ///
    /// Returns the service name.
    fn register_service_begin_service_activity_with_data(
        &self,
        service_type: &str,
        service_name: Option<&str>,
        initial_data: Option<&[u8]>,
        cleanup: Option<&mut dyn ServiceCleanup>,
    ) -> LockResult<String> {
        with_lock(self, service_type, true, || {
            let service_name = match service_name {
                Some(name) => name.to_string(),
                None => construct_unique_service_name(self, service_type)?,
            };

            let active_flag = active_flag_name(service_type, &service_name);
            if self.check_global_flag(&active_flag)? {
                return Err(LockError::ServiceAlreadyActive {
                    service_type: service_type.to_string(),
                    service_name,
                });
            }

            let registered = list_services(self, service_type)?;
            let mut found_service = false;
            let mut found_active_service = false;
            for name in &registered {
                if *name == service_name {
                    found_service = true;
                } else if self.check_global_flag(&active_flag_name(service_type, name))? {
                    found_active_service = true;
                }
            }

            let mut unregister_all = false;
            if let Some(cleanup) = cleanup {
                if registered.is_empty() {
                    cleanup.clean_up_all_services()?;
                    cleanup.cluster_init()?;
                } else if found_service && found_active_service {
                    cleanup.clean_up_service(&service_name)?;
                } else if !found_active_service {
                    cleanup.clean_up_all_services()?;
                    cleanup.cluster_init()?;
                    unregister_all = true;
                }
            }

            let mut next_slot = registered.len();
            if unregister_all {
                for (index, name) in registered.iter().enumerate().rev() {
                    self.clear_global_flag(&registered_flag_name(service_type, name))?;
                    write_service_name(self, &service_list_entry(service_type, index), None)?;
                }
                found_service = false;
                next_slot = 0;
            }

            if !found_service {
                let entry = service_list_entry(service_type, next_slot);
                write_service_name(self, &entry, Some(&service_name))?;
                if let Err(err) = self.set_global_flag(&registered_flag_name(service_type, &service_name)) {
                    write_service_name(self, &entry, None)?;
                    return Err(err);
                }
            }

            self.set_global_flag(&active_flag)?;
            self.write_data(&service_data_name(service_type, &service_name), initial_data)?;
            tracing::info!(service_type, service_name = %service_name, "Service activity started");
            Ok(service_name)
        })
    }

    /// Replace the data of an active service.
    fn update_service_data(
        &self,
        service_type: &str,
        service_name: &str,
        service_data: Option<&[u8]>,
    ) -> LockResult<()> {
        with_lock(self, service_type, true, || {
            if !self.check_global_flag(&active_flag_name(service_type, service_name))? {
                return Err(LockError::ServiceNotActive {
                    service_type: service_type.to_string(),
                    service_name: service_name.to_string(),
                });
            }
            self.write_data(&service_data_name(service_type, service_name), service_data)
        })
    }

    /// Data of a service: `None` if inactive, empty if active without data.
    fn retrieve_service_data(&self, service_type: &str, service_name: &str) -> LockResult<Option<Vec<u8>>> {
        with_lock(self, service_type, false, || {
            if !self.check_global_flag(&active_flag_name(service_type, service_name))? {
                return Ok(None);
            }
            let data = self.read_data(&service_data_name(service_type, service_name))?;
            Ok(Some(data.unwrap_or_default()))
        })
    }

    /// Feed the data of every active service, in list order, to `acceptor`.
    fn scan_service_data(&self, service_type: &str, acceptor: &mut dyn ServiceDataAcceptor) -> LockResult<()> {
        with_lock(self, service_type, false, || {
            for name in list_services(self, service_type)? {
                if !self.check_global_flag(&active_flag_name(service_type, &name))? {
                    continue;
                }
                let data = self.read_data(&service_data_name(service_type, &name))?;
                if acceptor.accept_service_data(&name, data.as_deref())? {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Number of active services of a type.
    fn count_active_services(&self, service_type: &str) -> LockResult<usize> {
        with_lock(self, service_type, false, || {
            let mut count = 0;
            for name in list_services(self, service_type)? {
                if self.check_global_flag(&active_flag_name(service_type, &name))? {
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    /// Clean up after the first registered but inactive service and unregister it.
    ///
    /// Returns `true` if there was nothing to clean up. Call repeatedly until it does.
    fn cleanup_inactive_service(&self, service_type: &str, cleanup: &mut dyn ServiceCleanup) -> LockResult<bool> {
        with_lock(self, service_type, true, || {
            let registered = list_services(self, service_type)?;
            let mut inactive = None;
            for (index, name) in registered.iter().enumerate() {
                if !self.check_global_flag(&active_flag_name(service_type, name))? {
                    inactive = Some(index);
                    break;
                }
            }
            let Some(index) = inactive else {
                return Ok(true);
            };

            let service_name = &registered[index];
            tracing::info!(service_type, service_name = %service_name, "Cleaning up inactive service");
            cleanup.clean_up_service(service_name)?;

            self.clear_global_flag(&registered_flag_name(service_type, service_name))?;
            let last = registered.len() - 1;
            if last != index {
                write_service_name(self, &service_list_entry(service_type, index), Some(&registered[last]))?;
            }
            write_service_name(self, &service_list_entry(service_type, last), None)?;
            Ok(false)
        })
    }

    /// End the activity of a service; it stays registered but inactive.
    fn end_service_activity(&self, service_type: &str, service_name: &str) -> LockResult<()> {
        with_lock(self, service_type, true, || {
            let active_flag = active_flag_name(service_type, service_name);
            if !self.check_global_flag(&active_flag)? {
                return Err(LockError::ServiceNotActive {
                    service_type: service_type.to_string(),
                    service_name: service_name.to_string(),
                });
            }
            self.write_data(&service_data_name(service_type, service_name), None)?;
            self.clear_global_flag(&active_flag)?;
            tracing::info!(service_type, service_name, "Service activity ended");
            Ok(())
        })
    }

    /// Whether a service is currently active.
    fn check_service_active(&self, service_type: &str, service_name: &str) -> LockResult<bool> {
        with_lock(self, service_type, false, || {
            self.check_global_flag(&active_flag_name(service_type, service_name))
        })
    }

    /// Whether a service is registered (active or not).
    fn check_service_registered(&self, service_type: &str, service_name: &str) -> LockResult<bool> {
        with_lock(self, service_type, false, || {
            self.check_global_flag(&registered_flag_name(service_type, service_name))
        })
    }

    /// Registered service names in list order.
    fn registered_services(&self, service_type: &str) -> LockResult<Vec<String>> {
        with_lock(self, service_type, false, || list_services(self, service_type))
    }
}

impl<M: LockManager + ?Sized> ServiceRegistry for M {}
