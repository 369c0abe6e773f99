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

//! # PlexSpaces Connector Pool
//!
//! ## Purpose
//! Pools connections to external systems (repositories, output targets,
//! authorities) so that the total number of live instances across every
//! process in a cluster stays under a per-connection maximum.
//!
//! ## Architecture Context
//! Built on [`plexspaces_locks`]:
//! - **Service registry**: every process registers one anonymous service per
//!   connection under `<prefix><connection>` and publishes its current
//!   target and in-use counts as service data
//! - **Write lock**: `_POOLTARGET_<prefix><connection>` serializes target
//!   recalculation across the cluster
//!
//! ```text
//! grab ──► ConnectorPool ──► Pool(connection) ──► stack of idle connectors
//!                                  │
//!                     poll_all ────┴──► scan peers' (target, in_use)
//!                                      └► publish own (target, in_use)
//! ```
//!
//! ## Design Decisions
//! - **Permits, not instances**: `num_free` counts permits; a permit may be
//!   satisfied by an idle instance or by creating a new one
//! - **Gradual rebalancing**: each poll moves the local maximum by at most a
//!   quarter of the global maximum, bounded by a fair share and by what peers
//!   have not already claimed
//! - **Interchangeability**: an idle instance is reused only if its class and
//!   configuration match the request exactly
//!
//! ## Examples
//! ```rust,no_run
//! use std::sync::Arc;
//! use plexspaces_connector_pool::{ConfigParams, ConnectorPool, ConnectorRegistry};
//! use plexspaces_locks::LockCoordinator;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ConnectorRegistry::new());
//! let pool = ConnectorPool::new("_REPOSITORYCONNECTORPOOL_", Arc::new(LockCoordinator::new()), registry);
//!
//! let config = ConfigParams::new().with_parameter("url", "http://repo");
//! let connector = pool.grab("repo", "web", &config, 10)?;
//! pool.release("repo", connector)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod connector;
mod connector_pool;
mod error;
mod pool;

pub use connector::{ConfigParams, Connector, ConnectorRegistry};
pub use connector_pool::{ConnectorPool, GrabRequest};
pub use error::{PoolError, PoolResult};
pub use pool::{PoolStats, TARGET_CALC_LOCK_PREFIX};
