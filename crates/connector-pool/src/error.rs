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

//! Error types for connector pools.

use plexspaces_locks::LockError;
use thiserror::Error;

/// Result type for connector pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur while pooling connectors.
#[derive(Error, Debug)]
pub enum PoolError {
    /// Two grab requests used the same ordering key
    #[error("Found duplicate ordering key: {0}")]
    DuplicateOrderingKey(String),

    /// No factory is registered for the connector class
    #[error("Connector class not installed: {0}")]
    ConnectorNotInstalled(String),

    /// A connector failed to connect, poll or disconnect
    #[error("Connector error: {0}")]
    ConnectorError(String),

    /// Lock manager or service registry failure
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
}
