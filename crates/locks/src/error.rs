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

//! Error types for lock, critical section and service registry operations.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// The calling thread attempted an invalid escalation or release order
    #[error("Illegal lock sequence: {0}")]
    IllegalSequence(String),

    /// A NoWait acquisition would have blocked
    #[error("Lock contention: {0}")]
    LockContention(String),

    /// The calling thread was interrupted while waiting
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Service instance is already active
    #[error("Service '{service_name}' of type '{service_type}' is already active")]
    ServiceAlreadyActive {
        service_type: String,
        service_name: String,
    },

    /// Service instance is not active
    #[error("Service '{service_name}' of type '{service_type}' is not active")]
    ServiceNotActive {
        service_type: String,
        service_name: String,
    },

    /// Backend error (shared store, sync directory, etc.)
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

impl LockError {
    /// True if this error reports an interrupted wait.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, LockError::Interrupted(_))
    }

    /// True if this error reports NoWait contention.
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::LockContention(_))
    }
}

impl From<serde_json::Error> for LockError {
    fn from(err: serde_json::Error) -> Self {
        LockError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for LockError {
    fn from(err: toml::de::Error) -> Self {
        LockError::ConfigError(err.to_string())
    }
}
