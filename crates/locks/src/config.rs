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

//! Configuration support for lock coordinators.
//!
//! ## Purpose
//! Selects the shared store and cross-process lock backend, either from
//! environment variables or from a TOML document.
//!
//! ## Environment Variables
//! - `PLEXSPACES_LOCK_BACKEND`: Backend type (default: "in-memory")
//!   - "in-memory" | "memory" → `MemoryStore` + `ProcessLocalBackend`
//!   - "file" → `FileStore` + `FileLockBackend` (requires `file-backend` feature)
//! - `PLEXSPACES_LOCK_SYNC_DIR`: Synchronization directory shared by all
//!   cooperating processes (required for "file")
//! - `PLEXSPACES_LOCK_POLL_INTERVAL_MS`: Back-off between admission re-checks (default: 10)
//!
//! ## TOML
//! ```toml
//! poll_interval_ms = 20
//!
//! [backend]
//! type = "file"
//! sync_directory = "/var/lib/plexspaces/sync"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinator::LockCoordinator;
use crate::{LockError, LockResult};

const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Backend type configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackendType {
    /// Single process, in-memory flags and data (default)
    #[default]
    InMemory,
    /// Processes sharing a synchronization directory
    File {
        /// Directory shared by all cooperating processes
        sync_directory: PathBuf,
    },
}

/// Lock coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockManagerConfig {
    /// Backend type
    pub backend: BackendType,
    /// Back-off between admission re-checks and backend retries, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::InMemory,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl LockManagerConfig {
    /// Create configuration with explicit backend and default poll interval.
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See module documentation for the variables read.
    pub fn from_env() -> LockResult<Self> {
        let backend_str = std::env::var("PLEXSPACES_LOCK_BACKEND")
            .unwrap_or_else(|_| "in-memory".to_string())
            .to_lowercase();

        let backend = match backend_str.as_str() {
            "in-memory" | "memory" => BackendType::InMemory,
            "file" => {
                let sync_directory = std::env::var("PLEXSPACES_LOCK_SYNC_DIR").map_err(|_| {
                    LockError::ConfigError("PLEXSPACES_LOCK_SYNC_DIR not set".to_string())
                })?;
                BackendType::File {
                    sync_directory: PathBuf::from(sync_directory),
                }
            }
            other => {
                return Err(LockError::ConfigError(format!(
                    "Unknown lock backend type: {}. Valid options: in-memory, file",
                    other
                )));
            }
        };

        let poll_interval_ms = match std::env::var("PLEXSPACES_LOCK_POLL_INTERVAL_MS") {
            Ok(value) => value.parse().map_err(|_| {
                LockError::ConfigError(format!(
                    "PLEXSPACES_LOCK_POLL_INTERVAL_MS is not a number: {}",
                    value
                ))
            })?,
            Err(_) => DEFAULT_POLL_INTERVAL_MS,
        };

        let config = Self {
            backend,
            poll_interval_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml_str(text: &str) -> LockResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> LockResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from JSON.
    pub fn from_json_str(text: &str) -> LockResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no coordinator can run with.
    pub fn validate(&self) -> LockResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(LockError::ConfigError(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if let BackendType::File { sync_directory } = &self.backend {
            if sync_directory.as_os_str().is_empty() {
                return Err(LockError::ConfigError(
                    "sync_directory must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Create a coordinator from environment configuration.
pub fn create_coordinator_from_env() -> LockResult<Arc<LockCoordinator>> {
    let config = LockManagerConfig::from_env()?;
    create_coordinator_from_config(&config)
}

/// Create a coordinator from explicit configuration.
///
/// ## Examples
/// ```rust
/// use plexspaces_locks::{create_coordinator_from_config, LockManager, LockManagerConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let coordinator = create_coordinator_from_config(&LockManagerConfig::default())?;
/// let manager = coordinator.lock_manager();
/// manager.enter_write_lock("jobs")?;
/// manager.leave_write_lock("jobs")?;
/// # Ok(())
/// # }
/// ```
pub fn create_coordinator_from_config(config: &LockManagerConfig) -> LockResult<Arc<LockCoordinator>> {
    config.validate()?;
    match &config.backend {
        BackendType::InMemory => Ok(Arc::new(LockCoordinator::with_options(
            Arc::new(crate::store::MemoryStore::new()),
            Arc::new(crate::backend::ProcessLocalBackend),
            config.poll_interval(),
        ))),

        #[cfg(feature = "file-backend")]
        BackendType::File { sync_directory } => {
            std::fs::create_dir_all(sync_directory)?;
            tracing::info!(sync_directory = %sync_directory.display(), "Using file lock backend");
            Ok(Arc::new(LockCoordinator::with_options(
                Arc::new(crate::file::FileStore::new(sync_directory)),
                Arc::new(crate::file::FileLockBackend::new(sync_directory)),
                config.poll_interval(),
            )))
        }

        #[cfg(not(feature = "file-backend"))]
        BackendType::File { .. } => Err(LockError::ConfigError(
            "File backend requires 'file-backend' feature".to_string(),
        )),
    }
}
