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

//! Connector abstraction and string-keyed factory registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{PoolError, PoolResult};

/// Connection parameters. Two connectors are interchangeable only if their
/// class and parameters are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigParams {
    parameters: BTreeMap<String, String>,
}

impl ConfigParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(name, value);
        self
    }

    /// Set a parameter.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(name.into(), value.into());
    }

    /// Read a parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

/// A pooled connection to an external system.
pub trait Connector: Send {
    /// Registered class name of this implementation.
    fn class_name(&self) -> &str;

    /// Establish the connection.
    fn connect(&mut self, config: &ConfigParams) -> PoolResult<()>;

    /// Parameters passed to the last `connect`.
    fn configuration(&self) -> Option<&ConfigParams>;

    /// Periodic housekeeping while idle in the pool.
    fn poll(&mut self) -> PoolResult<()>;

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;

    /// Close the connection.
    fn disconnect(&mut self) -> PoolResult<()>;
}

type ConnectorFactory = Arc<dyn Fn() -> Box<dyn Connector> + Send + Sync>;

/// Maps connector class names to factories.
#[derive(Default)]
pub struct ConnectorRegistry {
    factories: RwLock<HashMap<String, ConnectorFactory>>,
}

impl ConnectorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `class_name`.
    pub fn register<F>(&self, class_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Connector> + Send + Sync + 'static,
    {
        let class_name = class_name.into();
        tracing::debug!(class_name = %class_name, "Registering connector class");
        self.factories.write().insert(class_name, Arc::new(factory));
    }

    /// Remove the factory for `class_name`.
    pub fn unregister(&self, class_name: &str) -> bool {
        self.factories.write().remove(class_name).is_some()
    }

    /// Whether a factory exists for `class_name`.
    pub fn is_installed(&self, class_name: &str) -> bool {
        self.factories.read().contains_key(class_name)
    }

    /// New, unconnected instance of `class_name`.
    pub fn create(&self, class_name: &str) -> PoolResult<Box<dyn Connector>> {
        let factory = self
            .factories
            .read()
            .get(class_name)
            .cloned()
            .ok_or_else(|| PoolError::ConnectorNotInstalled(class_name.to_string()))?;
        Ok(factory())
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("ConnectorRegistry").field("classes", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Null {
        config: Option<ConfigParams>,
    }

    impl Connector for Null {
        fn class_name(&self) -> &str {
            "null"
        }
        fn connect(&mut self, config: &ConfigParams) -> PoolResult<()> {
            self.config = Some(config.clone());
            Ok(())
        }
        fn configuration(&self) -> Option<&ConfigParams> {
            self.config.as_ref()
        }
        fn poll(&mut self) -> PoolResult<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            self.config.is_some()
        }
        fn disconnect(&mut self) -> PoolResult<()> {
            self.config = None;
            Ok(())
        }
    }

    #[test]
    fn test_config_params_equality() {
        let a = ConfigParams::new().with_parameter("host", "h1").with_parameter("port", "1");
        let b = ConfigParams::new().with_parameter("port", "1").with_parameter("host", "h1");
        assert_eq!(a, b);
        assert_eq!(a.parameter("host"), Some("h1"));
        assert_ne!(a, ConfigParams::new().with_parameter("host", "h2"));
    }

    #[test]
    fn test_registry_creates_registered_classes_only() {
        let registry = ConnectorRegistry::new();
        registry.register("null", || Box::new(Null { config: None }) as Box<dyn Connector>);

        assert!(registry.is_installed("null"));
        let connector = registry.create("null").unwrap();
        assert_eq!(connector.class_name(), "null");
        assert!(!connector.is_connected());

        assert!(matches!(
            registry.create("missing"),
            Err(PoolError::ConnectorNotInstalled(_))
        ));
        assert!(registry.unregister("null"));
        assert!(!registry.is_installed("null"));
    }
}
