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

//! Connector pool behavior against an in-memory lock coordinator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use plexspaces_connector_pool::{
    ConfigParams, Connector, ConnectorPool, ConnectorRegistry, GrabRequest, PoolError, PoolResult,
    TARGET_CALC_LOCK_PREFIX,
};
use plexspaces_locks::{LockCoordinator, LockError, LockManager, ServiceRegistry};

const PREFIX: &str = "_TESTPOOL_";

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

struct TestConnector {
    config: Option<ConfigParams>,
    counters: Arc<Counters>,
}

impl Connector for TestConnector {
    fn class_name(&self) -> &str {
        "test"
    }

    fn connect(&mut self, config: &ConfigParams) -> PoolResult<()> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
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
        if self.config.take().is_some() {
            self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn registry(counters: &Arc<Counters>) -> Arc<ConnectorRegistry> {
    let registry = ConnectorRegistry::new();
    let counters = Arc::clone(counters);
    registry.register("test", move || {
        Box::new(TestConnector {
            config: None,
            counters: Arc::clone(&counters),
        }) as Box<dyn Connector>
    });
    Arc::new(registry)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (Arc<LockCoordinator>, Arc<Counters>, ConnectorPool) {
    init_tracing();
    let coordinator = Arc::new(LockCoordinator::new());
    let counters = Arc::new(Counters::default());
    let pool = ConnectorPool::new(PREFIX, Arc::clone(&coordinator), registry(&counters));
    (coordinator, counters, pool)
}

fn config(connection: &str) -> ConfigParams {
    ConfigParams::new().with_parameter("conn", connection)
}

fn request(key: &str, connection: &str, class_name: &str) -> GrabRequest {
    GrabRequest {
        ordering_key: key.to_string(),
        connection_name: connection.to_string(),
        class_name: class_name.to_string(),
        config: config(connection),
        max_pool_size: 4,
    }
}

#[test]
fn test_released_connector_is_reused() {
    let (_coordinator, counters, pool) = setup();
    let cfg = config("solr");

    let connector = pool.grab("solr", "test", &cfg, 4).unwrap();
    assert!(connector.is_connected());
    pool.release("solr", connector).unwrap();

    let stats = pool.pool_stats("solr").unwrap();
    assert_eq!(stats.local_max, 1);
    assert_eq!(stats.num_free, 1);
    assert_eq!(stats.idle, 1);

    let connector = pool.grab("solr", "test", &cfg, 4).unwrap();
    assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
    assert_eq!(connector.configuration(), Some(&cfg));
    pool.release("solr", connector).unwrap();
}

#[test]
fn test_mismatched_configuration_is_replaced() {
    let (_coordinator, counters, pool) = setup();

    let connector = pool.grab("solr", "test", &config("a"), 4).unwrap();
    pool.release("solr", connector).unwrap();

    let connector = pool.grab("solr", "test", &config("b"), 4).unwrap();
    assert_eq!(connector.configuration(), Some(&config("b")));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
    assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_class_is_rejected() {
    let (_coordinator, _counters, pool) = setup();
    let result = pool.grab("solr", "missing", &config("solr"), 4);
    assert!(matches!(result, Err(PoolError::ConnectorNotInstalled(name)) if name == "missing"));
    assert!(pool.pool_stats("solr").is_none());
}

#[test]
fn test_grab_waits_for_free_permit() {
    let (_coordinator, _counters, pool) = setup();
    let pool = Arc::new(pool);

    let held = pool.grab("solr", "test", &config("solr"), 4).unwrap();
    assert_eq!(pool.pool_stats("solr").unwrap().num_free, 0);

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let connector = pool.grab("solr", "test", &config("solr"), 4).unwrap();
            tx.send(()).unwrap();
            pool.release("solr", connector).unwrap();
        })
    };

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    pool.release("solr", held).unwrap();
    rx.recv_timeout(Duration::from_secs(30)).unwrap();
    waiter.join().unwrap();
}

#[test]
fn test_poll_grows_busy_pool() {
    let (_coordinator, _counters, pool) = setup();

    let first = pool.grab("solr", "test", &config("solr"), 4).unwrap();
    pool.poll_all_connectors(|_| true).unwrap();

    let stats = pool.pool_stats("solr").unwrap();
    assert_eq!(stats.local_max, 2);
    assert_eq!(stats.num_free, 1);

    let second = pool.grab("solr", "test", &config("solr"), 4).unwrap();
    pool.release_multiple(&["solr", "solr"], vec![first, second]).unwrap();
    assert_eq!(pool.pool_stats("solr").unwrap().idle, 2);
}

#[test]
fn test_processes_share_global_maximum() {
    let coordinator = Arc::new(LockCoordinator::new());
    let counters = Arc::new(Counters::default());
    let first = ConnectorPool::new(PREFIX, Arc::clone(&coordinator), registry(&counters));
    let second = ConnectorPool::new(PREFIX, Arc::clone(&coordinator), registry(&counters));

    let a = first.grab("solr", "test", &config("solr"), 2).unwrap();
    let b = second.grab("solr", "test", &config("solr"), 2).unwrap();
    first.poll_all_connectors(|_| true).unwrap();
    second.poll_all_connectors(|_| true).unwrap();

    let first_max = first.pool_stats("solr").unwrap().local_max;
    let second_max = second.pool_stats("solr").unwrap().local_max;
    assert_eq!(first_max, 1);
    assert_eq!(second_max, 1);

    let (service_type, _) = first.pool_service("solr").unwrap();
    let manager = coordinator.lock_manager();
    assert_eq!(manager.count_active_services(&service_type).unwrap(), 2);

    first.release("solr", a).unwrap();
    second.release("solr", b).unwrap();
}

#[test]
fn test_duplicate_ordering_key_grabs_nothing() {
    let (_coordinator, counters, pool) = setup();
    let requests = [request("k", "x", "test"), request("k", "y", "test")];

    let result = pool.grab_multiple(&requests);
    assert!(matches!(result, Err(PoolError::DuplicateOrderingKey(key)) if key == "k"));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_grab_multiple_returns_request_order() {
    let (_coordinator, _counters, pool) = setup();
    let requests = [request("b", "y", "test"), request("a", "x", "test")];

    let connectors = pool.grab_multiple(&requests).unwrap();
    assert_eq!(connectors.len(), 2);
    assert_eq!(connectors[0].configuration().and_then(|c| c.parameter("conn")), Some("y"));
    assert_eq!(connectors[1].configuration().and_then(|c| c.parameter("conn")), Some("x"));

    pool.release_multiple(&["y", "x"], connectors).unwrap();
}

#[test]
fn test_grab_multiple_failure_releases_grabbed() {
    let (_coordinator, _counters, pool) = setup();
    let requests = [request("a", "x", "test"), request("b", "y", "missing")];

    let result = pool.grab_multiple(&requests);
    assert!(matches!(result, Err(PoolError::ConnectorNotInstalled(_))));

    let stats = pool.pool_stats("x").unwrap();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.num_free, stats.local_max);
}

#[test]
fn test_invalid_connection_pool_is_closed_on_poll() {
    let (coordinator, counters, pool) = setup();
    let connector = pool.grab("x", "test", &config("x"), 4).unwrap();
    pool.release("x", connector).unwrap();
    let kept = pool.grab("y", "test", &config("y"), 4).unwrap();
    let (service_type, service_name) = pool.pool_service("x").unwrap();

    pool.poll_all_connectors(|name| name != "x").unwrap();

    assert!(pool.pool_stats("x").is_none());
    assert!(pool.pool_stats("y").is_some());
    assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);
    let manager = coordinator.lock_manager();
    assert!(!manager.check_service_active(&service_type, &service_name).unwrap());

    pool.release("y", kept).unwrap();
}

#[test]
fn test_close_all_connectors() {
    let (_coordinator, counters, pool) = setup();
    let held = pool.grab("x", "test", &config("x"), 4).unwrap();
    let idle = pool.grab("y", "test", &config("y"), 4).unwrap();
    pool.release("y", idle).unwrap();

    pool.close_all_connectors().unwrap();
    assert!(pool.pool_stats("x").is_none());
    assert!(pool.pool_stats("y").is_none());
    assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);

    pool.release("x", held).unwrap();
    assert_eq!(counters.disconnects.load(Ordering::SeqCst), 2);
}

#[test]
fn test_flush_unused_keeps_permits() {
    let (_coordinator, counters, pool) = setup();
    let connector = pool.grab("x", "test", &config("x"), 4).unwrap();
    pool.release("x", connector).unwrap();

    pool.flush_unused_connectors().unwrap();
    let stats = pool.pool_stats("x").unwrap();
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.num_free, 1);
    assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);

    pool.grab("x", "test", &config("x"), 4).unwrap();
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
}

#[test]
fn test_grab_under_callers_target_lock_fails_fast() {
    let (coordinator, _counters, pool) = setup();
    let target_lock = format!("{}{}{}", TARGET_CALC_LOCK_PREFIX, PREFIX, "solr");
    let manager = coordinator.lock_manager();
    manager.enter_read_lock(&target_lock).unwrap();

    let result = pool.grab("solr", "test", &config("solr"), 4);
    assert!(matches!(result, Err(PoolError::Lock(LockError::IllegalSequence(_)))));

    manager.leave_read_lock(&target_lock).unwrap();
    pool.poll_all_connectors(|_| true).unwrap();
    let connector = pool.grab("solr", "test", &config("solr"), 4).unwrap();
    pool.release("solr", connector).unwrap();
}
