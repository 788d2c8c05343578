//! The coordination-store capability seam.
//!
//! The real backend (ZooKeeper, etcd, ...) is an external collaborator out
//! of scope for this crate, exactly as the template engine is for the proxy
//! sink: callers depend on this trait, never on a concrete client. An
//! in-memory implementation is provided for tests and as a development
//! stand-in.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::errors::GeneratorResult;

/// One change to a watched node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Changed,
    Deleted,
}

/// Coordination-store connection health, watched by the annotation
/// service's watch driver; a `Disconnected` event is fatal to that module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Idempotently create `path` (and, implicitly, any ancestor the
    /// implementation requires) if it does not already exist.
    async fn ensure_path(&self, path: &str) -> GeneratorResult<()>;

    async fn get(&self, path: &str) -> GeneratorResult<Option<String>>;

    async fn set(&self, path: &str, value: &str) -> GeneratorResult<()>;

    /// Delete `path`. Upstream coordination stores use a version of `-1`
    /// to mean "match any version"; this trait has no versioning concept
    /// of its own, so unconditional delete already implements that.
    async fn delete(&self, path: &str) -> GeneratorResult<()>;

    async fn children(&self, path: &str) -> GeneratorResult<Vec<String>>;

    /// Subscribe to changes in the child set of `path`. Each message is the
    /// full, current child set at the time of the change.
    async fn watch_children(&self, path: &str) -> GeneratorResult<mpsc::Receiver<Vec<String>>>;

    /// Subscribe to changes to (or deletion of) a single node.
    async fn watch_node(&self, path: &str) -> GeneratorResult<mpsc::Receiver<NodeEvent>>;

    /// Subscribe to connection state transitions.
    async fn watch_connection(&self) -> GeneratorResult<broadcast::Receiver<ConnectionEvent>>;
}

/// In-memory reference implementation. Single-process only; exists so the
/// annotation module, its HTTP API, and its watch driver can be exercised
/// in tests without a real coordination store.
#[derive(Default)]
pub struct InMemoryStore {
    nodes: Mutex<HashMap<String, String>>,
    children_watchers: Mutex<HashMap<String, Vec<mpsc::Sender<Vec<String>>>>>,
    node_watchers: Mutex<HashMap<String, Vec<mpsc::Sender<NodeEvent>>>>,
    connection_tx: broadcast::Sender<ConnectionEvent>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (connection_tx, _rx) = broadcast::channel(16);
        Self {
            nodes: Mutex::new(HashMap::new()),
            children_watchers: Mutex::new(HashMap::new()),
            node_watchers: Mutex::new(HashMap::new()),
            connection_tx,
        }
    }

    fn parent_of(path: &str) -> String {
        match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        }
    }

    fn basename_of(path: &str) -> String {
        match path.rfind('/') {
            Some(idx) => path[idx + 1..].to_string(),
            None => path.to_string(),
        }
    }

    fn children_of_locked(nodes: &HashMap<String, String>, parent: &str) -> Vec<String> {
        let prefix = if parent.ends_with('/') {
            parent.to_string()
        } else {
            format!("{parent}/")
        };
        let mut children: Vec<String> = nodes
            .keys()
            .filter_map(|k| {
                k.strip_prefix(&prefix)
                    .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                    .map(str::to_string)
            })
            .collect();
        children.sort();
        children
    }

    fn notify_children(&self, parent: &str) {
        let nodes = self.nodes.lock().unwrap();
        let current = Self::children_of_locked(&nodes, parent);
        drop(nodes);
        let watchers = self.children_watchers.lock().unwrap();
        if let Some(senders) = watchers.get(parent) {
            for sender in senders {
                let _ = sender.try_send(current.clone());
            }
        }
    }

    fn notify_node(&self, path: &str, event: NodeEvent) {
        let watchers = self.node_watchers.lock().unwrap();
        if let Some(senders) = watchers.get(path) {
            for sender in senders {
                let _ = sender.try_send(event.clone());
            }
        }
    }

    /// Simulate a coordination-store disconnection, for tests exercising
    /// the fatal-on-disconnect path in the watch driver.
    pub fn simulate_disconnect(&self) {
        let _ = self.connection_tx.send(ConnectionEvent::Disconnected);
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn ensure_path(&self, path: &str) -> GeneratorResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.entry(path.to_string()).or_insert_with(String::new);
        Ok(())
    }

    async fn get(&self, path: &str) -> GeneratorResult<Option<String>> {
        let nodes = self.nodes.lock().unwrap();
        Ok(nodes.get(path).cloned())
    }

    async fn set(&self, path: &str, value: &str) -> GeneratorResult<()> {
        {
            let mut nodes = self.nodes.lock().unwrap();
            nodes.insert(path.to_string(), value.to_string());
        }
        self.notify_children(&Self::parent_of(path));
        self.notify_node(path, NodeEvent::Changed);
        Ok(())
    }

    async fn delete(&self, path: &str) -> GeneratorResult<()> {
        {
            let mut nodes = self.nodes.lock().unwrap();
            nodes.remove(path);
        }
        self.notify_children(&Self::parent_of(path));
        self.notify_node(path, NodeEvent::Deleted);
        Ok(())
    }

    async fn children(&self, path: &str) -> GeneratorResult<Vec<String>> {
        let nodes = self.nodes.lock().unwrap();
        Ok(Self::children_of_locked(&nodes, path))
    }

    async fn watch_children(&self, path: &str) -> GeneratorResult<mpsc::Receiver<Vec<String>>> {
        let (tx, rx) = mpsc::channel(32);
        let current = {
            let nodes = self.nodes.lock().unwrap();
            Self::children_of_locked(&nodes, path)
        };
        let _ = tx.try_send(current);
        self.children_watchers
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn watch_node(&self, path: &str) -> GeneratorResult<mpsc::Receiver<NodeEvent>> {
        let (tx, rx) = mpsc::channel(32);
        self.node_watchers
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn watch_connection(&self) -> GeneratorResult<broadcast::Receiver<ConnectionEvent>> {
        Ok(self.connection_tx.subscribe())
    }
}
