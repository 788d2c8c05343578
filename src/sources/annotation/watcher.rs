//! The watch driver notifier: one task watches the parent node's
//! children, spawning a per-id watch task for
//! every newly-seen id; each per-id task keeps the registry in sync with
//! its node and emits a refresh on every change.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::registry::AnnotationRegistry;
use super::store::{ConnectionEvent, CoordinationStore, NodeEvent};
use crate::manager::{try_refresh, Notifier, QuitSignal, RefreshSender};
use crate::models::Annotation;

pub struct AnnotationWatchDriver {
    store: Arc<dyn CoordinationStore>,
    registry: Arc<AnnotationRegistry>,
    base_path: String,
}

impl AnnotationWatchDriver {
    pub fn new(store: Arc<dyn CoordinationStore>, registry: Arc<AnnotationRegistry>, base_path: String) -> Self {
        Self {
            store,
            registry,
            base_path,
        }
    }

    fn annotation_api_path(&self) -> String {
        format!("{}/annotation_api", self.base_path)
    }

    fn node_path(&self, id: &str) -> String {
        format!("{}/{}", self.annotation_api_path(), id)
    }

    /// Bootstrap the coordination-store layout: `/proxym` and
    /// `/proxym/annotation_api` must exist before anything else runs.
    async fn bootstrap(&self) -> Result<(), crate::errors::GeneratorError> {
        self.store.ensure_path(&self.base_path).await?;
        self.store.ensure_path(&self.annotation_api_path()).await?;
        Ok(())
    }

    async fn watch_one_node(&self, id: String, refresh: RefreshSender, quit: QuitSignal) {
        let path = self.node_path(&id);
        let mut rx = match self.store.watch_node(&path).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to watch annotation node");
                return;
            }
        };

        // Pick up the current value immediately.
        self.reload_node(&id, &path, &refresh).await;

        loop {
            tokio::select! {
                _ = quit.cancelled() => return,
                event = rx.recv() => {
                    match event {
                        Some(NodeEvent::Changed) => {
                            self.reload_node(&id, &path, &refresh).await;
                        }
                        Some(NodeEvent::Deleted) | None => {
                            self.registry.delete(&id);
                            try_refresh(&refresh);
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn reload_node(&self, id: &str, path: &str, refresh: &RefreshSender) {
        match self.store.get(path).await {
            Ok(Some(payload)) => match serde_json::from_str::<Annotation>(&payload) {
                Ok(annotation) => {
                    self.registry.add(annotation);
                    try_refresh(refresh);
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Malformed annotation payload, dropping");
                    self.registry.delete(id);
                    try_refresh(refresh);
                }
            },
            Ok(None) => {
                self.registry.delete(id);
                try_refresh(refresh);
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to read annotation node");
            }
        }
    }
}

#[async_trait]
impl Notifier for AnnotationWatchDriver {
    async fn run(self: Box<Self>, refresh: RefreshSender, quit: QuitSignal) {
        if let Err(e) = self.bootstrap().await {
            error!(error = %e, "Failed to bootstrap annotation coordination-store paths, module disabled");
            return;
        }

        let mut connection_rx = match self.store.watch_connection().await {
            Ok(rx) => rx,
            Err(e) => {
                error!(error = %e, "Failed to watch coordination-store connection state, module disabled");
                return;
            }
        };

        let mut children_rx = match self.store.watch_children(&self.annotation_api_path()).await {
            Ok(rx) => rx,
            Err(e) => {
                error!(error = %e, "Failed to watch annotation_api children, module disabled");
                return;
            }
        };

        let mut per_id_tasks: JoinSet<()> = JoinSet::new();
        info!("Annotation watch driver started");

        loop {
            tokio::select! {
                _ = quit.cancelled() => {
                    per_id_tasks.abort_all();
                    info!("Annotation watch driver stopped");
                    return;
                }
                connection_event = connection_rx.recv() => {
                    match connection_event {
                        Ok(ConnectionEvent::Disconnected) => {
                            error!("Coordination-store disconnected, annotation module terminating");
                            per_id_tasks.abort_all();
                            return;
                        }
                        Ok(ConnectionEvent::Connected) => {}
                        Err(_) => {}
                    }
                }
                children = children_rx.recv() => {
                    let Some(ids) = children else { return };
                    // Keyed off the registry, not a locally-accumulated set:
                    // a node the registry has forgotten about (deleted, then
                    // recreated by another writer) must be re-watched, the
                    // same way annotation_api.go's driver keys its spawn
                    // decision off `!registry.Has(child)`.
                    for id in ids {
                        if self.registry.has(&id) {
                            continue;
                        }
                        let driver = Self {
                            store: self.store.clone(),
                            registry: self.registry.clone(),
                            base_path: self.base_path.clone(),
                        };
                        let refresh = refresh.clone();
                        let quit = quit.clone();
                        per_id_tasks.spawn(async move {
                            driver.watch_one_node(id, refresh, quit).await;
                        });
                    }
                }
                // Reap finished per-id tasks so churn (nodes repeatedly
                // deleted and recreated) doesn't grow the JoinSet forever.
                Some(result) = per_id_tasks.join_next(), if !per_id_tasks.is_empty() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Per-id annotation watch task panicked");
                    }
                }
            }
        }
    }
}
