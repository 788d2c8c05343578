//! The reconciliation engine: the refresh loop, collaborator registration,
//! HTTP surface, and graceful shutdown.

mod metrics;
mod state;
mod traits;

pub use metrics::Metrics;
pub use state::ManagerState;
pub use traits::{Annotator, ConfigGenerator, Notifier, QuitSignal, RefreshSender, ServiceGenerator};

use axum::http::Method;
use axum::routing::MethodRouter;
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::Result;
use crate::models::Service;

const REFRESH_CHANNEL_CAPACITY: usize = 10;

/// Owns the refresh bus, the registered collaborators, and the single HTTP
/// listener. Collaborators must be registered before [`Manager::run`];
/// registering after `run` has started is a programming error (the
/// notifier wait-group count is fixed at `run` start).
pub struct Manager {
    addr: SocketAddr,
    service_generators: Vec<Box<dyn ServiceGenerator>>,
    annotators: Vec<Box<dyn Annotator>>,
    config_generators: Vec<Box<dyn ConfigGenerator>>,
    notifiers: Vec<Box<dyn Notifier>>,
    routes: HashMap<(String, String), MethodRouter<()>>,
    metrics: Arc<Metrics>,
    state: ManagerState,
}

impl Manager {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            service_generators: Vec::new(),
            annotators: Vec::new(),
            config_generators: Vec::new(),
            notifiers: Vec::new(),
            routes: HashMap::new(),
            metrics: Arc::new(Metrics::default()),
            state: ManagerState::new(),
        }
    }

    pub fn add_service_generator(&mut self, generator: Box<dyn ServiceGenerator>) {
        self.service_generators.push(generator);
    }

    pub fn add_annotator(&mut self, annotator: Box<dyn Annotator>) {
        self.annotators.push(annotator);
    }

    pub fn add_config_generator(&mut self, generator: Box<dyn ConfigGenerator>) {
        self.config_generators.push(generator);
    }

    pub fn add_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Contribute a route to the manager's HTTP server. Registration is
    /// idempotent only in the sense that the last registration for the same
    /// method + path wins; must be called before `run`.
    pub fn register_http_endpoint(&mut self, method: Method, path: &str, handler: MethodRouter<()>) {
        self.routes
            .insert((path.to_string(), method.to_string()), handler);
    }

    pub fn state(&self) -> ManagerState {
        self.state.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Blocking: starts every notifier as an independent task, opens the
    /// HTTP listener, runs one reconciliation pass immediately, then
    /// consumes refresh tokens until `quit` fires and all notifiers have
    /// exited.
    pub async fn run(mut self, quit: CancellationToken) -> Result<()> {
        self.state.transition_to_running();
        self.register_metrics_endpoint();

        let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(REFRESH_CHANNEL_CAPACITY);
        let refresh_tx = RefreshSender::new(refresh_tx);

        let mut notifier_tasks = JoinSet::new();
        for notifier in self.notifiers.drain(..) {
            let tx = refresh_tx.clone();
            let quit = quit.clone();
            notifier_tasks.spawn(async move { notifier.run(tx, quit).await });
        }

        let app = self.build_router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Manager HTTP listener bound on {}", self.addr);
        let server_quit = quit.clone();
        let server_task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_quit.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("HTTP listener exited with error: {}", e);
            }
        });

        // The startup immediate refresh always runs before the first
        // notifier-triggered refresh is dequeued.
        self.process().await;

        loop {
            tokio::select! {
                _ = quit.cancelled() => {
                    info!("Quit signal received, waiting for notifiers to exit");
                    break;
                }
                token = refresh_rx.recv() => {
                    match token {
                        Some(()) => self.process().await,
                        None => break,
                    }
                }
            }
        }

        self.state.transition_to_stopping();
        while let Some(result) = notifier_tasks.join_next().await {
            if let Err(e) = result {
                error!("Notifier task panicked: {}", e);
            }
        }
        server_task.abort();
        let _ = server_task.await;

        self.state.transition_to_stopped();
        Ok(())
    }

    /// One end-to-end reconciliation pass: generators → annotators → sinks.
    async fn process(&self) {
        let mut services: Vec<Service> = Vec::new();
        for generator in &self.service_generators {
            match generator.generate().await {
                Ok(mut batch) => services.append(&mut batch),
                Err(e) => {
                    error!(generator = generator.name(), error = %e, "Service generator failed, aborting pass");
                    self.metrics.record_failure();
                    return;
                }
            }
        }

        for annotator in &self.annotators {
            if let Err(e) = annotator.annotate(&mut services).await {
                error!(error = %e, "Annotator failed, aborting pass");
                self.metrics.record_failure();
                return;
            }
        }

        for sink in &self.config_generators {
            if let Err(e) = sink.generate(&services).await {
                error!(sink = sink.name(), error = %e, "Config generator failed, continuing with remaining sinks");
            }
        }

        self.metrics.record_success();
    }

    /// `/metrics` is registered through the same contract every other
    /// collaborator uses, so it's always present without special-casing
    /// `build_router`.
    fn register_metrics_endpoint(&mut self) {
        let metrics = self.metrics.clone();
        let handler = axum::routing::get(move || {
            let metrics = metrics.clone();
            async move { axum::Json(metrics.snapshot()) }
        });
        self.register_http_endpoint(Method::GET, "/metrics", handler);
    }

    fn build_router(&mut self) -> Router {
        let mut by_path: HashMap<String, MethodRouter<()>> = HashMap::new();
        for ((path, _method), handler) in self.routes.drain() {
            by_path
                .entry(path)
                .and_modify(|existing| {
                    *existing = existing.clone().merge(handler.clone());
                })
                .or_insert(handler);
        }

        let mut router = Router::new();
        for (path, handler) in by_path {
            router = router.route(&path, handler);
        }

        router
    }
}

/// Non-blocking helper: a send that silently drops the event when the
/// refresh bus is full. A full buffer means a reconciliation already
/// reflects everything that would have been coalesced.
pub fn try_refresh(tx: &RefreshSender) {
    if tx.try_send().is_err() {
        warn!("Refresh channel full, dropping refresh token");
    }
}
