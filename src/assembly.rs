//! Explicit, config-driven wiring of the Manager. Replaces the source
//! project's import-time side-effect registration (`init()` functions
//! that call `manager.AddServiceGenerator` at package-load time) with a
//! single function that reads [`Config`] and conditionally constructs
//! and registers each module.
//!
//! Modules whose downstream collaborator is itself out of scope
//! (coordination store, routing store, template engine) take that
//! collaborator as an optional hook; when a module is enabled but its
//! hook is absent, assembly logs a warning and skips registering it
//! rather than registering something non-functional.

use axum::http::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::manager::Manager;
use crate::sinks::proxy_config::{CheckAndReload, ProxyConfigGenerator, ReloadStrategy, TemplateRenderer};
use crate::sinks::routing_kv::{InMemoryRoutingStore, RoutingKvGenerator, RoutingStore};
use crate::sinks::stdout::StdoutGenerator;
use crate::sources::annotation::{
    AnnotationAnnotator, AnnotationApiState, AnnotationRegistry, AnnotationWatchDriver,
    CoordinationStore, InMemoryStore,
};
use crate::sources::file::{FileGenerator, FileNotifier};
use crate::sources::leader::{LeaderGenerator, LeaderNotifier, LeaderRecord};
use crate::sources::orchestrator::{
    callback_route, CallbackState, OrchestratorGenerator, OrchestratorNotifier, CALLBACK_PATH,
};
use crate::sources::signal::SignalNotifier;

/// Collaborators that are themselves out of scope and must be supplied
/// by whatever wires the binary together, not invented here.
#[derive(Default)]
pub struct AssemblyOptions {
    pub coordination_store: Option<Arc<dyn CoordinationStore>>,
    pub routing_store: Option<Arc<dyn RoutingStore>>,
    pub proxy_renderer: Option<Arc<dyn TemplateRenderer>>,
    pub proxy_reload: Option<Arc<dyn ReloadStrategy>>,
    /// Register the always-on stdout sink alongside whatever else is enabled.
    pub enable_stdout_sink: bool,
}

pub fn build(config: &Config, options: AssemblyOptions) -> Result<Manager> {
    let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port)
        .parse()
        .map_err(|e| Error::configuration(format!("invalid web listen address: {e}")))?;
    let mut manager = Manager::new(addr);

    if config.orchestrator.enabled {
        wire_orchestrator(&mut manager, config);
    }

    if config.file.enabled {
        wire_file(&mut manager, config);
    }

    if config.annotation.enabled {
        wire_annotation(&mut manager, config, &options);
    }

    if config.leader.enabled {
        wire_leader(&mut manager, config);
    }

    if config.signal.enabled {
        manager.add_notifier(Box::new(SignalNotifier::new()));
    }

    if config.proxy_sink.enabled {
        wire_proxy_sink(&mut manager, config, &options);
    }

    if config.routing_sink.enabled {
        wire_routing_sink(&mut manager, &options);
    }

    if options.enable_stdout_sink {
        manager.add_config_generator(Box::new(StdoutGenerator::new()));
    }

    Ok(manager)
}

fn wire_orchestrator(manager: &mut Manager, config: &Config) {
    let servers = config.orchestrator.servers.clone();
    manager.add_service_generator(Box::new(OrchestratorGenerator::new(servers.clone())));

    let Some(callback_base_url) = config.orchestrator.callback_base_url.clone() else {
        warn!("Orchestrator module enabled but no callback_base_url configured, skipping notifier");
        return;
    };

    let callback_state = CallbackState::default();
    manager.register_http_endpoint(Method::POST, CALLBACK_PATH, callback_route(callback_state.clone()));
    manager.add_notifier(Box::new(OrchestratorNotifier::new(
        servers,
        callback_base_url,
        callback_state,
    )));
}

fn wire_file(manager: &mut Manager, config: &Config) {
    let Some(directory) = config.file.directory.clone() else {
        warn!("File module enabled but no directory configured, skipping");
        return;
    };
    manager.add_service_generator(Box::new(FileGenerator::new(directory.clone())));
    manager.add_notifier(Box::new(FileNotifier::new(directory)));
}

fn wire_annotation(manager: &mut Manager, config: &Config, options: &AssemblyOptions) {
    let store: Arc<dyn CoordinationStore> = options
        .coordination_store
        .clone()
        .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
    let registry = Arc::new(AnnotationRegistry::new());
    let base_path = config.annotation.base_path.clone();

    manager.add_annotator(Box::new(AnnotationAnnotator::new(registry.clone())));
    manager.add_notifier(Box::new(AnnotationWatchDriver::new(
        store.clone(),
        registry.clone(),
        base_path.clone(),
    )));

    let api_state = AnnotationApiState {
        store,
        registry,
        base_path,
    };
    manager.register_http_endpoint(
        Method::GET,
        "/annotations",
        crate::sources::annotation::list_route(api_state.clone()),
    );
    manager.register_http_endpoint(
        Method::POST,
        "/annotations/:service_id",
        crate::sources::annotation::upsert_route(api_state.clone()),
    );
    manager.register_http_endpoint(
        Method::DELETE,
        "/annotations/:service_id",
        crate::sources::annotation::delete_route(api_state.clone()),
    );
    manager.register_http_endpoint(
        Method::OPTIONS,
        "/annotations/:service_id",
        crate::sources::annotation::options_route(api_state),
    );
}

fn wire_leader(manager: &mut Manager, config: &Config) {
    let record = Arc::new(LeaderRecord::default());
    manager.add_notifier(Box::new(LeaderNotifier::new(
        config.leader.servers.clone(),
        Duration::from_secs(config.leader.poll_interval_secs),
        record.clone(),
    )));
    manager.add_service_generator(Box::new(LeaderGenerator::new(
        record,
        config.leader.domain.clone(),
    )));
}

fn wire_proxy_sink(manager: &mut Manager, config: &Config, options: &AssemblyOptions) {
    let Some(renderer) = options.proxy_renderer.clone() else {
        warn!("Proxy config sink enabled but no template renderer supplied, skipping");
        return;
    };
    let Some(template_path) = config.proxy_sink.template_path.clone() else {
        warn!("Proxy config sink enabled but no template_path configured, skipping");
        return;
    };
    let Some(config_path) = config.proxy_sink.config_path.clone() else {
        warn!("Proxy config sink enabled but no config_path configured, skipping");
        return;
    };

    let reload: Arc<dyn ReloadStrategy> = match options.proxy_reload.clone() {
        Some(reload) => reload,
        None => match config.proxy_sink.reload_command.clone() {
            Some(reload_command) => Arc::new(CheckAndReload {
                check_command: config.proxy_sink.check_command.clone(),
                reload_command,
            }),
            None => {
                warn!("Proxy config sink enabled but no reload strategy or reload_command configured, skipping");
                return;
            }
        },
    };

    manager.add_config_generator(Box::new(ProxyConfigGenerator::new(
        template_path,
        config_path,
        renderer,
        reload,
    )));
}

fn wire_routing_sink(manager: &mut Manager, options: &AssemblyOptions) {
    let store: Arc<dyn RoutingStore> = options
        .routing_store
        .clone()
        .unwrap_or_else(|| Arc::new(InMemoryRoutingStore::new()));
    manager.add_config_generator(Box::new(RoutingKvGenerator::new(store)));
}
