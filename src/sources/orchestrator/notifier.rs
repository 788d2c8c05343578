//! Registers a callback URL with the orchestrator's event-subscription
//! endpoint at startup, then relays `status_update_event` POSTs into the
//! refresh bus. The HTTP route is wired onto the Manager's router before
//! `Manager::run` starts, but the bus handle only exists once `run` spawns
//! notifiers — so the route and the notifier share a `OnceCell` that the
//! notifier fills in as the first thing it does.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, MethodRouter};
use axum::Router;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::manager::{try_refresh, Notifier, QuitSignal, RefreshSender};

const EVENT_SUBSCRIPTIONS_ENDPOINT: &str = "/v2/eventSubscriptions";
pub const CALLBACK_PATH: &str = "/marathon/callback";

#[derive(Clone, Default)]
pub struct CallbackState {
    refresh: Arc<OnceCell<RefreshSender>>,
}

#[derive(Debug, Deserialize)]
struct OrchestratorEvent {
    #[serde(rename = "eventType", default)]
    event_type: String,
}

/// Build the callback route as a state-bound `MethodRouter`, the atomic unit
/// the Manager registers via `register_http_endpoint`. Shares its
/// `CallbackState` with the [`OrchestratorNotifier`] constructed alongside it.
pub fn callback_route(state: CallbackState) -> MethodRouter<()> {
    post(callback_handler).with_state(state)
}

fn callback_router(state: CallbackState) -> Router {
    Router::new().route(CALLBACK_PATH, callback_route(state))
}

async fn callback_handler(State(state): State<CallbackState>, body: String) -> StatusCode {
    let event: OrchestratorEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Failed to unmarshal orchestrator event");
            return StatusCode::OK;
        }
    };

    if event.event_type == "status_update_event" {
        if let Some(refresh) = state.refresh.get() {
            try_refresh(refresh);
        }
    }

    StatusCode::OK
}

pub struct OrchestratorNotifier {
    client: Client,
    servers: Vec<String>,
    callback_base_url: String,
    state: CallbackState,
}

impl OrchestratorNotifier {
    pub fn new(servers: Vec<String>, callback_base_url: String, state: CallbackState) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            servers,
            callback_base_url,
            state,
        }
    }

    /// Best-effort: registration failure is logged but not fatal, per
    /// spec's callback-registration semantics — manual and
    /// notifier-driven refreshes from other sources still function.
    async fn register_callback(&self) {
        let Some(server) = self.servers.first() else {
            warn!("No orchestrator servers configured, skipping callback registration");
            return;
        };

        let callback_url = format!("{}{}", self.callback_base_url, CALLBACK_PATH);
        let url = format!(
            "{server}{EVENT_SUBSCRIPTIONS_ENDPOINT}?callbackUrl={callback_url}"
        );

        match self.client.post(&url).body("").send().await {
            Ok(response) if response.status().is_success() => {
                info!(server = %server, "Registered orchestrator event callback");
            }
            Ok(response) => {
                warn!(
                    server = %server,
                    status = %response.status(),
                    "Orchestrator refused callback registration"
                );
            }
            Err(e) => {
                warn!(server = %server, error = %e, "Failed to register orchestrator callback");
            }
        }
    }
}

#[async_trait]
impl Notifier for OrchestratorNotifier {
    async fn run(self: Box<Self>, refresh: RefreshSender, quit: QuitSignal) {
        // Errors here are intentionally swallowed into a log line, never a
        // panic or early return: a callback that never gets to register is
        // better than a Manager that aborts over it.
        let _ = self.state.refresh.set(refresh);
        self.register_callback().await;
        quit.cancelled().await;
        info!("Orchestrator notifier stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn status_update_event_triggers_a_refresh() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let refresh = RefreshSender::new(tx);
        let state = CallbackState::default();
        state.refresh.set(refresh).unwrap();

        let app = callback_router(state);
        let body = r#"{"eventType":"status_update_event"}"#;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(CALLBACK_PATH)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn other_event_types_are_ignored() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let refresh = RefreshSender::new(tx);
        let state = CallbackState::default();
        state.refresh.set(refresh).unwrap();

        let app = callback_router(state);
        let body = r#"{"eventType":"deployment_info"}"#;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(CALLBACK_PATH)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }
}
