//! The annotation service's HTTP CRUD surface: thin `axum` handlers that
//! extract, delegate, and map results to status codes.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, options, post, MethodRouter};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use super::registry::AnnotationRegistry;
use super::store::CoordinationStore;
use crate::models::Annotation;

#[derive(Clone)]
pub struct AnnotationApiState {
    pub store: Arc<dyn CoordinationStore>,
    pub registry: Arc<AnnotationRegistry>,
    pub base_path: String,
}

impl AnnotationApiState {
    fn node_path(&self, id: &str) -> String {
        format!("{}/annotation_api/{}", self.base_path, id)
    }
}

/// The four atomic routes, each a state-bound `MethodRouter` registered with
/// the Manager via `register_http_endpoint`. `/annotations/:service_id`
/// carries three of them, unioned back together by the Manager's
/// same-path merge.
pub fn list_route(state: AnnotationApiState) -> MethodRouter<()> {
    get(list_annotations).with_state(state)
}

pub fn upsert_route(state: AnnotationApiState) -> MethodRouter<()> {
    post(upsert_annotation).with_state(state)
}

pub fn delete_route(state: AnnotationApiState) -> MethodRouter<()> {
    delete(delete_annotation).with_state(state)
}

pub fn options_route(state: AnnotationApiState) -> MethodRouter<()> {
    options(options_annotation).with_state(state)
}

fn router(state: AnnotationApiState) -> Router {
    let service_id_routes = upsert_route(state.clone())
        .merge(delete_route(state.clone()))
        .merge(options_route(state.clone()));
    Router::new()
        .route("/annotations", list_route(state))
        .route("/annotations/:service_id", service_id_routes)
}

#[derive(Serialize)]
struct AnnotationListEntry {
    annotation: Annotation,
    link: String,
}

async fn list_annotations(State(state): State<AnnotationApiState>) -> Response {
    let annotation_api_path = format!("{}/annotation_api", state.base_path);
    let ids = match state.store.children(&annotation_api_path).await {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "Failed to list annotation children");
            return with_cors(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mut entries = Vec::with_capacity(ids.len());
    for id in ids {
        let path = state.node_path(&id);
        match state.store.get(&path).await {
            Ok(Some(payload)) => match serde_json::from_str::<Annotation>(&payload) {
                Ok(annotation) => entries.push(AnnotationListEntry {
                    link: format!("/annotations/{}", annotation.id),
                    annotation,
                }),
                Err(e) => error!(id = %id, error = %e, "Skipping malformed annotation"),
            },
            Ok(None) => {}
            Err(e) => error!(id = %id, error = %e, "Failed to read annotation"),
        }
    }

    let mut response = Json(entries).into_response();
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// Parses the body as JSON by hand (rather than via the `Json<T>`
/// extractor) so a malformed payload maps to `400` instead of axum's
/// default `422`.
async fn upsert_annotation(
    State(state): State<AnnotationApiState>,
    Path(service_id): Path<String>,
    body: String,
) -> Response {
    let mut payload: Annotation = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!(service_id = %service_id, error = %e, "Malformed annotation payload");
            return with_cors(StatusCode::BAD_REQUEST);
        }
    };
    if payload.id.is_empty() {
        payload.id = service_id.clone();
    }

    let path = state.node_path(&service_id);
    let existing = match state.store.get(&path).await {
        Ok(Some(raw)) => serde_json::from_str::<Annotation>(&raw).ok(),
        Ok(None) => None,
        Err(e) => {
            error!(service_id = %service_id, error = %e, "Failed to read existing annotation");
            return with_cors(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if let Some(existing) = &existing {
        if existing.equivalent(&payload) {
            return with_cors(StatusCode::NO_CONTENT);
        }
    }

    let serialized = match serde_json::to_string(&payload) {
        Ok(s) => s,
        Err(e) => {
            error!(service_id = %service_id, error = %e, "Failed to serialize annotation");
            return with_cors(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if let Err(e) = state.store.set(&path, &serialized).await {
        error!(service_id = %service_id, error = %e, "Failed to write annotation");
        return with_cors(StatusCode::INTERNAL_SERVER_ERROR);
    }

    // The registry is normally kept current by the watch driver; update it
    // here too so a client polling right after a write sees it reflected.
    state.registry.add(payload);

    with_cors(StatusCode::NO_CONTENT)
}

async fn delete_annotation(
    State(state): State<AnnotationApiState>,
    Path(service_id): Path<String>,
) -> Response {
    let path = state.node_path(&service_id);
    if let Err(e) = state.store.delete(&path).await {
        error!(service_id = %service_id, error = %e, "Failed to delete annotation");
        return with_cors(StatusCode::INTERNAL_SERVER_ERROR);
    }
    state.registry.delete(&service_id);
    with_cors(StatusCode::NO_CONTENT)
}

async fn options_annotation() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("DELETE,POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn with_cors(status: StatusCode) -> Response {
    let mut response = status.into_response();
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::super::store::InMemoryStore;
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> AnnotationApiState {
        AnnotationApiState {
            store: Arc::new(InMemoryStore::new()),
            registry: Arc::new(AnnotationRegistry::new()),
            base_path: "/proxym".to_string(),
        }
    }

    #[tokio::test]
    async fn posting_a_new_annotation_returns_no_content() {
        let state = test_state();
        let app = router(state.clone());

        let body = r#"{"id":"svcA","domains":["a.example"],"config":"option httpchk"}"#;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/annotations/svcA")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.registry.has("svcA"));
    }

    #[tokio::test]
    async fn posting_malformed_json_returns_bad_request() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/annotations/svcA")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reposting_an_equivalent_annotation_is_a_no_op() {
        let state = test_state();
        let path = state.node_path("svcA");
        state
            .store
            .set(&path, r#"{"id":"svcA","domains":["a.example","b.example"]}"#)
            .await
            .unwrap();

        let app = router(state.clone());
        let body = r#"{"id":"svcA","domains":["b.example","a.example"]}"#;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/annotations/svcA")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn delete_returns_no_content_and_clears_registry() {
        let state = test_state();
        state.registry.add(Annotation {
            id: "svcA".to_string(),
            ..Default::default()
        });
        let app = router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/annotations/svcA")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!state.registry.has("svcA"));
    }
}
