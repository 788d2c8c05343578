//! The coordination-store-backed annotation service:
//! registry, watch driver, HTTP CRUD, and the `Annotator` that applies
//! overrides during a reconciliation pass.

mod annotator;
mod http;
mod registry;
mod store;
mod watcher;

pub use annotator::AnnotationAnnotator;
pub use http::{delete_route, list_route, options_route, upsert_route, AnnotationApiState};
pub use registry::AnnotationRegistry;
pub use store::{ConnectionEvent, CoordinationStore, InMemoryStore, NodeEvent};
pub use watcher::AnnotationWatchDriver;
