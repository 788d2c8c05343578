//! The orchestrator (Marathon-style) source adapter: polls `/v2/apps` and
//! `/v2/tasks` to build the Service inventory, and relays orchestrator
//! event-bus callbacks into the refresh bus.

mod generator;
mod notifier;
mod types;

pub use generator::OrchestratorGenerator;
pub use notifier::{callback_route, CallbackState, OrchestratorNotifier, CALLBACK_PATH};
pub use types::{merge_tasks, App, AppsResponse, Container, Docker, PortMapping, Task, TasksResponse};
