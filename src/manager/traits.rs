//! The four collaborator contracts the Manager drives each pass:
//! `ServiceGenerator`, `Annotator`, `ConfigGenerator`, `Notifier`.
//! Variants are closed at wiring time in `crate::assembly` — no dynamic
//! loading.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::GeneratorResult;
use crate::models::Service;

pub type QuitSignal = CancellationToken;

/// Handle to the bounded refresh bus. Cloned into every notifier; sends are
/// always non-blocking.
#[derive(Clone)]
pub struct RefreshSender {
    inner: mpsc::Sender<()>,
}

impl RefreshSender {
    pub fn new(inner: mpsc::Sender<()>) -> Self {
        Self { inner }
    }

    /// Attempt a non-blocking send; returns `Err` if the buffer is full.
    /// Callers should treat a full buffer as success-by-coalescing, not a
    /// failure to surface.
    pub fn try_send(&self) -> Result<(), ()> {
        self.inner.try_send(()).map_err(|_| ())
    }

    /// Awaiting send used by sources sparse enough that coalescing would
    /// lose a signal worth keeping (the user-signal notifier).
    pub async fn send(&self) {
        let _ = self.inner.send(()).await;
    }
}

/// Produces the current inventory of [`Service`]s from one source. Run
/// serially on the Manager's reconciliation task in registration order; not
/// expected to be thread-safe against concurrent `generate` calls.
#[async_trait]
pub trait ServiceGenerator: Send + Sync {
    async fn generate(&self) -> GeneratorResult<Vec<Service>>;

    /// Used for log correlation and error attribution.
    fn name(&self) -> &str;
}

/// Decorates the fused inventory in place during a pass. Never creates or
/// drops `Service`s, only mutates recognized fields. Run serially in
/// registration order after all generators have contributed.
#[async_trait]
pub trait Annotator: Send + Sync {
    async fn annotate(&self, services: &mut Vec<Service>) -> GeneratorResult<()>;
}

/// Renders an external artifact (or otherwise acts) from the final
/// inventory and, if applicable, reloads the external process it drives.
/// Sinks are independent: one sink's error is logged but does not stop the
/// remaining sinks in the same pass.
#[async_trait]
pub trait ConfigGenerator: Send + Sync {
    async fn generate(&self, services: &[Service]) -> GeneratorResult<()>;

    fn name(&self) -> &str;
}

/// A long-lived task that emits refresh tokens in response to external
/// change. Must select on `quit` alongside its normal work source, release
/// any external resources it holds (HTTP registrations, watches, signal
/// handlers, store connections) on cancellation, and then return.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn run(self: Box<Self>, refresh: RefreshSender, quit: QuitSignal);
}
