//! The signal source adapter: `SIGUSR1` as a manual "refresh now" trigger.

use async_trait::async_trait;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::manager::{Notifier, QuitSignal, RefreshSender};

pub struct SignalNotifier;

impl SignalNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SignalNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for SignalNotifier {
    async fn run(self: Box<Self>, refresh: RefreshSender, quit: QuitSignal) {
        let mut stream = match signal(SignalKind::user_defined1()) {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Failed to register SIGUSR1 handler, module disabled");
                return;
            }
        };

        info!("Signal notifier listening for SIGUSR1");
        loop {
            tokio::select! {
                _ = quit.cancelled() => {
                    info!("Signal notifier stopped");
                    return;
                }
                received = stream.recv() => {
                    match received {
                        Some(()) => {
                            info!("Received SIGUSR1, forcing a refresh");
                            // Signals are sparse enough that a dropped one
                            // (the refresh bus being full) would be a real
                            // miss, so this waits instead of try_send-ing.
                            refresh.send().await;
                        }
                        None => return,
                    }
                }
            }
        }
    }
}
