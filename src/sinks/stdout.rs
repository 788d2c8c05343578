//! A trivial sink that writes the reconciled inventory to stdout as
//! JSON. Useful for local development and for driving the Manager
//! without standing up a real proxy or routing store.

use async_trait::async_trait;
use tracing::error;

use crate::errors::GeneratorError;
use crate::manager::ConfigGenerator;
use crate::models::Service;

pub struct StdoutGenerator;

impl StdoutGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdoutGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigGenerator for StdoutGenerator {
    async fn generate(&self, services: &[Service]) -> Result<(), GeneratorError> {
        match serde_json::to_string_pretty(services) {
            Ok(json) => println!("{json}"),
            Err(e) => error!(error = %e, "Failed to serialize inventory for stdout sink"),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}
