//! Polls the orchestrator's REST API and turns its apps+tasks inventory
//! into the fused `Service` list.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::types::{merge_tasks, AppsResponse, TasksResponse};
use crate::errors::GeneratorError;
use crate::manager::ServiceGenerator;
use crate::models::Service;

const APPS_ENDPOINT: &str = "/v2/apps";
const TASKS_ENDPOINT: &str = "/v2/tasks";

pub struct OrchestratorGenerator {
    client: Client,
    servers: Vec<String>,
}

impl OrchestratorGenerator {
    pub fn new(servers: Vec<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, servers }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        server: &str,
        endpoint: &str,
    ) -> Result<T, GeneratorError> {
        let url = format!("{server}{endpoint}");
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| GeneratorError::Source(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(GeneratorError::Source(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GeneratorError::Parse(format!("{url}: {e}")))
    }
}

#[async_trait]
impl ServiceGenerator for OrchestratorGenerator {
    async fn generate(&self) -> Result<Vec<Service>, GeneratorError> {
        let server = fastrand::choice(&self.servers)
            .ok_or_else(|| GeneratorError::Source("no orchestrator servers configured".to_string()))?;

        debug!(server = %server, "Querying orchestrator");

        let apps: AppsResponse = self.fetch_json(server, APPS_ENDPOINT).await?;
        let tasks: TasksResponse = self.fetch_json(server, TASKS_ENDPOINT).await?;

        Ok(merge_tasks(&apps.apps, &tasks.tasks))
    }

    fn name(&self) -> &str {
        "orchestrator"
    }
}
