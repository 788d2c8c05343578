//! The cluster-leader source adapter: polls a master's `state.json` for
//! the current leader PID, publishes it as a single Service, and
//! refreshes on change.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::errors::GeneratorError;
use crate::manager::{try_refresh, Notifier, QuitSignal, RefreshSender, ServiceGenerator};
use crate::models::{Host, Service};

#[derive(Debug, Deserialize)]
struct MasterState {
    #[serde(default)]
    leader: String,
}

/// `master@host:port` → `Host`. Errors on anything else.
fn parse_leader_pid(pid: &str) -> Result<Host, GeneratorError> {
    let address = pid
        .split_once('@')
        .map(|(_, addr)| addr)
        .ok_or_else(|| GeneratorError::Parse(format!("malformed leader PID: {pid}")))?;
    let (ip, port) = address
        .split_once(':')
        .ok_or_else(|| GeneratorError::Parse(format!("malformed leader PID: {pid}")))?;
    let port: u32 = port
        .parse()
        .map_err(|_| GeneratorError::Parse(format!("malformed leader PID port: {pid}")))?;
    Ok(Host::new(ip, port))
}

/// Shared record the Notifier writes and the Generator reads.
#[derive(Default)]
pub struct LeaderRecord {
    host: Mutex<Option<Host>>,
}

impl LeaderRecord {
    pub fn get(&self) -> Option<Host> {
        self.host.lock().expect("leader record mutex poisoned").clone()
    }

    fn set(&self, host: Host) {
        *self.host.lock().expect("leader record mutex poisoned") = Some(host);
    }
}

pub struct LeaderNotifier {
    client: Client,
    servers: Vec<String>,
    poll_interval: Duration,
    record: std::sync::Arc<LeaderRecord>,
}

impl LeaderNotifier {
    pub fn new(
        servers: Vec<String>,
        poll_interval: Duration,
        record: std::sync::Arc<LeaderRecord>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            servers,
            poll_interval,
            record,
        }
    }

    async fn query(&self, server: &str) -> Result<String, GeneratorError> {
        let url = format!("{server}/master/state.json");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeneratorError::Source(format!("{url}: {e}")))?;
        let state: MasterState = response
            .json()
            .await
            .map_err(|e| GeneratorError::Parse(format!("{url}: {e}")))?;
        Ok(state.leader)
    }
}

#[async_trait]
impl Notifier for LeaderNotifier {
    async fn run(self: Box<Self>, refresh: RefreshSender, quit: QuitSignal) {
        let mut ticker = interval(self.poll_interval);
        // The first tick fires immediately; the Manager's startup pass
        // already covers that poll, so skip it.
        ticker.tick().await;

        let mut current_pid: Option<String> = None;

        loop {
            tokio::select! {
                _ = quit.cancelled() => return,
                _ = ticker.tick() => {
                    let Some(server) = fastrand::choice(&self.servers) else {
                        warn!("No leader servers configured");
                        continue;
                    };

                    match self.query(server).await {
                        Ok(pid) => {
                            let changed = current_pid.as_deref() != Some(pid.as_str());
                            if current_pid.is_some() && changed {
                                match parse_leader_pid(&pid) {
                                    Ok(host) => {
                                        self.record.set(host);
                                        try_refresh(&refresh);
                                        debug!("Leader changed, triggering refresh");
                                    }
                                    Err(e) => warn!(error = %e, "Failed to parse leader PID"),
                                }
                            } else if current_pid.is_none() {
                                if let Ok(host) = parse_leader_pid(&pid) {
                                    self.record.set(host);
                                }
                            }
                            current_pid = Some(pid);
                        }
                        Err(e) => warn!(error = %e, "Unable to query master"),
                    }
                }
            }
        }
    }
}

/// Emits exactly one Service carrying the current leader, or none if no
/// leader has been observed yet.
pub struct LeaderGenerator {
    record: std::sync::Arc<LeaderRecord>,
    domain: String,
}

impl LeaderGenerator {
    pub fn new(record: std::sync::Arc<LeaderRecord>, domain: String) -> Self {
        Self { record, domain }
    }
}

#[async_trait]
impl ServiceGenerator for LeaderGenerator {
    async fn generate(&self) -> Result<Vec<Service>, GeneratorError> {
        let Some(host) = self.record.get() else {
            return Ok(Vec::new());
        };

        let mut service = Service::new("mesos_master", "Mesos Master");
        service.application_protocol = "http".to_string();
        service.domains = vec![self.domain.clone()];
        service.port = 80;
        service.hosts = vec![host];
        Ok(vec![service])
    }

    fn name(&self) -> &str {
        "leader"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_leader_pid() {
        let host = parse_leader_pid("master@10.0.0.5:5050").unwrap();
        assert_eq!(host, Host::new("10.0.0.5", 5050));
    }

    #[test]
    fn rejects_a_malformed_leader_pid() {
        assert!(parse_leader_pid("not-a-pid").is_err());
    }

    #[tokio::test]
    async fn generator_emits_nothing_until_a_leader_is_recorded() {
        let record = std::sync::Arc::new(LeaderRecord::default());
        let generator = LeaderGenerator::new(record.clone(), "mesos.example".to_string());
        assert!(generator.generate().await.unwrap().is_empty());

        record.set(Host::new("10.0.0.5", 5050));
        let services = generator.generate().await.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].domains, vec!["mesos.example"]);
        assert_eq!(services[0].hosts[0], Host::new("10.0.0.5", 5050));
    }
}
