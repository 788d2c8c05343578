//! Wire shapes returned by the orchestrator's REST API, and the
//! apps+tasks merge that turns them into the fused `Service` inventory.
//! Field names and the merge itself follow `marathon/generator.go`
//! exactly: HOST-networked apps report their advertised service-port as
//! both container-port and task-port (the task's own reported port is a
//! throwaway dynamic allocation in that mode), everything else uses the
//! indexed Docker port mapping.

use serde::Deserialize;
use std::collections::HashMap;

use crate::models::{Host, Service};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppsResponse {
    #[serde(default)]
    pub apps: Vec<App>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TasksResponse {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct App {
    pub id: String,
    #[serde(default)]
    pub ports: Vec<u32>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub container: Option<Container>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub docker: Option<Docker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Docker {
    #[serde(default)]
    pub network: String,
    #[serde(rename = "portMappings", default)]
    pub port_mappings: Vec<PortMapping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortMapping {
    #[serde(rename = "containerPort")]
    pub container_port: u32,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    #[serde(rename = "appId")]
    pub app_id: String,
    pub host: String,
    #[serde(default)]
    pub ports: Vec<u32>,
    #[serde(rename = "servicePorts", default)]
    pub service_ports: Vec<u32>,
}

/// Fuse `apps` and `tasks` into the Service inventory, per-task-port, the
/// way `servicesFromMarathon` does: tasks sharing (normalized id,
/// container-port) are merged by appending Hosts, and the first
/// occurrence of a key supplies the Service's other fields.
pub fn merge_tasks(apps: &[App], tasks: &[Task]) -> Vec<Service> {
    let apps_by_id: HashMap<&str, &App> = apps.iter().map(|a| (a.id.as_str(), a)).collect();
    let mut services: Vec<Service> = Vec::new();
    let mut index_of: HashMap<(String, u32), usize> = HashMap::new();

    for task in tasks {
        let Some(app) = apps_by_id.get(task.app_id.as_str()) else {
            continue;
        };
        if app.ports.is_empty() {
            continue;
        }

        let is_host = app
            .container
            .as_ref()
            .and_then(|c| c.docker.as_ref())
            .map(|d| d.network == "HOST")
            .unwrap_or(false);

        for (i, &task_port) in task.ports.iter().enumerate() {
            let (container_port, effective_task_port, protocol) = if is_host {
                // Marathon assigns task.Ports randomly in HOST mode; the
                // advertised service-port is the only meaningful value.
                let Some(&service_port) = task.service_ports.get(i) else {
                    continue;
                };
                (service_port, service_port, "tcp".to_string())
            } else {
                let Some(mapping) = app
                    .container
                    .as_ref()
                    .and_then(|c| c.docker.as_ref())
                    .and_then(|d| d.port_mappings.get(i))
                else {
                    continue;
                };
                (mapping.container_port, task_port, mapping.protocol.clone())
            };

            let id = normalize_id(&task.app_id, container_port);
            let key = (id.clone(), container_port);
            let host = Host::new(task.host.clone(), effective_task_port);

            if let Some(&idx) = index_of.get(&key) {
                services[idx].hosts.push(host);
            } else {
                let mut service = Service::new(id, "Marathon");
                service.port = container_port;
                service.service_port = task.service_ports.get(i).copied().unwrap_or(0);
                service.transport_protocol = protocol_from_label(app, container_port, &protocol);
                service.config = config_from_label(app, container_port);
                service.domains = domains_from_label(app);
                service.hosts.push(host);
                index_of.insert(key, services.len());
                services.push(service);
            }
        }
    }

    services
}

fn normalize_id(app_id: &str, port: u32) -> String {
    let trimmed = app_id.trim_start_matches('/');
    format!("marathon_{}_{}", trimmed.replace('/', "_"), port)
}

fn config_from_label(app: &App, port: u32) -> String {
    app.labels
        .get(&format!("proxym.port.{port}.config"))
        .cloned()
        .unwrap_or_default()
}

fn domains_from_label(app: &App) -> Vec<String> {
    match app.labels.get("proxym.domains") {
        Some(value) => value.split(',').map(str::to_string).collect(),
        None => Vec::new(),
    }
}

fn protocol_from_label(app: &App, port: u32, fallback: &str) -> String {
    app.labels
        .get(&format!("proxym.port.{port}.protocol"))
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_app(id: &str, container_port: u32, protocol: &str) -> App {
        App {
            id: id.to_string(),
            ports: vec![0], // non-empty marker; BRIDGE apps don't use this directly
            labels: HashMap::new(),
            container: Some(Container {
                docker: Some(Docker {
                    network: "BRIDGE".to_string(),
                    port_mappings: vec![PortMapping {
                        container_port,
                        protocol: protocol.to_string(),
                    }],
                }),
            }),
        }
    }

    fn host_app(id: &str, service_port: u32) -> App {
        App {
            id: id.to_string(),
            ports: vec![service_port],
            labels: HashMap::new(),
            container: Some(Container {
                docker: Some(Docker {
                    network: "HOST".to_string(),
                    port_mappings: Vec::new(),
                }),
            }),
        }
    }

    #[test]
    fn bridge_tasks_sharing_app_and_port_are_merged() {
        let apps = vec![bridge_app("/redis", 6379, "tcp")];
        let tasks = vec![
            Task {
                app_id: "/redis".to_string(),
                host: "10.0.0.1".to_string(),
                ports: vec![31000],
                service_ports: vec![41000],
            },
            Task {
                app_id: "/redis".to_string(),
                host: "10.0.0.2".to_string(),
                ports: vec![31001],
                service_ports: vec![41000],
            },
        ];

        let services = merge_tasks(&apps, &tasks);
        assert_eq!(services.len(), 1);
        let svc = &services[0];
        assert_eq!(svc.id, "marathon_redis_6379");
        assert_eq!(svc.port, 6379);
        assert_eq!(svc.service_port, 41000);
        assert_eq!(svc.transport_protocol, "tcp");
        assert_eq!(svc.hosts.len(), 2);
        assert_eq!(svc.hosts[0], Host::new("10.0.0.1", 31000));
        assert_eq!(svc.hosts[1], Host::new("10.0.0.2", 31001));
    }

    #[test]
    fn labels_override_protocol_config_and_domains() {
        let mut app = bridge_app("/registry", 5000, "tcp");
        app.labels.insert(
            "proxym.port.5000.protocol".to_string(),
            "http".to_string(),
        );
        app.labels.insert(
            "proxym.port.5000.config".to_string(),
            "option httpchk".to_string(),
        );
        app.labels
            .insert("proxym.domains".to_string(), "registry.example".to_string());
        let apps = vec![app];
        let tasks = vec![Task {
            app_id: "/registry".to_string(),
            host: "10.0.0.3".to_string(),
            ports: vec![42000],
            service_ports: vec![42000],
        }];

        let services = merge_tasks(&apps, &tasks);
        assert_eq!(services.len(), 1);
        let svc = &services[0];
        assert_eq!(svc.transport_protocol, "http");
        assert_eq!(svc.config, "option httpchk");
        assert_eq!(svc.domains, vec!["registry.example"]);
    }

    #[test]
    fn host_networking_ignores_the_tasks_own_port() {
        let apps = vec![host_app("/host-networking", 8888)];
        let tasks = vec![Task {
            app_id: "/host-networking".to_string(),
            host: "10.10.10.10".to_string(),
            ports: vec![31855],
            service_ports: vec![8888],
        }];

        let services = merge_tasks(&apps, &tasks);
        assert_eq!(services.len(), 1);
        let svc = &services[0];
        assert_eq!(svc.id, "marathon_host-networking_8888");
        assert_eq!(svc.port, 8888);
        assert_eq!(svc.service_port, 8888);
        assert_eq!(svc.hosts[0], Host::new("10.10.10.10", 8888));
    }

    #[test]
    fn apps_with_no_ports_are_skipped() {
        let apps = vec![App {
            id: "/idle".to_string(),
            ports: Vec::new(),
            labels: HashMap::new(),
            container: None,
        }];
        let tasks = vec![Task {
            app_id: "/idle".to_string(),
            host: "10.0.0.1".to_string(),
            ports: vec![1234],
            service_ports: vec![1234],
        }];
        assert!(merge_tasks(&apps, &tasks).is_empty());
    }

    #[test]
    fn tasks_with_no_owning_app_are_skipped() {
        let tasks = vec![Task {
            app_id: "/ghost".to_string(),
            host: "10.0.0.1".to_string(),
            ports: vec![1234],
            service_ports: vec![1234],
        }];
        assert!(merge_tasks(&[], &tasks).is_empty());
    }
}
