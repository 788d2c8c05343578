//! Keeps a routing key-value store's per-domain backend lists in sync
//! with the http Services in the inventory. The store itself (Redis, in
//! the hipache pairing this is grounded on) is an opaque collaborator
//! behind [`RoutingStore`]; only an in-memory reference implementation
//! ships here.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::error;

use crate::errors::GeneratorError;
use crate::manager::ConfigGenerator;
use crate::models::Service;

/// Capability seam for the routing store. A frontend's backend list is
/// modeled the way hipache stores it in Redis: the entry at index 0 is
/// the frontend identifier, not a backend.
#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn create_frontend(&self, key: &str, service_id: &str) -> Result<(), GeneratorError>;
    async fn list_backends(&self, key: &str) -> Result<Vec<String>, GeneratorError>;
    async fn add_backend(&self, key: &str, backend: &str) -> Result<(), GeneratorError>;
    async fn remove_backend(&self, key: &str, backend: &str) -> Result<(), GeneratorError>;
}

/// In-memory reference implementation, used in tests and as the wiring
/// point before a real store is plugged in.
#[derive(Default)]
pub struct InMemoryRoutingStore {
    frontends: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryRoutingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a frontend's full list (id at index 0), for assertions.
    pub fn raw(&self, key: &str) -> Vec<String> {
        self.frontends
            .lock()
            .expect("routing store mutex poisoned")
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RoutingStore for InMemoryRoutingStore {
    async fn create_frontend(&self, key: &str, service_id: &str) -> Result<(), GeneratorError> {
        self.frontends
            .lock()
            .expect("routing store mutex poisoned")
            .entry(key.to_string())
            .or_insert_with(|| vec![service_id.to_string()]);
        Ok(())
    }

    async fn list_backends(&self, key: &str) -> Result<Vec<String>, GeneratorError> {
        let frontends = self.frontends.lock().expect("routing store mutex poisoned");
        Ok(match frontends.get(key) {
            Some(entries) if entries.len() > 1 => entries[1..].to_vec(),
            _ => Vec::new(),
        })
    }

    async fn add_backend(&self, key: &str, backend: &str) -> Result<(), GeneratorError> {
        self.frontends
            .lock()
            .expect("routing store mutex poisoned")
            .entry(key.to_string())
            .or_insert_with(Vec::new)
            .push(backend.to_string());
        Ok(())
    }

    async fn remove_backend(&self, key: &str, backend: &str) -> Result<(), GeneratorError> {
        if let Some(entries) = self
            .frontends
            .lock()
            .expect("routing store mutex poisoned")
            .get_mut(key)
        {
            entries.retain(|e| e != backend);
        }
        Ok(())
    }
}

pub struct RoutingKvGenerator {
    store: std::sync::Arc<dyn RoutingStore>,
}

impl RoutingKvGenerator {
    pub fn new(store: std::sync::Arc<dyn RoutingStore>) -> Self {
        Self { store }
    }

    async fn reconcile_domain(&self, service: &Service, domain: &str, desired: &HashSet<String>) -> Result<(), GeneratorError> {
        let key = format!("frontend:{domain}");
        let current = self.store.list_backends(&key).await?;
        let current_set: HashSet<String> = current.iter().cloned().collect();

        let to_add: Vec<&String> = desired.difference(&current_set).collect();
        let to_remove: Vec<&String> = current_set.difference(desired).collect();

        if current.is_empty() {
            self.store.create_frontend(&key, &service.id).await?;
        }

        for backend in to_remove {
            self.store.remove_backend(&key, backend).await?;
        }
        for backend in to_add {
            self.store.add_backend(&key, backend).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl ConfigGenerator for RoutingKvGenerator {
    async fn generate(&self, services: &[Service]) -> Result<(), GeneratorError> {
        for service in services {
            if !service.is_http() {
                continue;
            }

            let desired: HashSet<String> =
                service.hosts.iter().map(|h| h.backend_url()).collect();

            for domain in &service.domains {
                if let Err(e) = self.reconcile_domain(service, domain, &desired).await {
                    error!(service = %service.id, domain = %domain, error = %e, "Failed to reconcile routing store entry, continuing with next service");
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "routing_kv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Host;

    fn http_service(id: &str, domains: &[&str], hosts: &[(&str, u32)]) -> Service {
        let mut service = Service::new(id, "File");
        service.application_protocol = "http".to_string();
        service.domains = domains.iter().map(|d| d.to_string()).collect();
        service.hosts = hosts.iter().map(|(ip, port)| Host::new(*ip, *port)).collect();
        service
    }

    #[tokio::test]
    async fn creates_a_frontend_and_adds_backends_on_first_sight() {
        let store = std::sync::Arc::new(InMemoryRoutingStore::new());
        let generator = RoutingKvGenerator::new(store.clone());
        let service = http_service("svcA", &["a.example"], &[("10.0.0.1", 80)]);

        generator.generate(&[service]).await.unwrap();

        let raw = store.raw("frontend:a.example");
        assert_eq!(raw[0], "svcA");
        assert_eq!(raw[1..].to_vec(), vec!["http://10.0.0.1:80"]);
    }

    #[tokio::test]
    async fn removes_backends_no_longer_present() {
        let store = std::sync::Arc::new(InMemoryRoutingStore::new());
        store
            .create_frontend("frontend:a.example", "svcA")
            .await
            .unwrap();
        store
            .add_backend("frontend:a.example", "http://10.0.0.1:80")
            .await
            .unwrap();
        store
            .add_backend("frontend:a.example", "http://10.0.0.2:80")
            .await
            .unwrap();

        let generator = RoutingKvGenerator::new(store.clone());
        let service = http_service("svcA", &["a.example"], &[("10.0.0.2", 80)]);
        generator.generate(&[service]).await.unwrap();

        let backends = store.list_backends("frontend:a.example").await.unwrap();
        assert_eq!(backends, vec!["http://10.0.0.2:80"]);
    }

    #[tokio::test]
    async fn non_http_services_are_skipped() {
        let store = std::sync::Arc::new(InMemoryRoutingStore::new());
        let generator = RoutingKvGenerator::new(store.clone());
        let mut service = Service::new("svcA", "File");
        service.domains = vec!["a.example".to_string()];
        generator.generate(&[service]).await.unwrap();
        assert!(store.raw("frontend:a.example").is_empty());
    }
}
