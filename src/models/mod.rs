//! Value objects reconciled and fanned out by the [`crate::manager::Manager`].

use serde::{Deserialize, Serialize};

/// A single backing endpoint for a [`Service`].
///
/// Order matters: `Service::hosts` preserves generator insertion order so
/// that config rendering is deterministic across otherwise-identical passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub ip: String,
    pub port: u32,
}

impl Host {
    pub fn new(ip: impl Into<String>, port: u32) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// `http://ip:port`, the backend-address form the routing K/V sink stores.
    pub fn backend_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

/// The reconciled unit passed from generators through annotators to sinks.
///
/// A `Service`
/// produced by a generator is expected to carry at least one [`Host`] unless
/// the generator deliberately returns a headless entry; sinks must tolerate
/// empty `hosts` by emitting no backend lines rather than erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub source: String,
    pub domains: Vec<String>,
    pub application_protocol: String,
    pub transport_protocol: String,
    pub port: u32,
    pub service_port: u32,
    pub config: String,
    pub hosts: Vec<Host>,
    /// Set by the annotation `Annotator` from `Annotation::proxy_path`; not
    /// produced by any generator on its own.
    #[serde(default)]
    pub proxy_path: String,
}

impl Service {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            domains: Vec::new(),
            application_protocol: String::new(),
            proxy_path: String::new(),
            transport_protocol: "tcp".to_string(),
            port: 0,
            service_port: 0,
            config: String::new(),
            hosts: Vec::new(),
        }
    }

    pub fn is_http(&self) -> bool {
        self.application_protocol == "http"
    }

    /// Merge domains from an annotation, preserving order and de-duplicating.
    pub fn append_domains(&mut self, extra: &[String]) {
        for domain in extra {
            if !self.domains.contains(domain) {
                self.domains.push(domain.clone());
            }
        }
    }
}

/// Out-of-band per-service override, persisted in the coordination store
/// under `/proxym/annotation_api/<id>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub application_protocol: String,
    #[serde(default)]
    pub proxy_path: String,
}

impl Annotation {
    /// Sorted-domain equality used by the annotation HTTP API to decide
    /// whether a `POST` actually changes anything.
    pub fn equivalent(&self, other: &Annotation) -> bool {
        let mut a_domains = self.domains.clone();
        let mut b_domains = other.domains.clone();
        a_domains.sort();
        b_domains.sort();

        self.id == other.id
            && a_domains == b_domains
            && self.config == other.config
            && self.application_protocol == other.application_protocol
            && self.proxy_path == other.proxy_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_domains_dedupes_and_preserves_order() {
        let mut service = Service::new("svcA", "File");
        service.domains.push("a.example".to_string());
        service.append_domains(&["a.example".to_string(), "b.example".to_string()]);
        assert_eq!(service.domains, vec!["a.example", "b.example"]);
    }

    #[test]
    fn annotation_equivalence_ignores_domain_order() {
        let a = Annotation {
            id: "svcA".to_string(),
            domains: vec!["a.example".to_string(), "b.example".to_string()],
            ..Default::default()
        };
        let b = Annotation {
            id: "svcA".to_string(),
            domains: vec!["b.example".to_string(), "a.example".to_string()],
            ..Default::default()
        };
        assert!(a.equivalent(&b));
    }

    #[test]
    fn host_backend_url_format() {
        assert_eq!(Host::new("10.0.0.1", 80).backend_url(), "http://10.0.0.1:80");
    }
}
