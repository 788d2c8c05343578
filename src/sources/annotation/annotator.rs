//! Decorates services from the annotation registry, overriding domains,
//! protocol, config, and proxy path per matching `Annotation`.

use async_trait::async_trait;
use std::sync::Arc;

use super::registry::AnnotationRegistry;
use crate::errors::GeneratorResult;
use crate::manager::Annotator;
use crate::models::Service;

pub struct AnnotationAnnotator {
    registry: Arc<AnnotationRegistry>,
}

impl AnnotationAnnotator {
    pub fn new(registry: Arc<AnnotationRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Annotator for AnnotationAnnotator {
    async fn annotate(&self, services: &mut Vec<Service>) -> GeneratorResult<()> {
        for service in services.iter_mut() {
            let Some(annotation) = self.registry.get(&service.id) else {
                continue;
            };

            if !annotation.config.is_empty() {
                service.config = annotation.config.clone();
            }
            if !annotation.application_protocol.is_empty() {
                service.application_protocol = annotation.application_protocol.clone();
            }
            if !annotation.proxy_path.is_empty() {
                service.proxy_path = annotation.proxy_path.clone();
            }
            service.append_domains(&annotation.domains);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Annotation;

    #[tokio::test]
    async fn overrides_only_nonempty_fields_and_appends_domains() {
        let registry = Arc::new(AnnotationRegistry::new());
        registry.add(Annotation {
            id: "svcA".to_string(),
            domains: vec!["a.example".to_string()],
            config: "option httpchk".to_string(),
            application_protocol: String::new(),
            proxy_path: String::new(),
        });
        let annotator = AnnotationAnnotator::new(registry);

        let mut service = Service::new("svcA", "File");
        service.application_protocol = "http".to_string();
        service.domains.push("original.example".to_string());
        let mut services = vec![service];

        annotator.annotate(&mut services).await.unwrap();

        let svc = &services[0];
        assert_eq!(svc.config, "option httpchk");
        assert_eq!(svc.application_protocol, "http");
        assert_eq!(svc.domains, vec!["original.example", "a.example"]);
    }

    #[tokio::test]
    async fn services_without_a_matching_annotation_are_untouched() {
        let registry = Arc::new(AnnotationRegistry::new());
        let annotator = AnnotationAnnotator::new(registry);
        let mut services = vec![Service::new("svcB", "File")];
        annotator.annotate(&mut services).await.unwrap();
        assert_eq!(services[0].config, "");
    }
}
