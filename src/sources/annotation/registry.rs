//! The in-memory `id -> Annotation` registry: the single piece of
//! cross-task state the annotation module exposes to the `Annotator`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::Annotation;

#[derive(Default)]
pub struct AnnotationRegistry {
    entries: Mutex<HashMap<String, Annotation>>,
}

impl AnnotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, annotation: Annotation) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(annotation.id.clone(), annotation);
    }

    pub fn delete(&self, id: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<Annotation> {
        let entries = self.entries.lock().unwrap();
        entries.get(id).cloned()
    }

    pub fn has(&self, id: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_round_trips() {
        let registry = AnnotationRegistry::new();
        registry.add(Annotation {
            id: "svcA".to_string(),
            ..Default::default()
        });
        assert!(registry.has("svcA"));
        assert_eq!(registry.get("svcA").unwrap().id, "svcA");
    }

    #[test]
    fn delete_removes_entry() {
        let registry = AnnotationRegistry::new();
        registry.add(Annotation {
            id: "svcA".to_string(),
            ..Default::default()
        });
        registry.delete("svcA");
        assert!(!registry.has("svcA"));
    }
}
