//! The filesystem source adapter: services described by hand as JSON
//! files in a directory, refreshed on any change to that directory.

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{error, warn};

use crate::errors::GeneratorError;
use crate::manager::{try_refresh, Notifier, QuitSignal, RefreshSender, ServiceGenerator};
use crate::models::Service;

/// Reads every `*.json` file in `directory` as a `Service`. Subdirectories
/// and non-JSON files are silently skipped; any I/O or parse error aborts
/// the pass, matching the original's "stop on first bad file" behavior.
pub struct FileGenerator {
    directory: PathBuf,
}

impl FileGenerator {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl ServiceGenerator for FileGenerator {
    async fn generate(&self) -> Result<Vec<Service>, GeneratorError> {
        let mut services = Vec::new();

        let entries = std::fs::read_dir(&self.directory)?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let contents = std::fs::read_to_string(&path)?;
            let mut service: Service = serde_json::from_str(&contents)
                .map_err(|e| GeneratorError::Parse(format!("{}: {e}", path.display())))?;
            service.source = "File".to_string();
            services.push(service);
        }

        Ok(services)
    }

    fn name(&self) -> &str {
        "file"
    }
}

fn is_json_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
}

/// Watches `directory` for create/modify/remove of `*.json` files,
/// non-blocking-refreshing on each. The `notify` watcher callback runs on
/// its own thread, so changes are bridged to the async world through a
/// small internal channel.
pub struct FileNotifier {
    directory: PathBuf,
}

impl FileNotifier {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl Notifier for FileNotifier {
    async fn run(self: Box<Self>, refresh: RefreshSender, quit: QuitSignal) {
        let (tx, mut rx) = tokio_mpsc::unbounded_channel::<Event>();

        let watcher_result: notify::Result<RecommendedWatcher> =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => error!(error = %e, "Filesystem watch error"),
            });

        let mut watcher = match watcher_result {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "Failed to create filesystem watcher, module disabled");
                return;
            }
        };

        if let Err(e) = watcher.watch(Path::new(&self.directory), RecursiveMode::NonRecursive) {
            error!(directory = %self.directory.display(), error = %e, "Failed to watch directory, module disabled");
            return;
        }

        loop {
            tokio::select! {
                _ = quit.cancelled() => {
                    let _ = watcher.unwatch(Path::new(&self.directory));
                    return;
                }
                event = rx.recv() => {
                    match event {
                        Some(event) if is_json_event(&event) => try_refresh(&refresh),
                        Some(_) => {}
                        None => {
                            warn!("Filesystem watch channel closed, module exiting");
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reads_json_files_and_skips_others_and_subdirectories() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"id":"a","source":"","domains":[],"application_protocol":"","transport_protocol":"tcp","port":80,"service_port":80,"config":"","hosts":[],"proxy_path":""}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let generator = FileGenerator::new(dir.path());
        let services = generator.generate().await.unwrap();

        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, "a");
        assert_eq!(services[0].source, "File");
    }

    #[tokio::test]
    async fn malformed_json_aborts_the_pass() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let generator = FileGenerator::new(dir.path());
        assert!(generator.generate().await.is_err());
    }
}
