//! End-to-end exercise of the Manager's refresh loop: a real filesystem
//! watch drives a refresh, which a real `FileGenerator` turns into a
//! `Service`, captured by a recording sink.

use async_trait::async_trait;
use proxym::errors::GeneratorError;
use proxym::manager::{ConfigGenerator, Manager};
use proxym::models::Service;
use proxym::sources::file::{FileGenerator, FileNotifier};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

struct RecordingSink {
    passes: Arc<Mutex<Vec<Vec<Service>>>>,
}

#[async_trait]
impl ConfigGenerator for RecordingSink {
    async fn generate(&self, services: &[Service]) -> Result<(), GeneratorError> {
        self.passes.lock().unwrap().push(services.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

async fn free_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn filesystem_add_triggers_a_refresh_that_picks_up_the_new_service() {
    let dir = tempdir().unwrap();
    let passes = Arc::new(Mutex::new(Vec::new()));

    let mut manager = Manager::new(free_addr().await);
    manager.add_service_generator(Box::new(FileGenerator::new(dir.path())));
    manager.add_notifier(Box::new(FileNotifier::new(dir.path())));
    manager.add_config_generator(Box::new(RecordingSink {
        passes: passes.clone(),
    }));

    let quit = CancellationToken::new();
    let run_quit = quit.clone();
    let handle = tokio::spawn(async move { manager.run(run_quit).await });

    // Give the startup pass time to run with an empty directory.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(passes.lock().unwrap().len(), 1);
    assert!(passes.lock().unwrap()[0].is_empty());

    std::fs::write(
        dir.path().join("new-service.json"),
        r#"{"id":"svcA","source":"","domains":["a.example"],"application_protocol":"http","transport_protocol":"tcp","port":80,"service_port":80,"config":"","hosts":[{"ip":"10.0.0.1","port":80}],"proxy_path":""}"#,
    )
    .unwrap();

    // Wait for the watch event to propagate into a new pass.
    let mut observed = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let passes = passes.lock().unwrap();
        if passes.iter().any(|pass| !pass.is_empty()) {
            observed = true;
            break;
        }
    }
    assert!(observed, "expected a reconciliation pass to pick up the new file");

    quit.cancel();
    handle.await.unwrap().unwrap();
}
