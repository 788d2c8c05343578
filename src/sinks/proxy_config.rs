//! Renders the reverse-proxy config file from the fused inventory and
//! reloads the live process. The template engine itself is out of scope
//! (spec's template-engine non-goal): callers inject a [`TemplateRenderer`]
//! and plug in whichever engine fits their proxy.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::errors::GeneratorError;
use crate::manager::ConfigGenerator;
use crate::models::Service;

/// Renders the template text against the current inventory. Kept opaque
/// on purpose — a real deployment plugs in a template engine such as
/// `tera` here; this crate ships no concrete implementation.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, services: &[Service]) -> Result<String, GeneratorError>;
}

/// How the rendered config is handed to the live proxy process.
#[async_trait]
pub trait ReloadStrategy: Send + Sync {
    async fn reload(&self, config_path: &std::path::Path) -> Result<(), GeneratorError>;
}

/// Run a check command against the new file, then a reload command.
/// `reload_command` may contain the literal placeholder `%%s`, substituted
/// with `config_path`.
pub struct CheckAndReload {
    pub check_command: Option<String>,
    pub reload_command: String,
}

#[async_trait]
impl ReloadStrategy for CheckAndReload {
    async fn reload(&self, config_path: &std::path::Path) -> Result<(), GeneratorError> {
        if let Some(check_command) = &self.check_command {
            let output = Command::new("/bin/bash")
                .arg("-c")
                .arg(check_command)
                .output()
                .await
                .map_err(|e| GeneratorError::Reload(format!("check command: {e}")))?;
            if !output.status.success() {
                return Err(GeneratorError::Reload(format!(
                    "check of proxy configuration failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                )));
            }
        }

        let reload_command = if self.reload_command.contains("%%s") {
            self.reload_command.replace("%%s", &config_path.to_string_lossy())
        } else {
            self.reload_command.clone()
        };

        info!("Reloading proxy configuration");
        let output = Command::new("/bin/bash")
            .arg("-c")
            .arg(&reload_command)
            .output()
            .await
            .map_err(|e| GeneratorError::Reload(format!("reload command: {e}")))?;
        if !output.status.success() {
            return Err(GeneratorError::Reload(format!(
                "failed to reload proxy configuration: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

/// Invoke the proxy binary directly with `-f <config> -p <pidpath>`, plus
/// `-sf <old-pid>` for a graceful handoff when a pid file is readable.
pub struct DirectInvoke {
    pub binary: PathBuf,
    pub pid_path: PathBuf,
}

#[async_trait]
impl ReloadStrategy for DirectInvoke {
    async fn reload(&self, config_path: &std::path::Path) -> Result<(), GeneratorError> {
        let mut args = vec![
            "-f".to_string(),
            config_path.to_string_lossy().to_string(),
            "-p".to_string(),
            self.pid_path.to_string_lossy().to_string(),
        ];

        if let Ok(pid) = std::fs::read_to_string(&self.pid_path) {
            let pid = pid.trim();
            if !pid.is_empty() {
                args.push("-sf".to_string());
                args.push(pid.to_string());
            }
        }

        info!(binary = %self.binary.display(), "Restarting proxy");
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| GeneratorError::Reload(format!("{}: {e}", self.binary.display())))?;
        if !output.status.success() {
            return Err(GeneratorError::Reload(format!(
                "failed to start proxy: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

pub struct ProxyConfigGenerator {
    template_path: PathBuf,
    config_path: PathBuf,
    renderer: Arc<dyn TemplateRenderer>,
    reload: Arc<dyn ReloadStrategy>,
}

impl ProxyConfigGenerator {
    pub fn new(
        template_path: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        renderer: Arc<dyn TemplateRenderer>,
        reload: Arc<dyn ReloadStrategy>,
    ) -> Self {
        Self {
            template_path: template_path.into(),
            config_path: config_path.into(),
            renderer,
            reload,
        }
    }

    fn drop_blank_lines(rendered: &str) -> String {
        let kept: Vec<&str> = rendered
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect();
        let mut out = kept.join("\n");
        out.push('\n');
        out
    }
}

#[async_trait]
impl ConfigGenerator for ProxyConfigGenerator {
    async fn generate(&self, services: &[Service]) -> Result<(), GeneratorError> {
        let template = match std::fs::read_to_string(&self.template_path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %self.template_path.display(), error = %e, "Template file unavailable, skipping this pass");
                return Ok(());
            }
        };

        let rendered = self.renderer.render(&template, services)?;
        let new_config = Self::drop_blank_lines(&rendered);

        let current_config = std::fs::read_to_string(&self.config_path).unwrap_or_default();
        if current_config == new_config {
            return Ok(());
        }

        std::fs::write(&self.config_path, &new_config)?;
        self.reload.reload(&self.config_path).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "proxy_config"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct EchoRenderer;
    impl TemplateRenderer for EchoRenderer {
        fn render(&self, template: &str, services: &[Service]) -> Result<String, GeneratorError> {
            Ok(format!("{template}\n{} services", services.len()))
        }
    }

    #[derive(Default)]
    struct CountingReload {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReloadStrategy for CountingReload {
        async fn reload(&self, _config_path: &std::path::Path) -> Result<(), GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn identical_render_does_not_reload() {
        let dir = tempdir().unwrap();
        let template_path = dir.path().join("template.cfg");
        let config_path = dir.path().join("haproxy.cfg");
        std::fs::write(&template_path, "global\n\n").unwrap();

        let reload = Arc::new(CountingReload::default());
        let generator = ProxyConfigGenerator::new(
            &template_path,
            &config_path,
            Arc::new(EchoRenderer),
            reload.clone(),
        );

        generator.generate(&[]).await.unwrap();
        generator.generate(&[]).await.unwrap();

        assert_eq!(reload.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_template_skips_the_pass_without_error() {
        let dir = tempdir().unwrap();
        let generator = ProxyConfigGenerator::new(
            dir.path().join("missing.cfg"),
            dir.path().join("haproxy.cfg"),
            Arc::new(EchoRenderer),
            Arc::new(CountingReload::default()),
        );
        assert!(generator.generate(&[]).await.is_ok());
        assert!(!dir.path().join("haproxy.cfg").exists());
    }

    #[test]
    fn drop_blank_lines_removes_whitespace_only_lines() {
        let rendered = "frontend foo\n\n   \nbackend bar\n";
        let cleaned = ProxyConfigGenerator::drop_blank_lines(rendered);
        assert_eq!(cleaned, "frontend foo\nbackend bar\n");
    }
}
