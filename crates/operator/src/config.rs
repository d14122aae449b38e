use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_MAX_JOBS: usize = 1000;
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 20;
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 30;
pub const DEFAULT_MAX_LOG_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub kube: KubeConfig,
    pub controller: ControllerConfig,
    #[serde(default)]
    pub templates: JobTemplates,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KubeConfig {
    /// Namespace to watch; `None` watches every namespace
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Ceiling on outstanding dependent jobs
    pub max_jobs: usize,
    pub resync_period_secs: u64,
    pub error_requeue_secs: u64,
    /// Captured logs are cut to this many bytes, keeping the tail
    pub max_log_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_path: Option<PathBuf>,
}

impl ControllerConfig {
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            error_requeue_secs: DEFAULT_ERROR_REQUEUE_SECS,
            max_log_bytes: DEFAULT_MAX_LOG_BYTES,
            templates_path: None,
        }
    }
}

/// Container definition for one job type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRuntime {
    pub image: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Job type to container table, with a fallback for unknown types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTemplates {
    #[serde(default = "default_runtime")]
    pub default: JobRuntime,
    #[serde(default)]
    pub types: BTreeMap<String, JobRuntime>,
}

fn default_runtime() -> JobRuntime {
    JobRuntime {
        image: "busybox:1.36".to_string(),
        command: vec!["sh".to_string(), "-c".to_string()],
        args: vec!["echo \"$JOB_DATA\"".to_string()],
        env: BTreeMap::new(),
    }
}

impl Default for JobTemplates {
    fn default() -> Self {
        Self {
            default: default_runtime(),
            types: BTreeMap::new(),
        }
    }
}

impl JobTemplates {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let templates: JobTemplates = serde_yaml::from_str(yaml)?;
        templates.validate()?;
        Ok(templates)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn runtime_for(&self, job_type: &str) -> &JobRuntime {
        self.types.get(job_type).unwrap_or(&self.default)
    }

    fn validate(&self) -> Result<()> {
        let entries = std::iter::once(("default", &self.default))
            .chain(self.types.iter().map(|(k, v)| (k.as_str(), v)));
        for (job_type, runtime) in entries {
            if runtime.image.is_empty() {
                return Err(Error::Config(format!(
                    "job template '{}' has no image",
                    job_type
                )));
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let controller = ControllerConfig {
            max_jobs: env_parse("MAX_JOBS")?.unwrap_or(DEFAULT_MAX_JOBS),
            resync_period_secs: env_parse("RESYNC_PERIOD_SECS")?
                .unwrap_or(DEFAULT_RESYNC_PERIOD_SECS),
            error_requeue_secs: env_parse("ERROR_REQUEUE_SECS")?
                .unwrap_or(DEFAULT_ERROR_REQUEUE_SECS),
            max_log_bytes: env_parse("MAX_LOG_BYTES")?.unwrap_or(DEFAULT_MAX_LOG_BYTES),
            templates_path: std::env::var("JOB_TEMPLATES_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        };

        let mut config = Config {
            kube: KubeConfig {
                namespace: std::env::var("WATCH_NAMESPACE")
                    .ok()
                    .filter(|s| !s.is_empty()),
            },
            controller,
            templates: JobTemplates::default(),
        };
        config.reload_templates()?;
        config.validate()?;

        Ok(config)
    }

    /// Re-reads the job template table from `controller.templates_path`.
    pub fn reload_templates(&mut self) -> Result<()> {
        match &self.controller.templates_path {
            Some(path) => {
                self.templates = JobTemplates::from_file(path)?;
                tracing::info!(
                    "Loaded {} job template(s) from {}",
                    self.templates.types.len(),
                    path.display()
                );
            }
            None => {
                tracing::warn!("JOB_TEMPLATES_PATH is not set. Every job type uses the default template.");
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.controller.max_jobs == 0 {
            return Err(Error::Config("MAX_JOBS must be greater than zero".to_string()));
        }
        if self.controller.resync_period_secs == 0 {
            return Err(Error::Config(
                "RESYNC_PERIOD_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kube: KubeConfig::default(),
            controller: ControllerConfig::default(),
            templates: JobTemplates::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, value))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.controller.max_jobs, DEFAULT_MAX_JOBS);
        assert_eq!(config.controller.resync_period(), Duration::from_secs(20));
    }

    #[test]
    fn zero_max_jobs_is_rejected() {
        let mut config = Config::default();
        config.controller.max_jobs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn templates_parse_from_yaml() {
        let yaml = r#"
types:
  render:
    image: renderer:2.1
    command: ["render"]
    args: ["--input", "{{ data }}"]
    env:
      MODE: fast
"#;
        let templates = JobTemplates::from_yaml(yaml).unwrap();
        let render = templates.runtime_for("render");
        assert_eq!(render.image, "renderer:2.1");
        assert_eq!(render.args, vec!["--input", "{{ data }}"]);
        assert_eq!(render.env.get("MODE").map(String::as_str), Some("fast"));

        // Unknown types fall back to the built-in default
        assert_eq!(templates.runtime_for("other").image, "busybox:1.36");
    }

    #[test]
    fn template_without_image_is_rejected() {
        let yaml = r#"
types:
  broken:
    image: ""
    command: ["true"]
"#;
        assert!(matches!(JobTemplates::from_yaml(yaml), Err(Error::Config(_))));
    }
}
