use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub github: GithubConfig,
    pub merge: MergeConfig,
    pub checks: ChecksConfig,
    pub workflows: WorkflowsConfig,
    pub release_notes: ReleaseNotesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    pub base_branch: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            base_branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub method: String,
    pub delete_branch: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            method: "squash".to_string(),
            delete_branch: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            poll_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    pub timeout_secs: u64,
    pub initial_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub miss_interval_secs: u64,
    /// Only wait for these workflows after a release; empty means all.
    pub names: Vec<String>,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            initial_delay_secs: 20,
            poll_interval_secs: 15,
            miss_interval_secs: 10,
            names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseNotesConfig {
    pub max_tokens: usize,
}

impl Default for ReleaseNotesConfig {
    fn default() -> Self {
        Self { max_tokens: 50000 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            github: GithubConfig::default(),
            merge: MergeConfig::default(),
            checks: ChecksConfig::default(),
            workflows: WorkflowsConfig::default(),
            release_notes: ReleaseNotesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.github.base_branch, "main");
        assert_eq!(config.merge.method, "squash");
        assert!(config.merge.delete_branch);
        assert_eq!(config.checks.timeout_secs, 3600);
        assert_eq!(config.workflows.timeout_secs, 1800);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str(
            "github:\n  base_branch: develop\nmerge:\n  method: rebase\n",
        )
        .unwrap();
        assert_eq!(config.github.base_branch, "develop");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.merge.method, "rebase");
        assert_eq!(config.checks.poll_interval_secs, 10);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("shipr.yml");
        fs::write(&path, "workflows:\n  names: [publish]\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.workflows.names, vec!["publish"]);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/shipr.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
