mod defaults;
pub mod ssm;
mod types;
mod validation;

pub use defaults::*;
pub use types::*;
pub use validation::*;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Top-level key-rotation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub principal: PrincipalConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub terraform: TerraformConfig,
    #[serde(default)]
    pub propagation: PropagationConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub ssm: SsmConfig,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(find_config_file)
            .unwrap_or_else(|| PathBuf::from(format!("{CONFIG_BASENAME}.json")));

        let mut config = if config_path.exists() {
            info!("Loading config from {}", config_path.display());
            load_config_file(&config_path)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration, then layer Parameter Store values on top when a
    /// parameter path is configured.
    pub async fn load_with_ssm(path: Option<&str>) -> Result<Self> {
        let mut config = Self::load(path)?;

        if let Some(parameter_path) = config.ssm.parameter_path.clone() {
            match ssm::load_parameters(&config.aws, &parameter_path).await {
                Ok(params) => {
                    info!(path = %parameter_path, count = params.len(), "Applying SSM parameters");
                    config.apply_overrides(|key| params.get(key).cloned());
                }
                Err(e) => {
                    tracing::error!(path = %parameter_path, "Encountered an error loading config from SSM -- {e:#}");
                }
            }
        }

        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &str) -> Result<()> {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(app_name) = std::env::var("APP_NAME") {
            if !app_name.is_empty() {
                self.ssm.parameter_path = Some(format!("/{app_name}"));
            }
        }

        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key/value source (environment, SSM).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(name) = lookup("IAM_TF_USERNAME") {
            self.principal.name = name;
        }

        if let Some(region) = lookup("AWS_REGION") {
            self.aws.region = Some(region);
        }

        if let Some(endpoint) = lookup("AWS_ENDPOINT_URL") {
            self.aws.endpoint_url = Some(endpoint);
        }

        if let Some(token) = lookup("TF_TOKEN") {
            self.terraform.token = Some(token);
        }

        if let Some(org) = lookup("TF_ORG_NAME") {
            self.terraform.organization = org;
        }

        if let Some(url) = lookup("TF_BASE_URL") {
            self.terraform.base_url = url;
        }

        if let Some(workspaces) = lookup("TF_WORKSPACES") {
            self.terraform.workspaces = workspaces
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(n) = parse_override(&lookup, "KEY_ROTATION_MAX_CONCURRENCY") {
            self.propagation.max_concurrency = n;
        }

        if let Some(secs) = parse_override(&lookup, "KEY_ROTATION_REQUEST_TIMEOUT_SECS") {
            self.propagation.request_timeout_secs = secs;
        }

        if let Some(ratio) = parse_override(&lookup, "KEY_ROTATION_MIN_SUCCESS_RATIO") {
            self.propagation.min_success_ratio = Some(ratio);
        }

        if let Some(expr) = lookup("KEY_ROTATION_SCHEDULE") {
            self.schedule.expr = expr;
        }
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {key}: cannot parse '{raw}'");
            None
        }
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = ["json", "yaml", "yml", "toml"]
        .iter()
        .map(|ext| PathBuf::from(format!("{CONFIG_BASENAME}.{ext}")));

    for path in candidates {
        if path.exists() {
            return Some(path);
        }
    }

    // Check home directory
    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(format!(".{CONFIG_BASENAME}")).join("config.json");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Load configuration from a file path.
fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;

    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        _ => {
            // Try JSON5 first, then regular JSON
            json5::from_str(&content).or_else(|_| {
                serde_json::from_str(&content).map_err(|e| json5::Error::Message {
                    msg: e.to_string(),
                    location: None,
                })
            })?
        }
    };

    Ok(config)
}
