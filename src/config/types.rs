use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Principal / AWS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalConfig {
    /// IAM user name.
    pub name: String,
}

impl Default for PrincipalConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PRINCIPAL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AwsConfig {
    /// Region; falls back to the SDK's environment/profile resolution.
    pub region: Option<String>,
    /// Custom endpoint (LocalStack and similar).
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    pub async fn load_sdk_config(&self) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        loader.load().await
    }
}

// ============================================================================
// Terraform Cloud
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerraformConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_organization")]
    pub organization: String,
    /// API token. Usually supplied through `TF_TOKEN` or SSM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Restrict rotation to these workspace names. Empty means all.
    #[serde(default)]
    pub workspaces: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_base_url() -> String {
    DEFAULT_TF_BASE_URL.to_string()
}

fn default_organization() -> String {
    DEFAULT_TF_ORGANIZATION.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_TF_PAGE_SIZE
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            organization: default_organization(),
            token: None,
            workspaces: Vec::new(),
            page_size: default_page_size(),
        }
    }
}

// ============================================================================
// Propagation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationConfig {
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    /// Keep the previous key unless at least this fraction of writes succeeded.
    pub min_success_ratio: Option<f64>,
}

impl PropagationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            min_success_ratio: None,
        }
    }
}

// ============================================================================
// Schedule / SSM
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub expr: String,
    pub stagger_ms: Option<u64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            expr: DEFAULT_SCHEDULE.to_string(),
            stagger_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SsmConfig {
    /// Parameter Store path whose parameters override configuration.
    pub parameter_path: Option<String>,
}
