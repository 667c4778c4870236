/// Default configuration constants used across the system.

/// IAM user whose access key is rotated.
pub const DEFAULT_PRINCIPAL: &str = "terraform-cloud";

/// Terraform Cloud API root.
pub const DEFAULT_TF_BASE_URL: &str = "https://app.terraform.io/api/v2";

/// Terraform Cloud organization.
pub const DEFAULT_TF_ORGANIZATION: &str = "deo";

/// Page size for workspace and variable listings (API maximum).
pub const DEFAULT_TF_PAGE_SIZE: u32 = 100;

/// Concurrent variable writes during propagation.
pub const DEFAULT_MAX_CONCURRENCY: usize = crate::propagation::DEFAULT_MAX_CONCURRENCY;

/// Per-request timeout for remote calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = crate::propagation::DEFAULT_REQUEST_TIMEOUT.as_secs();

/// Daily at midnight UTC (seconds-resolution cron syntax).
pub const DEFAULT_SCHEDULE: &str = "0 0 0 * * *";

/// Base name for config files and the state directory.
pub const CONFIG_BASENAME: &str = "key-rotation";
