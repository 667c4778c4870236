use super::Config;
use anyhow::Result;
use std::str::FromStr;
use tracing::warn;

/// Validation errors for configuration.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl ConfigValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate a configuration object.
pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    if config.principal.name.trim().is_empty() {
        errors.push(ConfigValidationError::new(
            "principal.name",
            "IAM user name is required",
        ));
    }

    // Terraform Cloud
    match config.terraform.token.as_deref() {
        None | Some("") => errors.push(ConfigValidationError::new(
            "terraform.token",
            "API token is required (set TF_TOKEN)",
        )),
        Some(_) => {}
    }

    if config.terraform.organization.trim().is_empty() {
        errors.push(ConfigValidationError::new(
            "terraform.organization",
            "Organization name is required",
        ));
    }

    if let Err(e) = url::Url::parse(&config.terraform.base_url) {
        errors.push(ConfigValidationError::new(
            "terraform.baseUrl",
            format!("Invalid URL '{}': {e}", config.terraform.base_url),
        ));
    }

    if config.terraform.page_size == 0 {
        errors.push(ConfigValidationError::new(
            "terraform.pageSize",
            "Page size must be greater than 0",
        ));
    }

    if config.terraform.workspaces.is_empty() {
        warn!("No target workspaces configured; every workspace in the organization receives the new key");
    }

    // Propagation
    if config.propagation.max_concurrency == 0 {
        errors.push(ConfigValidationError::new(
            "propagation.maxConcurrency",
            "Concurrency must be greater than 0",
        ));
    }

    if config.propagation.request_timeout_secs == 0 {
        errors.push(ConfigValidationError::new(
            "propagation.requestTimeoutSecs",
            "Request timeout must be greater than 0",
        ));
    }

    if let Some(ratio) = config.propagation.min_success_ratio {
        if !(0.0..=1.0).contains(&ratio) {
            errors.push(ConfigValidationError::new(
                "propagation.minSuccessRatio",
                format!("Ratio must be between 0 and 1, got {ratio}"),
            ));
        }
    }

    if let Err(e) = cron::Schedule::from_str(&config.schedule.expr) {
        errors.push(ConfigValidationError::new(
            "schedule.expr",
            format!("Invalid cron expression '{}': {e}", config.schedule.expr),
        ));
    }

    errors
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.terraform.token = Some("token".to_string());
        config
    }

    fn paths(config: &Config) -> Vec<String> {
        validate_config(config).into_iter().map(|e| e.path).collect()
    }

    #[test]
    fn default_config_only_lacks_a_token() {
        assert_eq!(paths(&Config::default()), vec!["terraform.token"]);
    }

    #[test]
    fn complete_config_is_valid() {
        assert!(validate_config_object(&valid_config()).is_ok());
    }

    #[test]
    fn rejects_bad_base_url_and_schedule() {
        let mut config = valid_config();
        config.terraform.base_url = "not a url".to_string();
        config.schedule.expr = "every day".to_string();

        assert_eq!(paths(&config), vec!["terraform.baseUrl", "schedule.expr"]);
    }

    #[test]
    fn rejects_out_of_range_propagation_settings() {
        let mut config = valid_config();
        config.propagation.max_concurrency = 0;
        config.propagation.request_timeout_secs = 0;
        config.propagation.min_success_ratio = Some(1.5);

        assert_eq!(
            paths(&config),
            vec![
                "propagation.maxConcurrency",
                "propagation.requestTimeoutSecs",
                "propagation.minSuccessRatio",
            ]
        );
    }

    #[test]
    fn error_message_lists_every_problem() {
        let mut config = Config::default();
        config.principal.name = " ".to_string();

        let err = validate_config_object(&config).unwrap_err().to_string();
        assert!(err.contains("principal.name: IAM user name is required"));
        assert!(err.contains("terraform.token"));
    }
}
