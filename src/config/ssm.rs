//! Parameter Store overrides.
//!
//! Every parameter directly under the configured path becomes an override
//! key: `/key-rotation/tf_token` is read as `TF_TOKEN`.

use super::AwsConfig;
use anyhow::{Context, Result};
use aws_sdk_ssm::error::DisplayErrorContext;
use std::collections::HashMap;
use tracing::debug;

/// Fetch all parameters at `path` (non-recursive, decrypted).
pub async fn load_parameters(aws: &AwsConfig, path: &str) -> Result<HashMap<String, String>> {
    let sdk_config = aws.load_sdk_config().await;
    let client = aws_sdk_ssm::Client::new(&sdk_config);

    let mut params = HashMap::new();
    let mut next_token: Option<String> = None;

    loop {
        let mut request = client
            .get_parameters_by_path()
            .path(path)
            .recursive(false)
            .with_decryption(true);

        if let Some(token) = next_token {
            request = request.next_token(token);
        }

        let output = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| format!("get_parameters_by_path {path}"))?;

        for param in output.parameters() {
            if let (Some(name), Some(value)) = (param.name(), param.value()) {
                let key = parameter_key(path, name);
                debug!("SSM: overriding {key}");
                params.insert(key, value.to_string());
            }
        }

        match output.next_token() {
            Some(token) => next_token = Some(token.to_string()),
            None => break,
        }
    }

    Ok(params)
}

/// Strip the path prefix and separators, then uppercase.
pub fn parameter_key(path: &str, name: &str) -> String {
    name.strip_prefix(path)
        .unwrap_or(name)
        .replace('/', "")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_names_become_override_keys() {
        assert_eq!(parameter_key("/rotator", "/rotator/tf_token"), "TF_TOKEN");
        assert_eq!(
            parameter_key("/rotator", "/rotator/iam_tf_username"),
            "IAM_TF_USERNAME"
        );
    }

    #[test]
    fn names_outside_the_path_are_still_normalized() {
        assert_eq!(parameter_key("/rotator", "/other/tf_org_name"), "OTHERTF_ORG_NAME");
    }
}
