//! AWS Secrets Manager integration.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::{Config, Error, Result};

/// Cached secrets with lazy initialization.
static SECRETS_CACHE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn get_cache() -> &'static RwLock<HashMap<String, String>> {
    SECRETS_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// OpenAI credentials stored in Secrets Manager.
#[derive(Debug, Deserialize)]
pub struct OpenAiCredentials {
    pub api_key: Option<String>,
}

/// Get a secret value from Secrets Manager with caching.
pub async fn get_secret(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    // Check cache first
    {
        let cache = get_cache().read().await;
        if let Some(value) = cache.get(secret_arn) {
            return Ok(value.clone());
        }
    }

    let response = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

    let secret_string = response
        .secret_string()
        .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))?
        .to_string();

    {
        let mut cache = get_cache().write().await;
        cache.insert(secret_arn.to_string(), secret_string.clone());
    }

    Ok(secret_string)
}

/// Parse the `api_key` field out of a secret string.
pub fn parse_api_key(secret_string: &str) -> Result<Option<String>> {
    let credentials: OpenAiCredentials = serde_json::from_str(secret_string)?;
    Ok(credentials.api_key.filter(|k| !k.trim().is_empty()))
}

/// Resolve the OpenAI API key.
///
/// The environment wins; otherwise the key is read from Secrets Manager.
/// Failures are logged and reported as "no key" so that extraction can still
/// run on the template parser.
pub async fn resolve_openai_api_key(config: &Config, client: &SecretsClient) -> Option<String> {
    if let Some(key) = &config.openai_api_key {
        return Some(key.clone());
    }

    let secret_arn = config.openai_api_key_secret_arn.as_deref()?;

    match get_secret(client, secret_arn).await.and_then(|s| parse_api_key(&s)) {
        Ok(Some(key)) => {
            info!("Loaded OpenAI API key from Secrets Manager");
            Some(key)
        }
        Ok(None) => {
            error!(secret_arn, "Secret has no api_key field");
            None
        }
        Err(e) => {
            error!(secret_arn, error = %e, "Error fetching OpenAI API key");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_secretsmanager::config::retry::RetryConfig;
    use aws_sdk_secretsmanager::config::{BehaviorVersion, Credentials, Region};

    /// A client whose every call fails fast: nothing listens on the endpoint.
    fn unreachable_client() -> SecretsClient {
        let config = aws_sdk_secretsmanager::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url("http://127.0.0.1:1")
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .retry_config(RetryConfig::disabled())
            .build();
        SecretsClient::from_conf(config)
    }

    fn config_with(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[tokio::test]
    async fn test_env_key_wins_over_secret() {
        let config = config_with(&[
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_API_KEY_SECRET_ARN", "arn:aws:secretsmanager:us-east-1:1:secret:env-wins"),
        ]);
        let key = resolve_openai_api_key(&config, &unreachable_client()).await;
        assert_eq!(key.as_deref(), Some("sk-env"));
    }

    #[tokio::test]
    async fn test_secret_failure_yields_no_key() {
        let config = config_with(&[(
            "OPENAI_API_KEY_SECRET_ARN",
            "arn:aws:secretsmanager:us-east-1:1:secret:unreachable",
        )]);
        assert_eq!(resolve_openai_api_key(&config, &unreachable_client()).await, None);

        assert_eq!(resolve_openai_api_key(&config_with(&[]), &unreachable_client()).await, None);
    }

    #[tokio::test]
    async fn test_cached_secret_is_used() {
        let arn = "arn:aws:secretsmanager:us-east-1:1:secret:cached";
        get_cache()
            .write()
            .await
            .insert(arn.to_string(), r#"{"api_key":"sk-cached"}"#.to_string());

        let config = config_with(&[("OPENAI_API_KEY_SECRET_ARN", arn)]);
        let key = resolve_openai_api_key(&config, &unreachable_client()).await;
        assert_eq!(key.as_deref(), Some("sk-cached"));
    }

    #[test]
    fn test_parse_api_key() {
        let key = parse_api_key(r#"{"api_key":"sk-abc123"}"#).unwrap();
        assert_eq!(key.as_deref(), Some("sk-abc123"));
    }

    #[test]
    fn test_parse_api_key_missing_or_blank() {
        assert_eq!(parse_api_key(r#"{"other":"x"}"#).unwrap(), None);
        assert_eq!(parse_api_key(r#"{"api_key":"  "}"#).unwrap(), None);
        assert!(parse_api_key("not json").is_err());
    }
}
