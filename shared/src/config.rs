//! Configuration management for Lambda functions.

use std::env;

const DEFAULT_TABLE_NAME: &str = "bookings";
const DEFAULT_OUTPUT_PREFIX: &str = "parsed-emails/";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// DynamoDB table holding bookings, keyed by confirmation
    pub bookings_table: String,
    /// Bucket that receives a JSON copy of every parsed booking
    pub output_bucket: Option<String>,
    /// Key prefix for exported bookings
    pub output_prefix: String,
    /// OpenAI API key, when provided directly
    pub openai_api_key: Option<String>,
    /// ARN of the secret containing `{"api_key": "..."}`
    pub openai_api_key_secret_arn: Option<String>,
    /// Chat model used for extraction
    pub openai_model: String,
    /// Base URL of the chat-completions API
    pub openai_base_url: String,
    /// Use the template parser when the LLM is unavailable
    pub parser_fallback: bool,
    /// AWS region
    pub aws_region: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Lambda consoles happily store empty strings; treat them as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            bookings_table: get("BOOKINGS_TABLE_NAME")
                .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            output_bucket: get("OUTPUT_BUCKET"),
            output_prefix: get("OUTPUT_PREFIX")
                .unwrap_or_else(|| DEFAULT_OUTPUT_PREFIX.to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_api_key_secret_arn: get("OPENAI_API_KEY_SECRET_ARN"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            parser_fallback: get("PARSER_FALLBACK").map_or(true, |v| parse_flag(&v)),
            aws_region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        }
    }

    /// Load the AWS SDK configuration for the configured region.
    pub async fn load_aws_config(&self) -> aws_config::SdkConfig {
        aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(self.aws_region.clone()))
            .load()
            .await
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bookings_table, "bookings");
        assert_eq!(config.output_bucket, None);
        assert_eq!(config.output_prefix, "parsed-emails/");
        assert_eq!(config.openai_model, "gpt-4.1-mini");
        assert_eq!(config.openai_base_url, "https://api.openai.com/v1");
        assert!(config.parser_fallback);
        assert_eq!(config.aws_region, "us-east-1");
    }

    #[test]
    fn test_overrides_and_empty_values() {
        let config = config_from(&[
            ("BOOKINGS_TABLE_NAME", "prod-bookings"),
            ("OUTPUT_BUCKET", ""),
            ("PARSER_FALLBACK", "off"),
            ("OPENAI_API_KEY", "sk-test"),
            ("AWS_REGION", "eu-west-2"),
        ]);
        assert_eq!(config.bookings_table, "prod-bookings");
        assert_eq!(config.output_bucket, None);
        assert!(!config.parser_fallback);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.aws_region, "eu-west-2");
    }

    #[tokio::test]
    async fn test_aws_config_uses_configured_region() {
        let config = config_from(&[("AWS_REGION", "eu-west-2")]);
        let sdk_config = config.load_aws_config().await;
        assert_eq!(
            sdk_config.region().map(ToString::to_string),
            Some("eu-west-2".to_string())
        );
    }
}
