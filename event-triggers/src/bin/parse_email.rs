//! Parse a local `.eml` file and print the extracted booking as JSON.
//!
//! Uses the same configuration as the Lambda: `OPENAI_API_KEY` (or
//! `OPENAI_API_KEY_SECRET_ARN`) enables LLM extraction, otherwise the
//! Premier Inn template parser is used.

use anyhow::{bail, Context};
use clap::Parser;
use shared::{resolve_openai_api_key, Config, EmailParser};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "parse_email", about = "Extract a booking from a raw email file")]
struct Cli {
    /// Path to the raw RFC 822 email
    path: PathBuf,

    /// Skip the LLM and use the template parser only
    #[arg(long)]
    fallback_only: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let raw = tokio::fs::read(&cli.path)
        .await
        .with_context(|| format!("Failed to read {}", cli.path.display()))?;

    let parser = if cli.fallback_only {
        EmailParser::template_only()
    } else {
        let config = Config::from_env();
        let needs_secret =
            config.openai_api_key.is_none() && config.openai_api_key_secret_arn.is_some();
        let api_key = if needs_secret {
            let aws_config = config.load_aws_config().await;
            let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);
            resolve_openai_api_key(&config, &secrets_client).await
        } else {
            config.openai_api_key.clone()
        };
        EmailParser::from_config(&config, api_key)?
    };

    let booking = match parser.parse(&raw).await {
        Ok(booking) => booking,
        Err(e) if e.is_not_a_booking() => bail!("{} is not a booking: {}", cli.path.display(), e),
        Err(e) => return Err(e).context("Failed to parse email"),
    };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&booking)?
    } else {
        serde_json::to_string(&booking)?
    };
    println!("{}", json);

    Ok(())
}
