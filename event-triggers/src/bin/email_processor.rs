//! Email Processor Lambda - Turns booking emails dropped in S3 into bookings.
//!
//! This Lambda is triggered by S3 object-created notifications and:
//! 1. Downloads each raw email from S3
//! 2. Extracts the booking with the LLM (Premier Inn template as fallback)
//! 3. Upserts the booking into DynamoDB, keyed by confirmation
//! 4. Optionally writes a JSON copy to `OUTPUT_BUCKET`

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use shared::{
    resolve_openai_api_key, Config, DynamoBookingRepository, EmailParser, EmailProcessor,
    HandlerResponse, ResultExporter, S3EmailSource, S3Notification, S3ResultExporter,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct AppState {
    processor: EmailProcessor,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let aws_config = config.load_aws_config().await;
        let s3_client = aws_sdk_s3::Client::new(&aws_config);
        let dynamo_client = aws_sdk_dynamodb::Client::new(&aws_config);
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);

        let api_key = resolve_openai_api_key(&config, &secrets_client).await;
        let parser = EmailParser::from_config(&config, api_key)?;

        let exporter = config.output_bucket.clone().map(|bucket| {
            Arc::new(S3ResultExporter::new(
                s3_client.clone(),
                bucket,
                config.output_prefix.clone(),
            )) as Arc<dyn ResultExporter>
        });

        info!(
            table = %config.bookings_table,
            llm_enabled = parser.has_extractor(),
            export_enabled = exporter.is_some(),
            "Email processor configured"
        );

        let processor = EmailProcessor::new(
            Arc::new(S3EmailSource::new(s3_client)),
            parser,
            Arc::new(DynamoBookingRepository::new(
                dynamo_client,
                config.bookings_table.clone(),
            )),
            exporter,
        );

        Ok(Self { processor })
    }
}

async fn handler(
    state: Arc<AppState>,
    event: LambdaEvent<S3Notification>,
) -> Result<HandlerResponse, Error> {
    info!(request_id = %event.context.request_id, "Lambda handler invoked");

    state.processor.process(&event.payload).await;

    Ok(HandlerResponse::ok())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
