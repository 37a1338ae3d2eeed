//! LLM-backed booking extraction over the OpenAI chat-completions API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::{Config, Error, ExtractionKind, ExtractionResult, Result};

/// Name of the tool the model must answer through.
pub const EXTRACT_BOOKING_TOOL: &str = "extract_booking";

/// Longest email body sent to the model, in characters.
pub const MAX_EMAIL_CHARS: usize = 200_000;

const SYSTEM_PROMPT: &str = r#"You are an email parsing assistant.

The user will send you RAW email text (headers, HTML, bodies, weird formatting)
representing either a booking (hotel, car, plane, train, tour, etc) OR a marketing email

Your job:
1. Determine if this is a BOOKING email or MARKETING email.
2. If booking, extract all booking details.
3. If marketing, set kind="marketing" and booking=null.

OUTPUT:
Use the extract_booking tool."#;

/// Anything that can turn email text into an [`ExtractionResult`].
#[async_trait]
pub trait BookingExtractor: Send + Sync {
    async fn extract(&self, email_text: &str) -> Result<ExtractionResult>;
}

/// A chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
    pub tool_choice: &'static str,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

/// Tool arguments with the booking left undecoded until `kind` is known.
#[derive(Debug, Deserialize)]
struct ToolArguments {
    kind: ExtractionKind,
    #[serde(default)]
    booking: Option<Value>,
}

/// JSON schema of the `extract_booking` tool.
pub fn extract_booking_tool() -> Value {
    let text = json!({"type": ["string", "null"]});
    let date = json!({"type": ["string", "null"], "description": "ISO date, YYYY-MM-DD"});
    let amount = json!({"type": ["number", "null"]});
    let required_text = |description: &str| json!({"type": "string", "description": description});
    let stay_date = required_text("ISO date, YYYY-MM-DD");

    json!({
        "type": "function",
        "function": {
            "name": EXTRACT_BOOKING_TOOL,
            "description": "Classify an email and extract booking details when it is a booking.",
            "parameters": {
                "type": "object",
                "properties": {
                    "kind": {
                        "type": "string",
                        "enum": ["booking", "marketing"]
                    },
                    "booking": {
                        "type": ["object", "null"],
                        "properties": {
                            "name": required_text("Hotel or provider name"),
                            "confirmation": required_text("Booking reference"),
                            "check_in_date": stay_date,
                            "check_out_date": stay_date,
                            "check_in_time": text,
                            "check_out_time": text,
                            "early_check_in_time": text,
                            "early_check_in_cost": amount,
                            "breakfast_included": {"type": ["boolean", "null"]},
                            "cancellation_terms": text,
                            "address": text,
                            "city": text,
                            "booking_date": date,
                            "what3words": text,
                            "website": {"type": ["string", "null"], "description": "Absolute URL"},
                            "amount_paid": amount,
                            "amount_total": amount,
                            "room_type": text
                        },
                        "required": ["name", "confirmation", "check_in_date", "check_out_date"]
                    }
                },
                "required": ["kind", "booking"]
            }
        }
    })
}

/// Client for the chat-completions API.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    /// Create a new client.
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from configuration and a resolved API key.
    pub fn from_config(config: &Config, api_key: String) -> Result<Self> {
        Self::new(
            api_key,
            config.openai_model.clone(),
            config.openai_base_url.clone(),
        )
    }

    /// Build the extraction request for an email body.
    pub fn build_request(&self, email_text: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: truncate_chars(email_text, MAX_EMAIL_CHARS).to_string(),
                },
            ],
            tools: vec![extract_booking_tool()],
            tool_choice: "auto",
            temperature: 0.0,
        }
    }
}

#[async_trait]
impl BookingExtractor for OpenAiClient {
    async fn extract(&self, email_text: &str) -> Result<ExtractionResult> {
        let request = self.build_request(email_text);
        debug!(model = %request.model, chars = email_text.len(), "Calling LLM for extraction");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Llm(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Llm(format!("Provider returned {}: {}", status, body)));
        }

        let result = parse_tool_call(&body)?;
        info!(kind = ?result.kind, "LLM extraction complete");
        Ok(result)
    }
}

/// Decode the `extract_booking` arguments from a chat-completions response.
pub fn parse_tool_call(body: &str) -> Result<ExtractionResult> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Llm(format!("Malformed response: {}", e)))?;

    let call = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.tool_calls)
        .and_then(|calls| calls.into_iter().next())
        .ok_or_else(|| Error::Llm("Response contained no tool call".to_string()))?;

    if call.function.name != EXTRACT_BOOKING_TOOL {
        return Err(Error::Llm(format!(
            "Unexpected tool call: {}",
            call.function.name
        )));
    }

    let arguments: ToolArguments = serde_json::from_str(&call.function.arguments)
        .map_err(|e| Error::Llm(format!("Invalid tool arguments: {}", e)))?;

    // Classification is final: a marketing answer never carries a booking,
    // whatever the model put in the payload.
    let booking = match arguments.kind {
        ExtractionKind::Marketing => None,
        ExtractionKind::Booking => match arguments.booking {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| Error::Llm(format!("Invalid booking arguments: {}", e)))?,
            ),
        },
    };

    Ok(ExtractionResult {
        kind: arguments.kind,
        booking,
    })
}

/// Truncate to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
