//! Email-to-booking parsing.
//!
//! The LLM extractor is the primary path. The Premier Inn template parser
//! covers outages and missing credentials.

pub mod premier_inn;

use std::sync::Arc;
use tracing::{info, warn};

use crate::email::extract_html;
use crate::llm::{BookingExtractor, OpenAiClient};
use crate::{Booking, Config, Error, Result};

/// Parses raw emails into bookings.
#[derive(Clone)]
pub struct EmailParser {
    extractor: Option<Arc<dyn BookingExtractor>>,
    fallback: bool,
}

impl EmailParser {
    /// Create a parser. `fallback` enables the template parser.
    pub fn new(extractor: Option<Arc<dyn BookingExtractor>>, fallback: bool) -> Self {
        Self {
            extractor,
            fallback,
        }
    }

    /// Build a parser from configuration and an optional API key.
    pub fn from_config(config: &Config, api_key: Option<String>) -> Result<Self> {
        let extractor: Option<Arc<dyn BookingExtractor>> = match api_key {
            Some(key) => Some(Arc::new(OpenAiClient::from_config(config, key)?)),
            None => {
                warn!("No OpenAI API key available, LLM extraction disabled");
                None
            }
        };
        Ok(Self::new(extractor, config.parser_fallback))
    }

    /// A parser that only uses the template parser.
    pub fn template_only() -> Self {
        Self::new(None, true)
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    /// Parse a raw RFC 822 email.
    ///
    /// Fails with [`Error::NotABooking`] for marketing and other non-booking
    /// mail.
    pub async fn parse(&self, raw_email: &[u8]) -> Result<Booking> {
        let html = extract_html(raw_email);

        let booking = match &self.extractor {
            Some(extractor) => match extractor.extract(&html).await {
                Ok(result) => result.into_booking()?,
                Err(e) if self.fallback => {
                    warn!(error = %e, "LLM extraction failed, using template parser");
                    premier_inn::parse(&html)?
                }
                Err(e) => return Err(e),
            },
            None if self.fallback => {
                info!("No LLM extractor configured, using template parser");
                premier_inn::parse(&html)?
            }
            None => {
                return Err(Error::Config(
                    "no LLM extractor configured and template fallback disabled".to_string(),
                ))
            }
        };

        booking.validated()
    }
}
