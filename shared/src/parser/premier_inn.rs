//! Template parser for Premier Inn booking confirmations.
//!
//! Works on the label/value tables of the confirmation email. Used when the
//! LLM extractor is unavailable, so it only has to understand one layout.

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::{Booking, Error, Result};

static CONFIRMATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{3}\d{7})\b").expect("confirmation regex"));
static DAY_MONTH_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)?\s+([A-Za-z]{3,9})\s+(\d{4})\b")
        .expect("date regex")
});
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("iso date regex"));
static FROM_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:from|after)\s+(\d{1,2}(?::\d{2})?\s*[ap]m)\b").expect("from regex")
});
static BY_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:by|before|until)\s+(\d{1,2}(?::\d{2})?\s*[ap]m)\b").expect("by regex")
});
static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}:\d{2})\b").expect("clock regex"));
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:GBP|£)\s*(\d[\d,]*(?:\.\d{1,2})?)").expect("amount regex")
});
static WHAT3WORDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"///[a-z]+\.[a-z]+\.[a-z]+").expect("what3words regex"));
static BREAKFAST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)breakfast\s+(?:is\s+)?included").expect("breakfast regex")
});
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

const SITE_HOSTS: [&str; 2] = ["premierinn.com", "www.premierinn.com"];

/// Parse a Premier Inn confirmation email body into a [`Booking`].
///
/// Returns [`Error::NotABooking`] when the HTML is not a Premier Inn
/// confirmation or lacks a booking reference or stay dates.
pub fn parse(html: &str) -> Result<Booking> {
    let page = Page::new(html)?;

    if !page.text.to_lowercase().contains("premier inn") {
        return Err(Error::NotABooking(
            "not a Premier Inn confirmation email".to_string(),
        ));
    }

    let confirmation = page
        .field(&["booking reference", "confirmation number", "reference"])
        .map(str::to_string)
        .or_else(|| CONFIRMATION_RE.captures(&page.text).map(|c| c[1].to_string()))
        .ok_or_else(|| Error::NotABooking("no booking reference found".to_string()))?;

    let check_in = page.field(&["check-in", "check in", "arrival"]);
    let check_out = page.field(&["check-out", "check out", "departure"]);

    let (Some(check_in_date), Some(check_out_date)) =
        (check_in.and_then(parse_date), check_out.and_then(parse_date))
    else {
        return Err(Error::NotABooking(format!(
            "booking {} has no recognisable stay dates",
            confirmation
        )));
    };

    let early = page.field(&["early check-in", "early check in"]);

    let name = page
        .field(&["hotel", "hotel name"])
        .map(str::to_string)
        .or_else(|| page.heading())
        .unwrap_or_else(|| "Premier Inn".to_string());

    let breakfast_included = match page.field(&["breakfast"]) {
        Some(value) => {
            let value = value.to_lowercase();
            (value.contains("included") && !value.contains("not included"))
                || value.starts_with("yes")
        }
        None => BREAKFAST_RE.is_match(&page.text),
    };

    let booking = Booking {
        name,
        confirmation,
        check_in_date,
        check_out_date,
        check_in_time: check_in.and_then(|v| capture_time(&FROM_TIME_RE, v)),
        check_out_time: check_out.and_then(|v| capture_time(&BY_TIME_RE, v)),
        early_check_in_time: early
            .and_then(|v| CLOCK_RE.captures(v))
            .map(|c| c[1].to_string()),
        early_check_in_cost: early.and_then(parse_amount),
        breakfast_included,
        cancellation_terms: page
            .field(&["cancellation policy", "cancellation", "rate"])
            .map(str::to_string),
        address: page.field(&["address"]).map(str::to_string),
        city: page.field(&["city", "town"]).map(str::to_string),
        booking_date: page
            .field(&["booked on", "booking date", "date booked"])
            .and_then(parse_date),
        what3words: WHAT3WORDS_RE
            .find(&page.text)
            .map(|m| m.as_str().to_string()),
        website: page.website(),
        amount_paid: page.field(&["amount paid", "paid"]).and_then(parse_amount),
        amount_total: page
            .field(&["total cost", "total price", "total"])
            .and_then(parse_amount),
        room_type: page.field(&["room type", "room"]).map(str::to_string),
    };

    debug!(confirmation = %booking.confirmation, "Parsed Premier Inn template");
    booking.validated()
}

struct Page {
    document: Html,
    labels: HashMap<String, String>,
    text: String,
}

impl Page {
    fn new(html: &str) -> Result<Self> {
        let document = Html::parse_document(html);
        let row_sel = selector("tr")?;
        let cell_sel = selector("th, td")?;

        let mut labels = HashMap::new();
        for row in document.select(&row_sel) {
            let cells: Vec<String> = row.select(&cell_sel).map(element_text).collect();
            if cells.len() < 2 {
                continue;
            }
            let label = normalize_label(&cells[0]);
            let value = cells[1..].join(" ").trim().to_string();
            if label.is_empty() || value.is_empty() {
                continue;
            }
            // Outer layout rows repeat inner rows' text; keep the first hit.
            labels.entry(label).or_insert(value);
        }

        let text = collapse(&document.root_element().text().collect::<Vec<_>>().join(" "));

        Ok(Self {
            document,
            labels,
            text,
        })
    }

    /// First value whose label matches one of `names`.
    fn field(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .find_map(|name| self.labels.get(*name))
            .map(String::as_str)
    }

    fn heading(&self) -> Option<String> {
        let h1 = selector("h1").ok()?;
        self.document
            .select(&h1)
            .map(element_text)
            .find(|t| !t.is_empty())
    }

    /// The hotel website, reduced to the site root.
    fn website(&self) -> Option<Url> {
        let anchors = selector("a[href]").ok()?;
        self.document
            .select(&anchors)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| Url::parse(href).ok())
            .find(|url| url.host_str().is_some_and(|host| SITE_HOSTS.contains(&host)))
            .map(|mut url| {
                url.set_path("/");
                url.set_query(None);
                url.set_fragment(None);
                url
            })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("invalid selector {}: {:?}", css, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse(&element.text().collect::<Vec<_>>().join(" "))
}

fn collapse(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

fn normalize_label(label: &str) -> String {
    label.trim().trim_end_matches(':').trim().to_lowercase()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Some(caps) = DAY_MONTH_YEAR_RE.captures(value) {
        let candidate = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
        if let Ok(date) = NaiveDate::parse_from_str(&candidate, "%d %B %Y") {
            return Some(date);
        }
    }
    ISO_DATE_RE
        .captures(value)
        .and_then(|caps| NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok())
}

fn capture_time(re: &Regex, value: &str) -> Option<String> {
    re.captures(value)
        .map(|caps| caps[1].to_lowercase().split_whitespace().collect())
}

fn parse_amount(value: &str) -> Option<Decimal> {
    AMOUNT_RE
        .captures(value)
        .and_then(|caps| Decimal::from_str(&caps[1].replace(',', "")).ok())
}
