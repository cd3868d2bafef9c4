//! Robinhood API request and response types.
//!
//! Robinhood sends decimal amounts as strings; they are parsed at the edge
//! with [`parse_decimal`].

use std::str::FromStr;

use brokerbot::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Paginated list envelope.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

/// OAuth password-grant response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Set when the login needs a one-time code that was not sent.
    #[serde(default)]
    pub mfa_required: Option<bool>,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    pub url: String,
    pub account_number: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub portfolio_cash: Option<String>,
    #[serde(default)]
    pub cash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PositionEntry {
    pub instrument: String,
    pub quantity: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub average_buy_price: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Instrument {
    pub url: String,
    pub symbol: String,
    #[serde(default)]
    pub tradeable: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuoteEntry {
    pub symbol: String,
    #[serde(default)]
    pub ask_price: Option<String>,
    #[serde(default)]
    pub bid_price: Option<String>,
    #[serde(default)]
    pub last_trade_price: Option<String>,
    #[serde(default)]
    pub last_extended_hours_trade_price: Option<String>,
}

/// `quotes/` wraps unknown symbols as `null` entries.
#[derive(Debug, Deserialize)]
pub struct QuoteBatch {
    pub results: Vec<Option<QuoteEntry>>,
}

/// Body of `POST /orders/`.
#[derive(Debug, Serialize)]
pub struct OrderPayload<'a> {
    pub account: &'a str,
    pub instrument: &'a str,
    pub symbol: &'a str,
    pub price: String,
    pub quantity: String,
    pub ref_id: String,
    pub side: &'a str,
    pub time_in_force: &'a str,
    pub trigger: &'a str,
    #[serde(rename = "type")]
    pub order_type: &'a str,
    pub extended_hours: bool,
    pub market_hours: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl OrderResponse {
    /// Order states that mean the order will never fill.
    pub fn is_refused(&self) -> bool {
        matches!(self.state.as_deref(), Some("rejected" | "failed" | "cancelled"))
    }
}

/// Parse a Robinhood decimal string.
pub fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, BrokerError> {
    Decimal::from_str(raw.trim())
        .map_err(|_| BrokerError::Parse(format!("{field}: not a decimal: {raw:?}")))
}

/// Parse an optional price; empty or missing means no data.
pub fn parse_optional_price(raw: Option<&str>, field: &str) -> Result<Option<Decimal>, BrokerError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_decimal(s, field).map(Some),
    }
}
