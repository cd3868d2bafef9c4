//! Robinhood REST API client.

use std::time::Duration;

use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::types::{
    AccountEntry, Instrument, OrderPayload, OrderResponse, Page, PositionEntry, QuoteBatch,
    QuoteEntry, TokenResponse,
};
use crate::error::BrokerError;

/// Public client id of Robinhood's own web app.
const CLIENT_ID: &str = "c82SH0WZOsabOXGP2sxqcj34FxkvfnWRZBKlBjFS";
/// Requested token lifetime.
const TOKEN_EXPIRES_SECS: u32 = 86_400;
/// Upper bound on followed `next` links per listing.
const MAX_PAGES: usize = 50;

/// Blocking Robinhood REST client.
pub struct RobinhoodClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

/// Outcome of `POST /orders/` that the API did not treat as a fault.
#[derive(Debug)]
pub enum OrderReply {
    Accepted(OrderResponse),
    /// HTTP 400 with a human-readable reason.
    Refused(String),
}

impl RobinhoodClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, BrokerError> {
        let token = self.token.as_ref().ok_or(BrokerError::NotConnected)?;
        Ok(builder.bearer_auth(token).header("Accept", "application/json"))
    }

    /// Password-grant login (POST /oauth2/token/).
    pub fn login(
        &mut self,
        username: &str,
        password: &str,
        mfa_code: Option<&str>,
        device_token: &str,
    ) -> Result<(), BrokerError> {
        let expires = TOKEN_EXPIRES_SECS.to_string();
        let mut form = vec![
            ("client_id", CLIENT_ID),
            ("grant_type", "password"),
            ("scope", "internal"),
            ("expires_in", expires.as_str()),
            ("device_token", device_token),
            ("username", username),
            ("password", password),
        ];
        if let Some(code) = mfa_code {
            form.push(("mfa_code", code));
        }

        let resp = self
            .client
            .post(self.url("/oauth2/token/"))
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .map_err(|e| BrokerError::Connection(format!("login request failed: {e}")))?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        let token = parse_token_reply(status, &body)?;
        self.token = Some(token);
        Ok(())
    }

    /// Revoke the access token (POST /oauth2/revoke_token/).
    pub fn revoke(&mut self) -> Result<(), BrokerError> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        let resp = self
            .client
            .post(self.url("/oauth2/revoke_token/"))
            .form(&[("client_id", CLIENT_ID), ("token", token.as_str())])
            .send()
            .map_err(|e| BrokerError::Connection(format!("revoke request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(BrokerError::Connection(format!(
                "revoke returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// GET an absolute URL and decode the JSON body.
    pub fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, BrokerError> {
        let resp = self
            .authorized(self.client.get(url))?
            .send()
            .map_err(|e| BrokerError::Connection(format!("{what} request failed: {e}")))?;
        decode(resp, what)
    }

    /// Follow `next` links and collect every page.
    fn get_all<T: DeserializeOwned>(&self, first: String, what: &str) -> Result<Vec<T>, BrokerError> {
        let mut out = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;
        while let Some(url) = next {
            let page: Page<T> = self.get_json(&url, what)?;
            out.extend(page.results);
            next = page.next;
            pages += 1;
            if pages >= MAX_PAGES {
                debug!("{what}: stopping after {MAX_PAGES} pages");
                break;
            }
        }
        Ok(out)
    }

    /// All accounts on the login (GET /accounts/).
    pub fn accounts(&self) -> Result<Vec<AccountEntry>, BrokerError> {
        self.get_all(self.url("/accounts/"), "accounts")
    }

    /// Non-zero positions in one account (GET /positions/).
    pub fn positions(&self, account_number: &str) -> Result<Vec<PositionEntry>, BrokerError> {
        self.get_all(
            self.url(&format!("/positions/?nonzero=true&account_number={account_number}")),
            "positions",
        )
    }

    /// Resolve an instrument URL as returned in positions.
    pub fn instrument_by_url(&self, url: &str) -> Result<Instrument, BrokerError> {
        self.get_json(url, "instrument")
    }

    /// Look up the instrument for a ticker (GET /instruments/?symbol=).
    pub fn instrument_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>, BrokerError> {
        let page: Page<Instrument> =
            self.get_json(&self.url(&format!("/instruments/?symbol={symbol}")), "instruments")?;
        Ok(page.results.into_iter().find(|i| i.symbol.eq_ignore_ascii_case(symbol)))
    }

    /// Current quote (GET /quotes/?symbols=). `None` for unknown symbols.
    pub fn quote(&self, symbol: &str) -> Result<Option<QuoteEntry>, BrokerError> {
        let resp = self
            .authorized(self.client.get(self.url(&format!("/quotes/?symbols={symbol}"))))?
            .send()
            .map_err(|e| BrokerError::Connection(format!("quote request failed: {e}")))?;
        if resp.status() == StatusCode::BAD_REQUEST || resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let batch: QuoteBatch = decode(resp, "quote")?;
        Ok(batch.results.into_iter().flatten().next())
    }

    /// Submit an order (POST /orders/).
    pub fn submit_order(&self, payload: &OrderPayload<'_>) -> Result<OrderReply, BrokerError> {
        debug!(
            "Submitting Robinhood order: {} {} {} @ {} ({})",
            payload.side, payload.quantity, payload.symbol, payload.price, payload.order_type
        );
        let resp = self
            .authorized(self.client.post(self.url("/orders/")))?
            .json(payload)
            .send()
            .map_err(|e| BrokerError::Order(format!("order request failed: {e}")))?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        parse_order_reply(status, &body)
    }
}

fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T, BrokerError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(BrokerError::NotConnected);
    }
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(BrokerError::Connection(format!("{what} returned {status}: {body}")));
    }
    resp.json::<T>()
        .map_err(|e| BrokerError::Parse(format!("failed to parse {what}: {e}")))
}

/// Interpret the token endpoint's reply.
pub fn parse_token_reply(status: StatusCode, body: &str) -> Result<String, BrokerError> {
    let reply: TokenResponse = serde_json::from_str(body)
        .map_err(|e| BrokerError::Auth(format!("login returned {status} with unreadable body: {e}")))?;

    if reply.mfa_required == Some(true) {
        return Err(BrokerError::Auth(
            "login requires a one-time code; add the TOTP seed to the credential".into(),
        ));
    }
    match reply.access_token {
        Some(token) if status.is_success() && !token.is_empty() => Ok(token),
        _ => Err(BrokerError::Auth(format!(
            "login returned {status}: {}",
            reply.detail.unwrap_or_else(|| "no access token".into())
        ))),
    }
}

/// Interpret the order endpoint's reply.
///
/// A 400 is a business refusal (insufficient shares, pending order); any
/// other non-success status is a fault.
pub fn parse_order_reply(status: StatusCode, body: &str) -> Result<OrderReply, BrokerError> {
    if status == StatusCode::BAD_REQUEST {
        let reason = serde_json::from_str::<OrderResponse>(body)
            .ok()
            .and_then(|r| r.detail.or(r.reject_reason))
            .unwrap_or_else(|| body.trim().to_string());
        return Ok(OrderReply::Refused(reason));
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(BrokerError::NotConnected);
    }
    if !status.is_success() {
        return Err(BrokerError::Order(format!("order returned {status}: {body}")));
    }
    serde_json::from_str::<OrderResponse>(body)
        .map(OrderReply::Accepted)
        .map_err(|e| BrokerError::Order(format!("failed to parse order response: {e}")))
}
