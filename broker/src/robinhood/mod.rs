//! Robinhood broker implementation.

pub mod client;
pub mod types;

use std::time::Duration;

use brokerbot::{AccountId, AccountRecord, Decimal, OrderTicket, OrderType, Quote, Side, Symbol};
use log::{debug, info};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;
use client::{OrderReply, RobinhoodClient};
use types::{OrderPayload, parse_decimal, parse_optional_price};

/// Tunables for a Robinhood session.
#[derive(Clone, Debug)]
pub struct RobinhoodOptions {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for RobinhoodOptions {
    fn default() -> Self {
        Self {
            base_url: "https://api.robinhood.com".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// One logged-in Robinhood API session.
///
/// Robinhood has no order preview; `preview` only checks that the ticket
/// lines up with the selected account and symbol.
pub struct RobinhoodSession {
    label: String,
    client: RobinhoodClient,
    /// Account number → account URL, as orders reference accounts by URL.
    account_urls: FxHashMap<AccountId, String>,
    /// Instrument URL → ticker.
    symbols_by_url: FxHashMap<String, Symbol>,
    /// Ticker → instrument URL.
    urls_by_symbol: FxHashMap<Symbol, String>,
    selected: Option<AccountId>,
    last_quote: Option<(Symbol, Quote)>,
}

impl RobinhoodSession {
    /// Log in with a password grant, adding a one-time code when the
    /// credential carries a TOTP seed.
    pub fn login(label: &str, credential: &Credential, options: RobinhoodOptions) -> Result<Self, BrokerError> {
        let mut client = RobinhoodClient::new(&options.base_url, options.timeout)?;
        let code = credential.one_time_code()?;
        let device_token = Uuid::new_v4().to_string();

        info!("Logging in to {label}...");
        client.login(&credential.login, &credential.secret, code.as_deref(), &device_token)?;
        info!("Logged in to {label}");

        Ok(Self {
            label: label.to_string(),
            client,
            account_urls: FxHashMap::default(),
            symbols_by_url: FxHashMap::default(),
            urls_by_symbol: FxHashMap::default(),
            selected: None,
            last_quote: None,
        })
    }

    fn symbol_for_instrument(&mut self, url: &str) -> Result<Symbol, BrokerError> {
        if let Some(sym) = self.symbols_by_url.get(url) {
            return Ok(sym.clone());
        }
        let instrument = self.client.instrument_by_url(url)?;
        let symbol = Symbol::new(&instrument.symbol)?;
        self.remember_instrument(&symbol, url);
        Ok(symbol)
    }

    fn instrument_for_symbol(&mut self, symbol: &Symbol) -> Result<String, BrokerError> {
        if let Some(url) = self.urls_by_symbol.get(symbol) {
            return Ok(url.clone());
        }
        let instrument = self
            .client
            .instrument_by_symbol(symbol.as_str())?
            .ok_or_else(|| BrokerError::SymbolNotFound(symbol.to_string()))?;
        if !instrument.tradeable {
            return Err(BrokerError::Order(format!("{symbol} is not tradeable")));
        }
        self.remember_instrument(symbol, &instrument.url);
        Ok(instrument.url)
    }

    fn remember_instrument(&mut self, symbol: &Symbol, url: &str) {
        self.symbols_by_url.insert(url.to_string(), symbol.clone());
        self.urls_by_symbol.insert(symbol.clone(), url.to_string());
    }

    fn account_url(&mut self, account: &AccountId) -> Result<String, BrokerError> {
        if self.account_urls.is_empty() {
            self.list_accounts()?;
        }
        self.account_urls
            .get(account)
            .cloned()
            .ok_or_else(|| BrokerError::Order(format!("account {account} is not on {}", self.label)))
    }

    fn fresh_quote(&mut self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        if let Some((cached, quote)) = &self.last_quote {
            if cached == symbol {
                return Ok(*quote);
            }
        }
        self.quote(symbol)
    }
}

/// Robinhood takes two decimals at or above $1 and four below.
fn price_for_wire(price: Decimal) -> String {
    let dp = if price >= Decimal::ONE { 2 } else { 4 };
    price.round_dp(dp).normalize().to_string()
}

impl Broker for RobinhoodSession {
    fn provider(&self) -> &str {
        "Robinhood"
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn list_accounts(&mut self) -> Result<Vec<AccountRecord>, BrokerError> {
        let discovery = |e: BrokerError| BrokerError::AccountDiscovery(e.to_string());
        let entries = self.client.accounts().map_err(discovery)?;

        let mut records = Vec::with_capacity(entries.len());
        self.account_urls.clear();
        for entry in entries {
            let raw_balance = entry.portfolio_cash.as_deref().or(entry.cash.as_deref());
            let balance = parse_optional_price(raw_balance, "cash")
                .map_err(discovery)?
                .unwrap_or(Decimal::ZERO);
            let id = AccountId::new(entry.account_number);
            self.account_urls.insert(id.clone(), entry.url);
            records.push(AccountRecord {
                id,
                kind: entry.kind.unwrap_or_else(|| "individual".to_string()),
                balance,
            });
        }
        debug!("{}: {} accounts", self.label, records.len());
        Ok(records)
    }

    fn positions(&mut self, account: &AccountId) -> Result<Vec<Position>, BrokerError> {
        let entries = self.client.positions(account.as_str())?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let quantity = parse_decimal(&entry.quantity, "quantity")?;
            if quantity.is_zero() {
                continue;
            }
            let symbol = match entry.symbol.as_deref() {
                Some(s) => Symbol::new(s)?,
                None => self.symbol_for_instrument(&entry.instrument)?,
            };
            out.push(Position {
                symbol,
                quantity,
                price: None,
            });
        }
        Ok(out)
    }

    fn latest_price(&mut self, symbol: &Symbol) -> Result<Option<Decimal>, BrokerError> {
        match self.client.quote(symbol.as_str())? {
            Some(q) => parse_optional_price(q.last_trade_price.as_deref(), "last_trade_price"),
            None => Ok(None),
        }
    }

    fn select_account(&mut self, account: &AccountId) -> Result<(), BrokerError> {
        self.account_url(account)?;
        self.selected = Some(account.clone());
        Ok(())
    }

    fn enter_symbol(&mut self, symbol: &Symbol) -> Result<(), BrokerError> {
        self.instrument_for_symbol(symbol)?;
        self.last_quote = None;
        Ok(())
    }

    fn quote(&mut self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        let entry = self
            .client
            .quote(symbol.as_str())?
            .ok_or_else(|| BrokerError::SymbolNotFound(symbol.to_string()))?;
        let last = parse_optional_price(entry.last_trade_price.as_deref(), "last_trade_price")?;
        let ask = parse_optional_price(entry.ask_price.as_deref(), "ask_price")?.or(last);
        let bid = parse_optional_price(entry.bid_price.as_deref(), "bid_price")?.or(last);
        let (Some(ask), Some(bid)) = (ask, bid) else {
            return Err(BrokerError::Parse(format!("no ask/bid for {}", entry.symbol)));
        };
        let quote = Quote::new(ask, bid);
        self.last_quote = Some((symbol.clone(), quote));
        Ok(quote)
    }

    fn preview(&mut self, ticket: &OrderTicket) -> Result<(), BrokerError> {
        if self.selected.as_ref() != Some(&ticket.account) {
            return Err(BrokerError::Order(format!(
                "ticket is for {} but {} is selected",
                ticket.account,
                self.selected.as_ref().map(|a| a.as_str()).unwrap_or("no account")
            )));
        }
        if ticket.quantity <= Decimal::ZERO {
            return Err(BrokerError::Order(format!("quantity {} is not positive", ticket.quantity)));
        }
        self.instrument_for_symbol(&ticket.symbol)?;
        Ok(())
    }

    fn place(&mut self, ticket: &OrderTicket) -> Result<Placement, BrokerError> {
        let account_url = self.account_url(&ticket.account)?;
        let instrument_url = self.instrument_for_symbol(&ticket.symbol)?;
        let (kind, price) = match ticket.order_type {
            OrderType::Limit(p) => ("limit", p),
            OrderType::Market => {
                let quote = self.fresh_quote(&ticket.symbol)?;
                let reference = match ticket.side {
                    Side::Buy => quote.ask,
                    Side::Sell => quote.bid,
                };
                ("market", reference)
            }
        };

        let payload = OrderPayload {
            account: &account_url,
            instrument: &instrument_url,
            symbol: ticket.symbol.as_str(),
            price: price_for_wire(price),
            quantity: ticket.quantity.normalize().to_string(),
            ref_id: Uuid::new_v4().to_string(),
            side: ticket.side.as_str(),
            time_in_force: "gfd",
            trigger: "immediate",
            order_type: kind,
            extended_hours: false,
            market_hours: "regular_hours",
        };

        match self.client.submit_order(&payload)? {
            OrderReply::Refused(reason) => Ok(Placement::Rejected { reason }),
            OrderReply::Accepted(resp) if resp.is_refused() => Ok(Placement::Rejected {
                reason: resp
                    .reject_reason
                    .or(resp.state)
                    .unwrap_or_else(|| "refused".to_string()),
            }),
            OrderReply::Accepted(resp) => Ok(Placement::Placed { order_id: resp.id }),
        }
    }

    fn logout(&mut self) -> Result<(), BrokerError> {
        self.selected = None;
        self.client.revoke()
    }
}
