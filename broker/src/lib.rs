//! Brokerage session trait and implementations for brokerbot.
//!
//! Provides a generic `Broker` trait over one authenticated brokerage login.
//! Implementations:
//!
//! - **Fidelity** (feature `fidelity`): drives the web UI through a WebDriver server
//! - **Robinhood** (feature `robinhood`): Robinhood REST API
//! - **Mock** (always): scripted sessions for tests

pub mod error;
pub mod mock;
pub mod otp;
pub mod types;

#[cfg(feature = "fidelity")]
pub mod fidelity;

#[cfg(feature = "robinhood")]
pub mod robinhood;

pub use error::BrokerError;
pub use types::*;

use std::path::PathBuf;

use brokerbot::{AccountId, AccountRecord, Decimal, OrderTicket, Quote, Symbol};

/// One authenticated login at one brokerage.
///
/// A session is exclusively owned: the web provider drives a single browser
/// context whose state (selected account, typed ticker, open dialogs) carries
/// from one call to the next, so every method takes `&mut self`.
///
/// The order-entry methods are called in sequence for each attempt:
/// `select_account` → `enter_symbol` → `quote` → `preview` → `place`
/// (`place` is skipped on dry runs).
pub trait Broker {
    /// Provider name, e.g. "Fidelity".
    fn provider(&self) -> &str;

    /// Login label, e.g. "Fidelity 2".
    fn label(&self) -> &str;

    /// Every account reachable from this login, already joined.
    fn list_accounts(&mut self) -> Result<Vec<AccountRecord>, BrokerError>;

    /// Open positions in one account.
    fn positions(&mut self, account: &AccountId) -> Result<Vec<Position>, BrokerError>;

    /// Last trade price, `None` when the quote service has no data.
    fn latest_price(&mut self, symbol: &Symbol) -> Result<Option<Decimal>, BrokerError>;

    /// Make `account` the target of the next order.
    fn select_account(&mut self, account: &AccountId) -> Result<(), BrokerError>;

    /// Enter the ticker on the order ticket. Unknown tickers fail with
    /// `BrokerError::SymbolNotFound`.
    fn enter_symbol(&mut self, symbol: &Symbol) -> Result<(), BrokerError>;

    /// Best ask and bid for the symbol on the current ticket.
    fn quote(&mut self, symbol: &Symbol) -> Result<Quote, BrokerError>;

    /// Fill in the ticket and request the provider's preview.
    fn preview(&mut self, ticket: &OrderTicket) -> Result<(), BrokerError>;

    /// Submit the previewed ticket.
    fn place(&mut self, ticket: &OrderTicket) -> Result<Placement, BrokerError>;

    /// Save a point-in-time capture of the session for later review.
    ///
    /// Returns the artifact path, or `None` when the provider has nothing
    /// visual to capture.
    fn capture(&mut self, _label: &str) -> Result<Option<PathBuf>, BrokerError> {
        Ok(None)
    }

    /// End the session. Must be safe to call more than once.
    fn logout(&mut self) -> Result<(), BrokerError>;
}

impl<B: Broker + ?Sized> Broker for Box<B> {
    fn provider(&self) -> &str {
        (**self).provider()
    }

    fn label(&self) -> &str {
        (**self).label()
    }

    fn list_accounts(&mut self) -> Result<Vec<AccountRecord>, BrokerError> {
        (**self).list_accounts()
    }

    fn positions(&mut self, account: &AccountId) -> Result<Vec<Position>, BrokerError> {
        (**self).positions(account)
    }

    fn latest_price(&mut self, symbol: &Symbol) -> Result<Option<Decimal>, BrokerError> {
        (**self).latest_price(symbol)
    }

    fn select_account(&mut self, account: &AccountId) -> Result<(), BrokerError> {
        (**self).select_account(account)
    }

    fn enter_symbol(&mut self, symbol: &Symbol) -> Result<(), BrokerError> {
        (**self).enter_symbol(symbol)
    }

    fn quote(&mut self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        (**self).quote(symbol)
    }

    fn preview(&mut self, ticket: &OrderTicket) -> Result<(), BrokerError> {
        (**self).preview(ticket)
    }

    fn place(&mut self, ticket: &OrderTicket) -> Result<Placement, BrokerError> {
        (**self).place(ticket)
    }

    fn capture(&mut self, label: &str) -> Result<Option<PathBuf>, BrokerError> {
        (**self).capture(label)
    }

    fn logout(&mut self) -> Result<(), BrokerError> {
        (**self).logout()
    }
}
