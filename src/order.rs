//! Order requests, tickets, and per-attempt outcomes.

use std::fmt;

use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::side::Side;
use crate::types::{AccountId, Amount, Symbol};

/// What the caller wants done, across every account of every provider.
///
/// Immutable once built; `new` enforces the invariants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderRequest {
    symbols: Vec<Symbol>,
    side: Side,
    amount: Amount,
    dry_run: bool,
}

impl OrderRequest {
    /// Build a request. Duplicate symbols are collapsed, first occurrence wins.
    ///
    /// Fails when no symbol is given, or when `Amount::All` is paired with a buy.
    pub fn new(
        symbols: Vec<Symbol>,
        side: Side,
        amount: Amount,
        dry_run: bool,
    ) -> Result<Self, CoreError> {
        let mut unique: Vec<Symbol> = Vec::with_capacity(symbols.len());
        for sym in symbols {
            if !unique.contains(&sym) {
                unique.push(sym);
            }
        }
        if unique.is_empty() {
            return Err(CoreError::InvalidRequest("no symbols given".into()));
        }
        if amount.is_all() && side == Side::Buy {
            return Err(CoreError::InvalidRequest(
                "amount \"all\" is only valid for sell orders".into(),
            ));
        }
        if let Amount::Shares(q) = amount {
            if q <= Decimal::ZERO {
                return Err(CoreError::InvalidRequest(format!(
                    "amount must be positive, got {q}"
                )));
            }
        }
        Ok(Self {
            symbols: unique,
            side,
            amount,
            dry_run,
        })
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Market or limit order. Limit carries the price in the session's currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit(Decimal),
}

impl OrderType {
    pub fn is_limit(&self) -> bool {
        matches!(self, OrderType::Limit(_))
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => f.write_str("market"),
            OrderType::Limit(p) => write!(f, "limit @ ${}", p.normalize()),
        }
    }
}

/// A fully resolved order for one account, ready for preview/placement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTicket {
    pub account: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub order_type: OrderType,
}

/// Terminal classification of one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OrderStatus {
    Placed,
    Rejected,
    DryRun,
    Error,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::DryRun => "dry_run",
            OrderStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of one (account, symbol) attempt. Exactly one per pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderOutcome {
    pub session_label: String,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    /// Amount as requested (`all` stays `all` even after resolution).
    pub amount: Amount,
    /// Share count actually used, when the attempt got that far.
    pub quantity: Option<Decimal>,
    pub order_type: Option<OrderType>,
    pub status: OrderStatus,
    /// Human-readable message, identical to what was sent to the notifier.
    pub detail: String,
}
