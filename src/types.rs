//! Core value types: Symbol, AccountId, Amount, Quote, AccountRecord

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::CoreError;

/// Equity ticker, stored uppercase.
///
/// Accepts ASCII letters, digits, `.`, `-` and `/` (class shares such as
/// `BRK.B` or `BF/B`), up to 12 characters.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Symbol(String);

impl Symbol {
    pub const MAX_LEN: usize = 12;

    /// Normalize and validate a ticker.
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        let s = raw.trim().to_ascii_uppercase();
        let valid = !s.is_empty()
            && s.len() <= Self::MAX_LEN
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/'));
        if valid {
            Ok(Self(s))
        } else {
            Err(CoreError::InvalidSymbol(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

/// Brokerage account number as shown by the provider.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// How many shares an order asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Amount {
    /// A fixed, positive share count (fractional shares allowed).
    Shares(Decimal),
    /// Whole position, resolved per account at submission time. Sell only.
    All,
}

impl Amount {
    pub fn is_all(&self) -> bool {
        matches!(self, Amount::All)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Shares(q) => write!(f, "{}", q.normalize()),
            Amount::All => f.write_str("all"),
        }
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Amount::All);
        }
        let qty = Decimal::from_str(s).map_err(|_| CoreError::Quantity { raw: s.to_string() })?;
        if qty <= Decimal::ZERO {
            return Err(CoreError::InvalidRequest(format!(
                "amount must be positive, got {s}"
            )));
        }
        Ok(Amount::Shares(qty))
    }
}

/// Best ask and best bid for one symbol, read at submission time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quote {
    pub ask: Decimal,
    pub bid: Decimal,
}

impl Quote {
    pub fn new(ask: Decimal, bid: Decimal) -> Self {
        Self { ask, bid }
    }
}

/// One discovered account, already joined from whatever source the
/// provider exposes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: AccountId,
    /// Provider's name for the account type ("Individual", "ROTH IRA", "margin").
    pub kind: String,
    pub balance: Decimal,
}
