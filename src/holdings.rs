//! Holdings rows and the text heuristics used to scrape them.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::types::Symbol;

/// A price or value that may not be known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceCell {
    Known(Decimal),
    /// The quote service returned nothing for this symbol.
    Unavailable,
}

impl PriceCell {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            PriceCell::Known(v) => Some(*v),
            PriceCell::Unavailable => None,
        }
    }
}

impl fmt::Display for PriceCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceCell::Known(v) => write!(f, "${:.2}", v),
            PriceCell::Unavailable => f.write_str("N/A"),
        }
    }
}

/// One line of a holdings report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HoldingRow {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub price: PriceCell,
    pub total_value: PriceCell,
}

impl HoldingRow {
    /// Build a row; price and total are rounded to cents. A missing price
    /// makes both cells unavailable.
    pub fn new(symbol: Symbol, quantity: Decimal, price: Option<Decimal>) -> Self {
        match price {
            Some(p) => {
                let price = p.round_dp(2);
                Self {
                    symbol,
                    quantity,
                    price: PriceCell::Known(price),
                    total_value: PriceCell::Known((quantity * price).round_dp(2)),
                }
            }
            None => Self {
                symbol,
                quantity,
                price: PriceCell::Unavailable,
                total_value: PriceCell::Unavailable,
            },
        }
    }
}

impl fmt::Display for HoldingRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} @ {} = {}",
            self.symbol,
            self.quantity.normalize(),
            self.price,
            self.total_value
        )
    }
}

static TICKER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s{2}([A-Za-z]{3,4})\s{2}").expect("ticker pattern is valid")
});

/// Pull ticker-looking tokens out of rendered table text.
///
/// A token is 3 or 4 ASCII letters with at least two whitespace characters
/// on each side. Whitespace after one token may also frame the next. This
/// misses 1, 2 and 5 letter tickers and picks up any short word laid out the
/// same way; callers must treat the result as best effort.
pub fn extract_tickers(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(caps) = TICKER_TOKEN.captures_at(text, pos) {
        let Some(token) = caps.get(1) else { break };
        found.push(token.as_str());
        pos = token.end();
    }
    found
}

/// Parse a scraped share count such as `"1,250.5"`.
pub fn parse_quantity(raw: &str) -> Result<Decimal, CoreError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    Decimal::from_str(&cleaned).map_err(|_| CoreError::Quantity {
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn row_with_price() {
        let row = HoldingRow::new(sym("AAPL"), dec!(3), Some(dec!(150.456)));
        assert_eq!(row.price, PriceCell::Known(dec!(150.46)));
        assert_eq!(row.total_value, PriceCell::Known(dec!(451.38)));
        assert_eq!(row.to_string(), "AAPL: 3 @ $150.46 = $451.38");
    }

    #[test]
    fn row_without_price_is_unavailable() {
        let row = HoldingRow::new(sym("XYZ"), dec!(0.5), None);
        assert_eq!(row.price, PriceCell::Unavailable);
        assert_eq!(row.total_value.value(), None);
        assert_eq!(row.to_string(), "XYZ: 0.5 @ N/A = N/A");
    }

    #[test]
    fn tickers_framed_by_double_spaces() {
        let text = "  AAPL  Apple Inc  MSFT  Microsoft  ";
        assert_eq!(extract_tickers(text), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn tickers_share_separating_whitespace() {
        assert_eq!(extract_tickers("  SPY  QQQ  "), vec!["SPY", "QQQ"]);
    }

    #[test]
    fn tickers_ignore_wrong_lengths_and_single_spaces() {
        assert!(extract_tickers("  GE  ").is_empty());
        assert!(extract_tickers("  GOOGL  ").is_empty());
        assert!(extract_tickers(" AAPL ").is_empty());
        assert!(extract_tickers("  AB1C  ").is_empty());
    }

    #[test]
    fn tickers_accept_newlines_as_whitespace() {
        assert_eq!(extract_tickers("\n\nVTI \n Cash"), vec!["VTI"]);
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity("1,250.5").unwrap(), dec!(1250.5));
        assert_eq!(parse_quantity(" 3 ").unwrap(), dec!(3));
        assert!(parse_quantity("--").is_err());
    }
}
