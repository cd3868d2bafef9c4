//! Fidelity page addresses, selectors, scripts, and the pure helpers that
//! turn scraped text into typed values.

use std::collections::BTreeMap;
use std::str::FromStr;

use brokerbot::holdings::{extract_tickers, parse_quantity};
use brokerbot::{Decimal, OrderTicket, Symbol};
use log::{debug, warn};

use crate::error::BrokerError;
use crate::types::{Placement, Position};

pub const LOGIN_URL: &str = "https://digital.fidelity.com/prgw/digital/login/full-page?AuthRedUrl=digital.fidelity.com/ftgw/digital/portfolio/summary";
pub const POSITIONS_URL: &str = "https://digital.fidelity.com/ftgw/digital/portfolio/positions";
pub const TRADE_URL: &str = "https://digital.fidelity.com/ftgw/digital/trade-equity/index/orderEntry";

// Login
pub const USERNAME_INPUT: &str = "#userId-input";
pub const PASSWORD_INPUT: &str = "#password";
pub const LOGIN_BUTTON: &str = "#fs-login-button";
pub const TOTP_INPUT: &str = "#dom-totp-security-code-input";
pub const TOTP_CONTINUE: &str = "#dom-totp-code-continue-button";
pub const OLD_VIEW_OPT_OUT: &str = "#optout-btn";

// Account selector on the positions page
pub const ACCOUNT_NUMBER_CLASS: &str = "acct-selector__acct-num";
pub const ACCOUNT_BALANCE_CLASS: &str = "acct-selector__acct-balance";
pub const ACCOUNT_NAME_CLASS: &str = "acct-selector__acct-name";

// Positions grid
pub const GRID_PINNED_CLASS: &str = "ag-pinned-left-cols-container";
pub const GRID_CENTER_SELECTOR: &str = ".ag-center-cols-container";
pub const GRID_PINNED_SELECTOR: &str = ".ag-pinned-left-cols-container";
/// Column ids of the positions grid cells (`col-id` attribute).
pub const SYMBOL_COLUMN: &str = "sym";
pub const QUANTITY_COLUMN: &str = "qty";
pub const LAST_PRICE_COLUMN: &str = "lstPrStk";

// Trade ticket
pub const ACCOUNT_DROPDOWN: &str = "#eq-ticket-account-label";
pub const ACCOUNT_LIST: &str = "#ett-acct-sel-list";
pub const SYMBOL_INPUT: &str = "#eq-ticket-dest-symbol";
pub const SYMBOL_NOT_FOUND_ALERT: &str = "body > div.app-body > ap122489-ett-component > div > order-entry > div.eq-ticket.order-entry__container-height > div > div > form > div.order-entry__container-content.scroll > div:nth-child(2) > symbol-search > div > div.eq-ticket--border-top > div > div:nth-child(2) > div > div > div > pvd3-inline-alert > s-root > div > div.pvd-inline-alert__content > s-slot > s-assigned-wrapper";
pub const ASK_PRICE: &str = "#quote-panel > div > div.eq-ticket__quote--blocks-container > div:nth-child(2) > div > span > span";
pub const BID_PRICE: &str = "#quote-panel > div > div.eq-ticket__quote--blocks-container > div:nth-child(1) > div > span > span";
pub const BUY_BUTTON: &str = "#action-buy > s-root > div > label > s-slot > s-assigned-wrapper";
pub const SELL_BUTTON: &str = "#action-sell > s-root > div > label > s-slot > s-assigned-wrapper";
pub const QUANTITY_INPUT: &str = "#eqt-shared-quantity";
pub const MARKET_BUTTON: &str = "#market-yes > s-root > div > label > s-slot > s-assigned-wrapper";
pub const LIMIT_BUTTON: &str = "#market-no > s-root > div > label > s-slot > s-assigned-wrapper";
pub const LIMIT_PRICE_INPUT: &str = "#eqt-ordsel-limit-price-field";
pub const PREVIEW_BUTTON: &str = "#previewOrderBtn";
pub const PLACE_BUTTON: &str = "#placeOrderBtn";
/// Close button of the order error dialog (XPath).
pub const ERROR_DIALOG_CLOSE: &str = "(//button[@class='pvd-modal__close-button'])[3]";

/// Trimmed text of every element with the class in `arguments[0]`.
pub const CLASS_TEXT_SCRIPT: &str = r#"
var nodes = document.getElementsByClassName(arguments[0]);
var out = [];
for (var i = 0; i < nodes.length; i++) {
    out.push(nodes[i].textContent.trim());
}
return out;
"#;

/// One `{col-id: text}` map per data row of the grid container in
/// `arguments[0]`, merged with the cells of the pinned row in `arguments[1]`
/// that carries the same `row-index`.
pub const GRID_ROWS_SCRIPT: &str = r#"
var center = document.querySelector(arguments[0]);
if (!center) { return []; }
var pinned = document.querySelector(arguments[1]);
function collect(row, into) {
    var cells = row.querySelectorAll('[col-id]');
    for (var j = 0; j < cells.length; j++) {
        into[cells[j].getAttribute('col-id')] = cells[j].textContent.trim();
    }
}
var rows = center.querySelectorAll('[role=row]');
var out = [];
for (var i = 0; i < rows.length; i++) {
    var row = {};
    var index = rows[i].getAttribute('row-index');
    if (pinned && index !== null) {
        var left = pinned.querySelector('[role=row][row-index="' + index + '"]');
        if (left) { collect(left, row); }
    }
    collect(rows[i], row);
    out.push(row);
}
return out;
"#;

/// Post-login URL that means the credentials were refused.
pub fn is_error_page(url: &str) -> bool {
    url.to_lowercase().contains("errorpage")
}

/// The legacy site does not live under `/digital/`.
pub fn is_old_view(url: &str) -> bool {
    !url.contains("digital")
}

pub fn is_summary_page(url: &str) -> bool {
    url.contains("summary")
}

/// Whether a dropdown entry's text names `account`.
pub fn account_option_matches(option_text: &str, account: &str) -> bool {
    !account.is_empty() && option_text.contains(account)
}

/// Parse a quote panel price such as `"$1,234.50"`.
pub fn parse_price(raw: &str) -> Result<Decimal, BrokerError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '$' | ','))
        .collect();
    Decimal::from_str(&cleaned).map_err(|_| BrokerError::Parse(format!("bad price text {raw:?}")))
}

/// Ticker at the start of a symbol cell such as `"AAPL Apple Inc"`.
pub fn symbol_from_cell(text: &str) -> Option<Symbol> {
    let token = text.split_whitespace().next()?;
    Symbol::new(token).ok()
}

/// Build positions from the rows of the positions grid.
///
/// Each row's own symbol cell names its ticker. Rows scraped without one
/// fall back to the tickers found in the pinned column text, which only
/// pair with rows when both counts agree; a mismatch is an error, since
/// pairing by index would hand quantities to the wrong symbols. Rows
/// without a parseable quantity (cash sweep, totals) are skipped.
pub fn positions_from_grid(
    pinned_text: &str,
    rows: &[BTreeMap<String, String>],
) -> Result<Vec<Position>, BrokerError> {
    let symbols: Vec<Option<Symbol>> = if rows.iter().all(|r| r.contains_key(SYMBOL_COLUMN)) {
        rows.iter()
            .map(|r| r.get(SYMBOL_COLUMN).and_then(|cell| symbol_from_cell(cell)))
            .collect()
    } else {
        let tickers = extract_tickers(pinned_text);
        if tickers.len() != rows.len() {
            return Err(BrokerError::Parse(format!(
                "positions grid has {} rows but {} recognizable tickers",
                rows.len(),
                tickers.len()
            )));
        }
        warn!("positions grid rows carry no symbol cell; using pinned column text");
        tickers.iter().map(|t| Symbol::new(t).ok()).collect()
    };

    Ok(symbols
        .into_iter()
        .zip(rows)
        .filter_map(|(symbol, row)| {
            let Some(symbol) = symbol else {
                debug!("skipping grid row without a symbol: {row:?}");
                return None;
            };
            let quantity = match row.get(QUANTITY_COLUMN).map(|q| parse_quantity(q)) {
                Some(Ok(q)) => q,
                _ => {
                    debug!("skipping grid row for {symbol}: no quantity");
                    return None;
                }
            };
            let price = row
                .get(LAST_PRICE_COLUMN)
                .and_then(|p| parse_price(p).ok());
            Some(Position {
                symbol,
                quantity,
                price,
            })
        })
        .collect())
}

/// Outcome of pressing "place" once the preview has settled.
///
/// A place button means the preview was accepted. Without one, an error
/// dialog means the order was refused (usually not enough shares, or an
/// order already pending); neither showing up is a fault.
pub fn placement_after_preview(
    place_button: bool,
    error_dialog: bool,
    ticket: &OrderTicket,
) -> Result<Placement, BrokerError> {
    match (place_button, error_dialog) {
        (true, _) => Ok(Placement::Placed { order_id: None }),
        (false, true) => Ok(Placement::Rejected {
            reason: format!(
                "{} {} of {} was refused at preview",
                ticket.side, ticket.quantity, ticket.symbol
            ),
        }),
        (false, false) => Err(BrokerError::Timeout(
            "place button or order error dialog".into(),
        )),
    }
}

/// File name for a session screenshot.
pub fn screenshot_file_name(label: &str, stamp: &str, what: &str) -> String {
    let slug = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect()
    };
    format!("{}-{}-{stamp}.png", slug(label), slug(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_classification() {
        assert!(is_error_page("https://login.fidelity.com/ErrorPage?x=1"));
        assert!(!is_error_page(LOGIN_URL));
        assert!(is_old_view("https://oltx.fidelity.com/ftgw/fbc/ofsummary"));
        assert!(!is_old_view(POSITIONS_URL));
        assert!(is_summary_page("https://digital.fidelity.com/ftgw/digital/portfolio/summary"));
    }

    #[test]
    fn price_text() {
        assert_eq!(parse_price(" $1,234.50 ").unwrap(), Decimal::new(123450, 2));
        assert!(parse_price("--").is_err());
    }

    #[test]
    fn screenshot_names_are_path_safe() {
        assert_eq!(
            screenshot_file_name("Fidelity 1", "20261016-093000", "error"),
            "fidelity-1-error-20261016-093000.png"
        );
    }
}
