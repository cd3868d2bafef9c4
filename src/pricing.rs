//! Price banding for low-priced securities.
//!
//! Brokerage risk controls commonly refuse market orders on sub-dollar
//! equities. When either side of the quote is below [`PRICE_FLOOR`], the
//! order goes out as a limit one tick outside the quote instead.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::order::OrderType;
use crate::side::Side;
use crate::types::Quote;

/// Below this ask or bid, market orders are not used.
pub const PRICE_FLOOR: Decimal = dec!(1.00);

/// Offset applied outside the quote for limit orders.
pub const LIMIT_OFFSET: Decimal = dec!(0.01);

/// Decimal places kept on limit prices.
pub const LIMIT_DP: u32 = 3;

/// True when either side of the quote is under the price floor.
pub fn requires_limit(quote: &Quote) -> bool {
    quote.ask < PRICE_FLOOR || quote.bid < PRICE_FLOOR
}

/// Limit price bracketing the quote: ask + 0.01 for buys, bid - 0.01 for sells,
/// rounded half-to-even to three places.
pub fn limit_price(side: Side, quote: &Quote) -> Decimal {
    let raw = match side {
        Side::Buy => quote.ask + LIMIT_OFFSET,
        Side::Sell => quote.bid - LIMIT_OFFSET,
    };
    raw.round_dp_with_strategy(LIMIT_DP, RoundingStrategy::MidpointNearestEven)
}

/// Decide the order type for one attempt from its live quote.
pub fn order_type_for(side: Side, quote: &Quote) -> OrderType {
    if requires_limit(quote) {
        OrderType::Limit(limit_price(side, quote))
    } else {
        OrderType::Market
    }
}
