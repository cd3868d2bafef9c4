//! # brokerbot
//!
//! Core domain for fanning one equity order out across many brokerage
//! accounts.
//!
//! The crate owns the pieces that do not care how a brokerage is reached:
//!
//! - **Order requests**: symbols, side, amount (shares or "all"), dry-run flag
//! - **Price banding**: market vs. limit selection and limit-price placement
//! - **Account registry**: per-login account numbers, types, and balances
//! - **Holdings rows**: position lines with an explicit "unavailable" price
//!
//! Brokerage adapters live in `brokerbot-broker`; the CLI and the per-attempt
//! state machine live in `brokerbot-runner`.
//!
//! ## Quick Start
//!
//! ```
//! use brokerbot::{pricing, Amount, OrderRequest, OrderType, Quote, Side, Symbol};
//! use rust_decimal_macros::dec;
//!
//! let request = OrderRequest::new(
//!     vec![Symbol::new("aapl").unwrap()],
//!     Side::Buy,
//!     Amount::Shares(dec!(1)),
//!     true,
//! )
//! .unwrap();
//! assert!(request.dry_run());
//!
//! // Sub-dollar quotes force a limit order just outside the spread.
//! let quote = Quote::new(dec!(0.85), dec!(0.80));
//! assert_eq!(
//!     pricing::order_type_for(Side::Buy, &quote),
//!     OrderType::Limit(dec!(0.86))
//! );
//! ```

mod error;
pub mod holdings;
mod order;
pub mod pricing;
pub mod registry;
mod side;
mod types;

pub use error::CoreError;
pub use holdings::{HoldingRow, PriceCell};
pub use order::{OrderOutcome, OrderRequest, OrderStatus, OrderTicket, OrderType};
pub use registry::{AccountInfo, AccountRegistry};
pub use side::Side;
pub use types::{AccountId, AccountRecord, Amount, Quote, Symbol};

/// Decimal type used for every price, quantity, and balance.
pub use rust_decimal::Decimal;
