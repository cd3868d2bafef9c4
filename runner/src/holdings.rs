//! Holdings reader and report.

use std::vec;

use brokerbot::{AccountId, AccountRegistry, HoldingRow};
use brokerbot_broker::{Broker, BrokerError, Position};
use log::{debug, warn};

use crate::notify::Notifier;

/// Lazy, single-pass listing of one account's holdings.
///
/// Positions are fetched once up front; prices the position listing did not
/// carry are looked up one row at a time as the iterator advances. A failed
/// or empty price lookup marks that row's price and total unavailable.
pub struct HoldingsIter<'a, B: Broker + ?Sized> {
    broker: &'a mut B,
    positions: vec::IntoIter<Position>,
}

impl<B: Broker + ?Sized> Iterator for HoldingsIter<'_, B> {
    type Item = HoldingRow;

    fn next(&mut self) -> Option<HoldingRow> {
        let position = self.positions.next()?;
        let price = match position.price {
            Some(p) => Some(p),
            None => match self.broker.latest_price(&position.symbol) {
                Ok(p) => p,
                Err(e) => {
                    warn!("{}: no price for {}: {e}", self.broker.label(), position.symbol);
                    None
                }
            },
        };
        Some(HoldingRow::new(position.symbol, position.quantity, price))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.positions.size_hint()
    }
}

/// Start listing the holdings of `account`.
pub fn list_holdings<'a, B: Broker + ?Sized>(
    broker: &'a mut B,
    account: &AccountId,
) -> Result<HoldingsIter<'a, B>, BrokerError> {
    let positions = broker.positions(account)?;
    debug!("{}: {} positions in {account}", broker.label(), positions.len());
    Ok(HoldingsIter {
        broker,
        positions: positions.into_iter(),
    })
}

/// Send a holdings report for every registered account of one session.
///
/// An account whose positions cannot be read is reported and skipped.
/// Returns the number of rows reported.
pub fn report_holdings<B: Broker + ?Sized>(
    broker: &mut B,
    registry: &AccountRegistry,
    notifier: &Notifier,
) -> usize {
    let label = broker.label().to_string();
    let mut rows = 0;
    for account in registry.account_ids(&label) {
        let listing = match list_holdings(broker, &account) {
            Ok(listing) => listing,
            Err(e) => {
                notifier.send(&format!("{label}: Error getting holdings for {account}: {e}"));
                continue;
            }
        };

        let mut header_sent = false;
        for row in listing {
            if !header_sent {
                notifier.send(&format!("Holdings in {label} {account}:"));
                header_sent = true;
            }
            notifier.send(&row.to_string());
            rows += 1;
        }
        if !header_sent {
            notifier.send(&format!("No holdings in {label} {account}"));
        }
    }
    rows
}
