//! Mock broker for testing: implements the `Broker` trait with scripted behavior.
//!
//! Use this in integration tests to drive the order executor without a
//! browser or network.
//!
//! ```
//! use brokerbot::{AccountId, Symbol};
//! use brokerbot_broker::mock::{MockBroker, MockStep};
//! use rust_decimal_macros::dec;
//!
//! let aapl = Symbol::new("AAPL").unwrap();
//! let broker = MockBroker::builder("Mock", "Mock 1")
//!     .with_account("X1", "Individual", dec!(1000))
//!     .with_account("X2", "ROTH IRA", dec!(50))
//!     .with_position("X1", aapl.clone(), dec!(10), dec!(150))
//!     .with_quote(aapl, dec!(150.05), dec!(149.95))
//!     .fail_on("X2", MockStep::Quote)
//!     .build();
//! let journal = broker.journal();
//! assert!(journal.placed().is_empty());
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use brokerbot::{AccountId, AccountRecord, Decimal, OrderTicket, Quote, Symbol};

use crate::error::BrokerError;
use crate::types::{Placement, Position};
use crate::Broker;

/// Order-entry step at which an injected fault fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockStep {
    SelectAccount,
    EnterSymbol,
    Quote,
    Preview,
    Place,
}

/// How the mock answers `place`.
#[derive(Clone, Debug)]
pub enum PlaceMode {
    /// Every order is confirmed.
    Confirm,
    /// Every order is refused with this reason.
    Reject(String),
}

/// Everything the mock saw, shared with the test that built it.
#[derive(Debug, Default)]
struct JournalState {
    selected: Vec<AccountId>,
    previewed: Vec<OrderTicket>,
    placed: Vec<OrderTicket>,
    captures: Vec<String>,
    logouts: usize,
}

/// Read handle on a mock's recorded calls. Stays valid after the broker is dropped.
#[derive(Clone, Debug, Default)]
pub struct MockJournal(Arc<Mutex<JournalState>>);

impl MockJournal {
    fn state(&self) -> MutexGuard<'_, JournalState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn selected(&self) -> Vec<AccountId> {
        self.state().selected.clone()
    }

    pub fn previewed(&self) -> Vec<OrderTicket> {
        self.state().previewed.clone()
    }

    pub fn placed(&self) -> Vec<OrderTicket> {
        self.state().placed.clone()
    }

    pub fn captures(&self) -> Vec<String> {
        self.state().captures.clone()
    }

    pub fn logouts(&self) -> usize {
        self.state().logouts
    }
}

/// Builder for `MockBroker`.
pub struct MockBrokerBuilder {
    provider: String,
    label: String,
    accounts: Vec<AccountRecord>,
    positions: Vec<(AccountId, Position)>,
    quotes: Vec<(Symbol, Quote)>,
    prices: Vec<(Symbol, Decimal)>,
    faults: Vec<(AccountId, MockStep)>,
    place_mode: PlaceMode,
    fail_discovery: bool,
}

impl MockBrokerBuilder {
    pub fn with_account(mut self, id: &str, kind: &str, balance: Decimal) -> Self {
        self.accounts.push(AccountRecord {
            id: AccountId::new(id),
            kind: kind.to_string(),
            balance,
        });
        self
    }

    pub fn with_position(
        mut self,
        account: &str,
        symbol: Symbol,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        self.positions.push((
            AccountId::new(account),
            Position {
                symbol,
                quantity,
                price: Some(price),
            },
        ));
        self
    }

    /// Position whose price must be looked up with `latest_price`.
    pub fn with_unpriced_position(mut self, account: &str, symbol: Symbol, quantity: Decimal) -> Self {
        self.positions.push((
            AccountId::new(account),
            Position {
                symbol,
                quantity,
                price: None,
            },
        ));
        self
    }

    pub fn with_quote(mut self, symbol: Symbol, ask: Decimal, bid: Decimal) -> Self {
        self.quotes.push((symbol, Quote::new(ask, bid)));
        self
    }

    pub fn with_latest_price(mut self, symbol: Symbol, price: Decimal) -> Self {
        self.prices.push((symbol, price));
        self
    }

    /// Make every attempt on `account` fail at `step` with a connection error.
    pub fn fail_on(mut self, account: &str, step: MockStep) -> Self {
        self.faults.push((AccountId::new(account), step));
        self
    }

    pub fn place_mode(mut self, mode: PlaceMode) -> Self {
        self.place_mode = mode;
        self
    }

    /// Make `list_accounts` fail the column integrity check.
    pub fn fail_discovery(mut self) -> Self {
        self.fail_discovery = true;
        self
    }

    pub fn build(self) -> MockBroker {
        MockBroker {
            provider: self.provider,
            label: self.label,
            accounts: self.accounts,
            positions: self.positions,
            quotes: self.quotes,
            prices: self.prices,
            faults: self.faults,
            place_mode: self.place_mode,
            fail_discovery: self.fail_discovery,
            selected: None,
            logged_out: false,
            journal: MockJournal::default(),
        }
    }
}

/// A mock broker that records order-entry calls and returns scripted responses.
pub struct MockBroker {
    provider: String,
    label: String,
    accounts: Vec<AccountRecord>,
    positions: Vec<(AccountId, Position)>,
    quotes: Vec<(Symbol, Quote)>,
    prices: Vec<(Symbol, Decimal)>,
    faults: Vec<(AccountId, MockStep)>,
    place_mode: PlaceMode,
    fail_discovery: bool,
    selected: Option<AccountId>,
    logged_out: bool,
    journal: MockJournal,
}

impl MockBroker {
    pub fn builder(provider: &str, label: &str) -> MockBrokerBuilder {
        MockBrokerBuilder {
            provider: provider.to_string(),
            label: label.to_string(),
            accounts: Vec::new(),
            positions: Vec::new(),
            quotes: Vec::new(),
            prices: Vec::new(),
            faults: Vec::new(),
            place_mode: PlaceMode::Confirm,
            fail_discovery: false,
        }
    }

    /// Handle on the recorded calls (for assertions in tests).
    pub fn journal(&self) -> MockJournal {
        self.journal.clone()
    }

    fn require_session(&self) -> Result<(), BrokerError> {
        if self.logged_out {
            Err(BrokerError::NotConnected)
        } else {
            Ok(())
        }
    }

    fn check_fault(&self, step: MockStep) -> Result<(), BrokerError> {
        let Some(account) = &self.selected else {
            return Ok(());
        };
        if self.faults.iter().any(|(a, s)| a == account && *s == step) {
            return Err(BrokerError::Connection(format!(
                "mock: injected fault at {step:?} for {account}"
            )));
        }
        Ok(())
    }
}

impl Broker for MockBroker {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn list_accounts(&mut self) -> Result<Vec<AccountRecord>, BrokerError> {
        self.require_session()?;
        if self.fail_discovery {
            return Err(BrokerError::AccountDiscovery(format!(
                "{}: column lengths differ",
                self.label
            )));
        }
        Ok(self.accounts.clone())
    }

    fn positions(&mut self, account: &AccountId) -> Result<Vec<Position>, BrokerError> {
        self.require_session()?;
        Ok(self
            .positions
            .iter()
            .filter(|(a, _)| a == account)
            .map(|(_, p)| p.clone())
            .collect())
    }

    fn latest_price(&mut self, symbol: &Symbol) -> Result<Option<Decimal>, BrokerError> {
        self.require_session()?;
        Ok(self
            .prices
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, p)| *p))
    }

    fn select_account(&mut self, account: &AccountId) -> Result<(), BrokerError> {
        self.require_session()?;
        self.selected = Some(account.clone());
        self.journal.state().selected.push(account.clone());
        self.check_fault(MockStep::SelectAccount)?;
        if !self.accounts.iter().any(|a| &a.id == account) {
            return Err(BrokerError::Element(format!("account {account} not offered")));
        }
        Ok(())
    }

    fn enter_symbol(&mut self, symbol: &Symbol) -> Result<(), BrokerError> {
        self.require_session()?;
        self.check_fault(MockStep::EnterSymbol)?;
        if self.quotes.iter().any(|(s, _)| s == symbol) {
            Ok(())
        } else {
            Err(BrokerError::SymbolNotFound(symbol.to_string()))
        }
    }

    fn quote(&mut self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        self.require_session()?;
        self.check_fault(MockStep::Quote)?;
        self.quotes
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, q)| *q)
            .ok_or_else(|| BrokerError::SymbolNotFound(symbol.to_string()))
    }

    fn preview(&mut self, ticket: &OrderTicket) -> Result<(), BrokerError> {
        self.require_session()?;
        self.check_fault(MockStep::Preview)?;
        self.journal.state().previewed.push(ticket.clone());
        Ok(())
    }

    fn place(&mut self, ticket: &OrderTicket) -> Result<Placement, BrokerError> {
        self.require_session()?;
        self.check_fault(MockStep::Place)?;
        match &self.place_mode {
            PlaceMode::Confirm => {
                let mut journal = self.journal.state();
                journal.placed.push(ticket.clone());
                Ok(Placement::Placed {
                    order_id: Some(format!("mock-{}", journal.placed.len())),
                })
            }
            PlaceMode::Reject(reason) => Ok(Placement::Rejected {
                reason: reason.clone(),
            }),
        }
    }

    fn capture(&mut self, label: &str) -> Result<Option<PathBuf>, BrokerError> {
        self.journal.state().captures.push(label.to_string());
        Ok(None)
    }

    fn logout(&mut self) -> Result<(), BrokerError> {
        if !self.logged_out {
            self.logged_out = true;
            self.journal.state().logouts += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerbot::{OrderType, Side};
    use rust_decimal_macros::dec;

    fn aapl() -> Symbol {
        Symbol::new("AAPL").unwrap()
    }

    fn ticket(account: &str) -> OrderTicket {
        OrderTicket {
            account: AccountId::new(account),
            symbol: aapl(),
            side: Side::Buy,
            quantity: dec!(1),
            order_type: OrderType::Market,
        }
    }

    #[test]
    fn builder_basic() {
        let mut broker = MockBroker::builder("Mock", "Mock 1")
            .with_account("A1", "Individual", dec!(100))
            .with_position("A1", aapl(), dec!(5), dec!(150))
            .with_quote(aapl(), dec!(150.10), dec!(149.90))
            .build();

        let accounts = broker.list_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].balance, dec!(100));

        let positions = broker.positions(&AccountId::new("A1")).unwrap();
        assert_eq!(positions[0].quantity, dec!(5));
        assert!(broker.positions(&AccountId::new("B9")).unwrap().is_empty());

        let q = broker.quote(&aapl()).unwrap();
        assert_eq!(q.ask, dec!(150.10));
    }

    #[test]
    fn unknown_symbol_not_found() {
        let mut broker = MockBroker::builder("Mock", "Mock 1").build();
        let err = broker.enter_symbol(&Symbol::new("ZZZZ").unwrap()).unwrap_err();
        assert!(matches!(err, BrokerError::SymbolNotFound(_)));
    }

    #[test]
    fn fault_fires_only_for_its_account() {
        let mut broker = MockBroker::builder("Mock", "Mock 1")
            .with_account("A1", "x", dec!(0))
            .with_account("A2", "x", dec!(0))
            .with_quote(aapl(), dec!(2), dec!(2))
            .fail_on("A1", MockStep::Quote)
            .build();

        broker.select_account(&AccountId::new("A1")).unwrap();
        assert!(broker.quote(&aapl()).is_err());
        broker.select_account(&AccountId::new("A2")).unwrap();
        assert!(broker.quote(&aapl()).is_ok());
    }

    #[test]
    fn place_records_and_rejects() {
        let mut broker = MockBroker::builder("Mock", "Mock 1").build();
        let journal = broker.journal();
        assert!(matches!(
            broker.place(&ticket("A1")).unwrap(),
            Placement::Placed { .. }
        ));
        assert_eq!(journal.placed().len(), 1);

        let mut rejecting = MockBroker::builder("Mock", "Mock 2")
            .place_mode(PlaceMode::Reject("no shares".into()))
            .build();
        let journal = rejecting.journal();
        assert_eq!(
            rejecting.place(&ticket("A1")).unwrap(),
            Placement::Rejected {
                reason: "no shares".into()
            }
        );
        assert!(journal.placed().is_empty());
    }

    #[test]
    fn logout_is_idempotent_and_final() {
        let mut broker = MockBroker::builder("Mock", "Mock 1").build();
        let journal = broker.journal();
        broker.logout().unwrap();
        broker.logout().unwrap();
        assert_eq!(journal.logouts(), 1);
        assert!(matches!(
            broker.list_accounts(),
            Err(BrokerError::NotConnected)
        ));
    }
}
