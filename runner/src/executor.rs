//! Order executor: one attempt per (symbol, account), each driven through
//! the order-entry state machine.
//!
//! ```text
//! ResolveAmount → SelectAccount → EnterSymbol → FetchQuote → DecideType
//!               → Preview → Place | DryRun
//! ```
//!
//! Each attempt ends in exactly one [`OrderOutcome`]. A symbol the provider
//! does not know, an account holding nothing to sell, and a refused order
//! are rejections; any other failure is an error for that attempt only,
//! after which the executor moves on to the next pair.

use std::fmt;
use std::thread;
use std::time::Duration;

use brokerbot::pricing;
use brokerbot::{
    AccountId, AccountRegistry, Amount, Decimal, OrderOutcome, OrderRequest, OrderStatus,
    OrderTicket, OrderType, Quote, Side, Symbol,
};
use brokerbot_broker::{Broker, BrokerError, Placement};
use log::{debug, error, info, warn};

use crate::notify::Notifier;

/// Cause hint attached to every refused order.
pub const REJECTION_HINT: &str =
    "DID NOT COMPLETE! Either this account does not have enough shares, or an order is already pending.";

/// Knobs for a run.
#[derive(Clone, Debug, Default)]
pub struct ExecutorOptions {
    /// Pause between attempts on the same session.
    pub attempt_interval: Duration,
}

/// Non-terminal states of one attempt.
#[derive(Clone, Debug)]
enum AttemptState {
    ResolveAmount,
    SelectAccount { quantity: Decimal },
    EnterSymbol { quantity: Decimal },
    FetchQuote { quantity: Decimal },
    DecideType { quantity: Decimal, quote: Quote },
    Preview(OrderTicket),
    Place(OrderTicket),
}

impl AttemptState {
    fn name(&self) -> &'static str {
        match self {
            AttemptState::ResolveAmount => "resolve amount",
            AttemptState::SelectAccount { .. } => "select account",
            AttemptState::EnterSymbol { .. } => "enter symbol",
            AttemptState::FetchQuote { .. } => "fetch quote",
            AttemptState::DecideType { .. } => "decide order type",
            AttemptState::Preview(_) => "preview",
            AttemptState::Place(_) => "place",
        }
    }
}

/// Terminal states of one attempt.
#[derive(Clone, Debug)]
enum Terminal {
    SymbolRejected,
    NothingHeld,
    PlaceRejected { ticket: OrderTicket, reason: String },
    Placed { ticket: OrderTicket, order_id: Option<String> },
    DryRun(OrderTicket),
}

enum Step {
    Next(AttemptState),
    Done(Terminal),
}

/// A fault during an attempt, with the state it happened in.
struct AttemptFault {
    state: &'static str,
    quantity: Option<Decimal>,
    order_type: Option<OrderType>,
    error: BrokerError,
}

impl fmt::Display for AttemptFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.state, self.error)
    }
}

/// `"buy"` → `"buying"`, `"sell"` → `"selling"`.
fn gerund(side: Side) -> &'static str {
    match side {
        Side::Buy => "buying",
        Side::Sell => "selling",
    }
}

/// Per-symbol header: `"Fidelity 1: buying 1 of AAPL"`.
pub fn symbol_header(label: &str, side: Side, amount: Amount, symbol: &Symbol) -> String {
    format!("{label}: {} {amount} of {symbol}", gerund(side))
}

/// Drives every (symbol, account) attempt for one session.
pub struct Executor<'n> {
    notifier: &'n Notifier,
    options: ExecutorOptions,
}

impl<'n> Executor<'n> {
    pub fn new(notifier: &'n Notifier, options: ExecutorOptions) -> Self {
        Self { notifier, options }
    }

    /// Run `request` against every account the registry lists for this
    /// session. Symbols form the outer loop, accounts the inner one.
    pub fn execute<B: Broker + ?Sized>(
        &self,
        broker: &mut B,
        registry: &AccountRegistry,
        request: &OrderRequest,
    ) -> Vec<OrderOutcome> {
        let label = broker.label().to_string();
        let accounts = registry.account_ids(&label);
        let total = request.symbols().len() * accounts.len();
        let mut outcomes = Vec::with_capacity(total);

        for symbol in request.symbols() {
            self.notifier.send(&symbol_header(
                &label,
                request.side(),
                request.amount(),
                symbol,
            ));
            for account in &accounts {
                let outcome = self.attempt(broker, &label, account, symbol, request);
                outcomes.push(outcome);
                if outcomes.len() < total && !self.options.attempt_interval.is_zero() {
                    thread::sleep(self.options.attempt_interval);
                }
            }
        }
        outcomes
    }

    fn attempt<B: Broker + ?Sized>(
        &self,
        broker: &mut B,
        label: &str,
        account: &AccountId,
        symbol: &Symbol,
        request: &OrderRequest,
    ) -> OrderOutcome {
        let who = format!("{label} {account}");
        let outcome = |status, quantity, order_type, detail: String| OrderOutcome {
            session_label: label.to_string(),
            account_id: account.clone(),
            symbol: symbol.clone(),
            side: request.side(),
            amount: request.amount(),
            quantity,
            order_type,
            status,
            detail,
        };

        let result = self.drive(broker, account, symbol, request);
        let (status, quantity, order_type, detail) = match result {
            Ok(Terminal::Placed { ticket, order_id }) => {
                let msg = format!(
                    "{who}: {} {} shares of {symbol}",
                    request.side(),
                    ticket.quantity.normalize()
                );
                info!("{msg} (order id {})", order_id.as_deref().unwrap_or("n/a"));
                (OrderStatus::Placed, Some(ticket.quantity), Some(ticket.order_type), msg)
            }
            Ok(Terminal::DryRun(ticket)) => {
                let msg = format!(
                    "DRY: {who}: {} {} shares of {symbol}",
                    request.side(),
                    ticket.quantity.normalize()
                );
                (OrderStatus::DryRun, Some(ticket.quantity), Some(ticket.order_type), msg)
            }
            Ok(Terminal::PlaceRejected { ticket, reason }) => {
                warn!("{who}: {symbol} refused: {reason}");
                let msg = format!(
                    "{who}: {} {} shares of {symbol}. {REJECTION_HINT}",
                    request.side(),
                    ticket.quantity.normalize()
                );
                (OrderStatus::Rejected, Some(ticket.quantity), Some(ticket.order_type), msg)
            }
            Ok(Terminal::SymbolRejected) => {
                let msg = format!("{who}: Error: symbol {symbol} not found");
                (OrderStatus::Rejected, None, None, msg)
            }
            Ok(Terminal::NothingHeld) => {
                let msg = format!("{who}: no shares of {symbol} to sell");
                (OrderStatus::Rejected, Some(Decimal::ZERO), None, msg)
            }
            Err(fault) => {
                error!("{who}: {} {} of {symbol}: {fault}", request.side(), request.amount());
                match broker.capture(&format!("{symbol}-{account}")) {
                    Ok(Some(path)) => debug!("{who}: diagnostic capture at {}", path.display()),
                    Ok(None) => {}
                    Err(e) => warn!("{who}: diagnostic capture failed: {e}"),
                }
                let msg = format!(
                    "{who}: Error {} {} of {symbol}: {fault}",
                    gerund(request.side()),
                    request.amount()
                );
                (OrderStatus::Error, fault.quantity, fault.order_type, msg)
            }
        };

        self.notifier.send(&detail);
        outcome(status, quantity, order_type, detail)
    }

    /// Run the state machine for one attempt to a terminal state.
    fn drive<B: Broker + ?Sized>(
        &self,
        broker: &mut B,
        account: &AccountId,
        symbol: &Symbol,
        request: &OrderRequest,
    ) -> Result<Terminal, AttemptFault> {
        let mut state = AttemptState::ResolveAmount;
        loop {
            debug!("{} {account} {symbol}: {}", broker.label(), state.name());
            let name = state.name();
            let (quantity, order_type) = state_progress(&state);
            match step(broker, account, symbol, request, state) {
                Ok(Step::Next(next)) => state = next,
                Ok(Step::Done(terminal)) => return Ok(terminal),
                Err(BrokerError::SymbolNotFound(_)) => return Ok(Terminal::SymbolRejected),
                Err(error) => {
                    return Err(AttemptFault {
                        state: name,
                        quantity,
                        order_type,
                        error,
                    });
                }
            }
        }
    }
}

/// What an attempt had settled on when it entered `state`.
fn state_progress(state: &AttemptState) -> (Option<Decimal>, Option<OrderType>) {
    match state {
        AttemptState::ResolveAmount => (None, None),
        AttemptState::SelectAccount { quantity }
        | AttemptState::EnterSymbol { quantity }
        | AttemptState::FetchQuote { quantity }
        | AttemptState::DecideType { quantity, .. } => (Some(*quantity), None),
        AttemptState::Preview(t) | AttemptState::Place(t) => (Some(t.quantity), Some(t.order_type)),
    }
}

fn step<B: Broker + ?Sized>(
    broker: &mut B,
    account: &AccountId,
    symbol: &Symbol,
    request: &OrderRequest,
    state: AttemptState,
) -> Result<Step, BrokerError> {
    let next = match state {
        AttemptState::ResolveAmount => match request.amount() {
            Amount::Shares(quantity) => AttemptState::SelectAccount { quantity },
            Amount::All => {
                let held: Decimal = broker
                    .positions(account)?
                    .iter()
                    .filter(|p| &p.symbol == symbol)
                    .map(|p| p.quantity)
                    .sum();
                if held <= Decimal::ZERO {
                    return Ok(Step::Done(Terminal::NothingHeld));
                }
                AttemptState::SelectAccount { quantity: held }
            }
        },
        AttemptState::SelectAccount { quantity } => {
            broker.select_account(account)?;
            AttemptState::EnterSymbol { quantity }
        }
        AttemptState::EnterSymbol { quantity } => {
            broker.enter_symbol(symbol)?;
            AttemptState::FetchQuote { quantity }
        }
        AttemptState::FetchQuote { quantity } => {
            let quote = broker.quote(symbol)?;
            AttemptState::DecideType { quantity, quote }
        }
        AttemptState::DecideType { quantity, quote } => {
            let order_type = pricing::order_type_for(request.side(), &quote);
            debug!("{symbol}: ask {} bid {} -> {order_type}", quote.ask, quote.bid);
            AttemptState::Preview(OrderTicket {
                account: account.clone(),
                symbol: symbol.clone(),
                side: request.side(),
                quantity,
                order_type,
            })
        }
        AttemptState::Preview(ticket) => {
            broker.preview(&ticket)?;
            if request.dry_run() {
                return Ok(Step::Done(Terminal::DryRun(ticket)));
            }
            AttemptState::Place(ticket)
        }
        AttemptState::Place(ticket) => {
            return Ok(Step::Done(match broker.place(&ticket)? {
                Placement::Placed { order_id } => Terminal::Placed { ticket, order_id },
                Placement::Rejected { reason } => Terminal::PlaceRejected { ticket, reason },
            }));
        }
    };
    Ok(Step::Next(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerbot::AccountRecord;
    use brokerbot_broker::mock::{MockBroker, PlaceMode};
    use crate::notify::MemorySink;
    use rust_decimal_macros::dec;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    fn registry_for(broker: &mut MockBroker) -> AccountRegistry {
        let mut registry = AccountRegistry::new("Mock");
        let records: Vec<AccountRecord> = broker.list_accounts().unwrap();
        registry.refresh(broker.label(), records).unwrap();
        registry
    }

    #[test]
    fn header_wording() {
        assert_eq!(
            symbol_header("Fidelity 1", Side::Buy, Amount::Shares(dec!(1)), &sym("AAPL")),
            "Fidelity 1: buying 1 of AAPL"
        );
        assert_eq!(
            symbol_header("Robinhood 2", Side::Sell, Amount::All, &sym("GME")),
            "Robinhood 2: selling all of GME"
        );
    }

    #[test]
    fn low_priced_buy_goes_out_as_limit() {
        let mut broker = MockBroker::builder("Mock", "Mock 1")
            .with_account("A1", "Individual", dec!(100))
            .with_quote(sym("PENY"), dec!(0.85), dec!(0.80))
            .build();
        let journal = broker.journal();
        let registry = registry_for(&mut broker);
        let request = OrderRequest::new(vec![sym("PENY")], Side::Buy, Amount::Shares(dec!(10)), false).unwrap();

        let sink = MemorySink::default();
        let notifier = Notifier::quiet(sink.clone());
        let outcomes = Executor::new(&notifier, ExecutorOptions::default())
            .execute(&mut broker, &registry, &request);
        notifier.shutdown();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OrderStatus::Placed);
        assert_eq!(outcomes[0].order_type, Some(OrderType::Limit(dec!(0.86))));
        assert_eq!(journal.placed()[0].quantity, dec!(10));
        assert_eq!(
            sink.messages(),
            vec![
                "Mock 1: buying 10 of PENY".to_string(),
                "Mock 1 A1: buy 10 shares of PENY".to_string(),
            ]
        );
    }

    #[test]
    fn refused_order_is_rejected_with_hint() {
        let mut broker = MockBroker::builder("Mock", "Mock 1")
            .with_account("A1", "Individual", dec!(100))
            .with_quote(sym("AAPL"), dec!(150), dec!(149.95))
            .place_mode(PlaceMode::Reject("insufficient shares".into()))
            .build();
        let registry = registry_for(&mut broker);
        let request = OrderRequest::new(vec![sym("AAPL")], Side::Sell, Amount::Shares(dec!(5)), false).unwrap();

        let notifier = Notifier::quiet(MemorySink::default());
        let outcomes = Executor::new(&notifier, ExecutorOptions::default())
            .execute(&mut broker, &registry, &request);

        assert_eq!(outcomes[0].status, OrderStatus::Rejected);
        assert_eq!(outcomes[0].order_type, Some(OrderType::Market));
        assert!(outcomes[0].detail.ends_with(REJECTION_HINT));
    }

    #[test]
    fn fault_records_progress_and_captures() {
        let mut broker = MockBroker::builder("Mock", "Mock 1")
            .with_account("A1", "Individual", dec!(100))
            .with_quote(sym("AAPL"), dec!(150), dec!(149.95))
            .fail_on("A1", brokerbot_broker::mock::MockStep::Preview)
            .build();
        let journal = broker.journal();
        let registry = registry_for(&mut broker);
        let request = OrderRequest::new(vec![sym("AAPL")], Side::Buy, Amount::Shares(dec!(2)), false).unwrap();

        let notifier = Notifier::quiet(MemorySink::default());
        let outcomes = Executor::new(&notifier, ExecutorOptions::default())
            .execute(&mut broker, &registry, &request);

        let o = &outcomes[0];
        assert_eq!(o.status, OrderStatus::Error);
        assert_eq!(o.quantity, Some(dec!(2)));
        assert_eq!(o.order_type, Some(OrderType::Market));
        assert!(o.detail.contains("preview failed"), "{}", o.detail);
        assert_eq!(journal.captures(), vec!["AAPL-A1".to_string()]);
    }
}
