//! Integration tests for the order executor and run orchestration, driven
//! by scripted mock sessions.

use brokerbot::{AccountId, Amount, OrderRequest, OrderStatus, OrderType, Side, Symbol};
use brokerbot_broker::BrokerError;
use brokerbot_broker::mock::{MockBroker, MockStep};
use brokerbot_runner::execution::{Brokerage, DynBroker, RunSummary, run_each};
use brokerbot_runner::executor::{ExecutorOptions, REJECTION_HINT};
use brokerbot_runner::notify::{MemorySink, Notifier};
use brokerbot_runner::session::SessionGuard;
use rust_decimal_macros::dec;

fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

fn aapl() -> Symbol {
    sym("AAPL")
}

fn msft() -> Symbol {
    sym("MSFT")
}

fn gme() -> Symbol {
    sym("GME")
}

/// One login with three accounts and quotes for AAPL, MSFT, GME.
fn three_account_broker(label: &str) -> MockBroker {
    MockBroker::builder("Mock", label)
        .with_account("A1", "Individual", dec!(1000))
        .with_account("A2", "ROTH IRA", dec!(250.50))
        .with_account("A3", "Cash Management", dec!(0))
        .with_quote(aapl(), dec!(150.00), dec!(149.95))
        .with_quote(msft(), dec!(410.10), dec!(410.00))
        .with_quote(gme(), dec!(0.85), dec!(0.80))
        .build()
}

fn brokerage(name: &str, brokers: Vec<MockBroker>) -> Brokerage {
    let sessions = brokers
        .into_iter()
        .map(|b| SessionGuard::new(Box::new(b) as DynBroker))
        .collect();
    Brokerage::discover(name, sessions).unwrap()
}

fn request(symbols: Vec<Symbol>, side: Side, amount: Amount, dry_run: bool) -> OrderRequest {
    OrderRequest::new(symbols, side, amount, dry_run).unwrap()
}

fn run(b: &mut Brokerage, req: &OrderRequest) -> (Vec<brokerbot::OrderOutcome>, Vec<String>) {
    let sink = MemorySink::default();
    let notifier = Notifier::quiet(sink.clone());
    let outcomes = b.execute(req, &notifier, &ExecutorOptions::default());
    notifier.shutdown();
    (outcomes, sink.messages())
}

// ============================================================================
// Fan-out
// ============================================================================

#[test]
fn n_symbols_times_m_accounts_outcomes() {
    let mut b = brokerage("Mock", vec![three_account_broker("Mock 1")]);
    let req = request(vec![aapl(), msft()], Side::Buy, Amount::Shares(dec!(1)), false);
    let (outcomes, _) = run(&mut b, &req);

    assert_eq!(outcomes.len(), 2 * 3);
    assert!(outcomes.iter().all(|o| o.status == OrderStatus::Placed));
}

#[test]
fn symbols_outer_accounts_inner() {
    let mut b = brokerage("Mock", vec![three_account_broker("Mock 1")]);
    let req = request(vec![aapl(), msft()], Side::Buy, Amount::Shares(dec!(1)), false);
    let (outcomes, _) = run(&mut b, &req);

    let order: Vec<(String, String)> = outcomes
        .iter()
        .map(|o| (o.symbol.to_string(), o.account_id.to_string()))
        .collect();
    let expected: Vec<(String, String)> = [
        ("AAPL", "A1"),
        ("AAPL", "A2"),
        ("AAPL", "A3"),
        ("MSFT", "A1"),
        ("MSFT", "A2"),
        ("MSFT", "A3"),
    ]
    .iter()
    .map(|(s, a)| (s.to_string(), a.to_string()))
    .collect();
    assert_eq!(order, expected);
}

#[test]
fn every_session_of_a_provider_runs() {
    let mut b = brokerage(
        "Mock",
        vec![three_account_broker("Mock 1"), three_account_broker("Mock 2")],
    );
    let req = request(vec![aapl()], Side::Buy, Amount::Shares(dec!(1)), false);
    let (outcomes, messages) = run(&mut b, &req);

    assert_eq!(outcomes.len(), 6);
    assert_eq!(outcomes.iter().filter(|o| o.session_label == "Mock 2").count(), 3);
    assert!(messages.contains(&"Mock 1: buying 1 of AAPL".to_string()));
    assert!(messages.contains(&"Mock 2: buying 1 of AAPL".to_string()));
}

// ============================================================================
// Amount resolution
// ============================================================================

#[test]
fn sell_all_uses_held_quantity_per_account() {
    let broker = MockBroker::builder("Mock", "Mock 1")
        .with_account("A1", "Individual", dec!(0))
        .with_account("A2", "ROTH IRA", dec!(0))
        .with_position("A1", aapl(), dec!(7), dec!(150))
        .with_position("A2", aapl(), dec!(2.5), dec!(150))
        .with_quote(aapl(), dec!(150.00), dec!(149.95))
        .build();
    let journal = broker.journal();
    let mut b = brokerage("Mock", vec![broker]);
    let req = request(vec![aapl()], Side::Sell, Amount::All, false);
    let (outcomes, _) = run(&mut b, &req);

    let placed = journal.placed();
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[0].quantity, dec!(7));
    assert_eq!(placed[1].quantity, dec!(2.5));
    assert!(outcomes.iter().all(|o| o.amount == Amount::All));
}

#[test]
fn sell_all_with_nothing_held_is_rejected_without_submission() {
    let broker = MockBroker::builder("Mock", "Mock 1")
        .with_account("A1", "Individual", dec!(0))
        .with_position("A1", msft(), dec!(3), dec!(410))
        .with_quote(aapl(), dec!(150.00), dec!(149.95))
        .build();
    let journal = broker.journal();
    let mut b = brokerage("Mock", vec![broker]);
    let req = request(vec![aapl()], Side::Sell, Amount::All, false);
    let (outcomes, _) = run(&mut b, &req);

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, OrderStatus::Rejected);
    assert!(journal.selected().is_empty());
    assert!(journal.previewed().is_empty());
    assert!(journal.placed().is_empty());
}

// ============================================================================
// Order type and price
// ============================================================================

#[test]
fn low_priced_symbol_gets_limit_others_market() {
    let broker = three_account_broker("Mock 1");
    let journal = broker.journal();
    let mut b = brokerage("Mock", vec![broker]);
    let req = request(vec![gme(), aapl()], Side::Buy, Amount::Shares(dec!(1)), false);
    run(&mut b, &req);

    let placed = journal.placed();
    assert_eq!(placed.len(), 6);
    assert!(placed[..3].iter().all(|t| t.order_type == OrderType::Limit(dec!(0.86))));
    assert!(placed[3..].iter().all(|t| t.order_type == OrderType::Market));
}

#[test]
fn low_priced_sell_limit_below_bid() {
    let broker = three_account_broker("Mock 1");
    let journal = broker.journal();
    let mut b = brokerage("Mock", vec![broker]);
    let req = request(vec![gme()], Side::Sell, Amount::Shares(dec!(10)), false);
    run(&mut b, &req);

    assert!(journal
        .placed()
        .iter()
        .all(|t| t.order_type == OrderType::Limit(dec!(0.79))));
}

// ============================================================================
// Dry run
// ============================================================================

#[test]
fn dry_run_previews_but_never_places() {
    let broker = three_account_broker("Mock 1");
    let journal = broker.journal();
    let mut b = brokerage("Mock", vec![broker]);
    let req = request(vec![aapl()], Side::Buy, Amount::Shares(dec!(2)), true);
    let (outcomes, messages) = run(&mut b, &req);

    assert_eq!(journal.previewed().len(), 3);
    assert!(journal.placed().is_empty());
    assert!(outcomes.iter().all(|o| o.status == OrderStatus::DryRun));
    assert!(outcomes.iter().all(|o| o.detail.starts_with("DRY: ")));
    assert!(messages.contains(&"DRY: Mock 1 A2: buy 2 shares of AAPL".to_string()));
}

// ============================================================================
// Rejections and faults
// ============================================================================

#[test]
fn unknown_symbol_rejected_other_symbols_continue() {
    let broker = three_account_broker("Mock 1");
    let journal = broker.journal();
    let mut b = brokerage("Mock", vec![broker]);
    let req = request(vec![sym("ZZZZ"), aapl()], Side::Buy, Amount::Shares(dec!(1)), false);
    let (outcomes, _) = run(&mut b, &req);

    assert_eq!(outcomes.len(), 6);
    assert!(outcomes[..3].iter().all(|o| o.status == OrderStatus::Rejected));
    assert!(outcomes[0].detail.contains("not found"));
    assert_eq!(journal.placed().len(), 3);
}

#[test]
fn fault_on_one_account_does_not_stop_the_next() {
    let broker = MockBroker::builder("Mock", "Mock 1")
        .with_account("A1", "Individual", dec!(0))
        .with_account("A2", "ROTH IRA", dec!(0))
        .with_quote(aapl(), dec!(150.00), dec!(149.95))
        .fail_on("A1", MockStep::Quote)
        .build();
    let journal = broker.journal();
    let mut b = brokerage("Mock", vec![broker]);
    let req = request(vec![aapl()], Side::Buy, Amount::Shares(dec!(1)), false);
    let (outcomes, messages) = run(&mut b, &req);

    assert_eq!(outcomes[0].status, OrderStatus::Error);
    assert_eq!(outcomes[0].account_id, AccountId::new("A1"));
    assert_eq!(outcomes[1].status, OrderStatus::Placed);
    assert_eq!(journal.placed()[0].account, AccountId::new("A2"));
    assert_eq!(journal.captures(), vec!["AAPL-A1".to_string()]);
    assert!(messages.iter().any(|m| m.starts_with("Mock 1 A1: Error buying 1 of AAPL")));
}

#[test]
fn refused_order_carries_cause_hint() {
    let broker = MockBroker::builder("Mock", "Mock 1")
        .with_account("A1", "Individual", dec!(0))
        .with_quote(aapl(), dec!(150.00), dec!(149.95))
        .place_mode(brokerbot_broker::mock::PlaceMode::Reject("pending order".into()))
        .build();
    let mut b = brokerage("Mock", vec![broker]);
    let req = request(vec![aapl()], Side::Sell, Amount::Shares(dec!(1)), false);
    let (outcomes, _) = run(&mut b, &req);

    assert_eq!(outcomes[0].status, OrderStatus::Rejected);
    assert_eq!(
        outcomes[0].detail,
        format!("Mock 1 A1: sell 1 shares of AAPL. {REJECTION_HINT}")
    );
}

// ============================================================================
// Provider setup
// ============================================================================

#[test]
fn discovery_failure_excludes_provider_and_logs_out() {
    let good = three_account_broker("Mock 1");
    let bad = MockBroker::builder("Mock", "Mock 2").fail_discovery().build();
    let good_journal = good.journal();
    let bad_journal = bad.journal();

    let sessions = vec![
        SessionGuard::new(Box::new(good) as DynBroker),
        SessionGuard::new(Box::new(bad) as DynBroker),
    ];
    let err = Brokerage::discover("Mock", sessions).err().unwrap();

    assert!(err.is_provider_fatal());
    assert_eq!(good_journal.logouts(), 1);
    assert_eq!(bad_journal.logouts(), 1);
}

#[test]
fn login_failure_tears_down_earlier_sessions() {
    let first = three_account_broker("Mock 1");
    let journal = first.journal();
    let mut pending = Some(first);

    let creds = vec![
        brokerbot_broker::Credential::new("a", "pw", None),
        brokerbot_broker::Credential::new("b", "bad", None),
    ];
    let result = Brokerage::connect("Mock", &creds, |_label, cred| {
        if cred.secret.as_str() == "bad" {
            return Err(BrokerError::Auth("bad password".into()));
        }
        Ok(Box::new(pending.take().unwrap()) as DynBroker)
    });

    assert!(matches!(result, Err(BrokerError::Auth(_))));
    assert_eq!(journal.logouts(), 1);
}

#[test]
fn duplicate_account_ids_fail_discovery() {
    let broker = MockBroker::builder("Mock", "Mock 1")
        .with_account("A1", "Individual", dec!(1))
        .with_account("A1", "Individual", dec!(2))
        .build();
    let sessions = vec![SessionGuard::new(Box::new(broker) as DynBroker)];
    let err = Brokerage::discover("Mock", sessions).err().unwrap();
    assert!(matches!(err, BrokerError::AccountDiscovery(_)));
}

#[test]
fn providers_run_concurrently_and_independently() {
    let healthy = three_account_broker("Alpha 1");
    let faulty = MockBroker::builder("Mock", "Beta 1")
        .with_account("B1", "Individual", dec!(0))
        .with_quote(aapl(), dec!(150.00), dec!(149.95))
        .fail_on("B1", MockStep::Place)
        .build();
    let mut brokerages = vec![
        brokerage("Alpha", vec![healthy]),
        brokerage("Beta", vec![faulty]),
    ];

    let sink = MemorySink::default();
    let notifier = Notifier::quiet(sink.clone());
    let req = request(vec![aapl()], Side::Buy, Amount::Shares(dec!(1)), false);
    let options = ExecutorOptions::default();
    let per_provider = run_each(&mut brokerages, |b| b.execute(&req, &notifier, &options));
    notifier.shutdown();

    assert_eq!(per_provider.len(), 2);
    assert_eq!(per_provider[0].len(), 3);
    assert_eq!(per_provider[1].len(), 1);

    let all: Vec<_> = per_provider.into_iter().flatten().collect();
    let summary = RunSummary::from_outcomes(&all);
    assert_eq!(summary.placed, 3);
    assert_eq!(summary.errored, 1);
    assert!(summary.has_errors());
    assert_eq!(summary.total(), 4);
}

#[test]
fn account_report_lists_balances() {
    let b = brokerage("Mock", vec![three_account_broker("Mock 1")]);
    let sink = MemorySink::default();
    let notifier = Notifier::quiet(sink.clone());
    b.report_accounts(&notifier);
    notifier.shutdown();

    let messages = sink.messages();
    assert_eq!(messages[0], "Mock 1: 3 accounts, $1250.50 total");
    assert!(messages.contains(&"  A2 (ROTH IRA): $250.50".to_string()));
}

#[test]
fn holdings_report_marks_empty_accounts() {
    let broker = MockBroker::builder("Mock", "Mock 1")
        .with_account("A1", "Individual", dec!(0))
        .with_account("A2", "ROTH IRA", dec!(0))
        .with_position("A1", aapl(), dec!(3), dec!(150.456))
        .build();
    let mut b = brokerage("Mock", vec![broker]);
    let sink = MemorySink::default();
    let notifier = Notifier::quiet(sink.clone());
    let rows = b.report_holdings(&notifier);
    notifier.shutdown();

    assert_eq!(rows, 1);
    assert_eq!(
        sink.messages(),
        vec![
            "Mock Holdings".to_string(),
            "Holdings in Mock 1 A1:".to_string(),
            "AAPL: 3 @ $150.46 = $451.38".to_string(),
            "No holdings in Mock 1 A2".to_string(),
        ]
    );
}
