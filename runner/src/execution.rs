//! Run orchestration: log in → discover accounts → report or trade.
//!
//! Each provider runs on its own scoped thread; the sessions of one
//! provider are driven one after another.

use std::fmt;
use std::thread;

use brokerbot::{AccountRegistry, OrderOutcome, OrderRequest, OrderStatus};
use brokerbot_broker::fidelity::FidelitySession;
use brokerbot_broker::robinhood::RobinhoodSession;
use brokerbot_broker::{Broker, BrokerError, Credential};
use chrono::Local;
use log::{error, info, warn};
use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::credentials;
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorOptions};
use crate::holdings;
use crate::notify::{DiscordWebhook, Notifier};
use crate::session::SessionGuard;

/// A boxed session that can move to a provider thread.
pub type DynBroker = Box<dyn Broker + Send>;

/// Supported brokerages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Provider {
    Fidelity,
    Robinhood,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Fidelity, Provider::Robinhood];

    pub fn name(self) -> &'static str {
        match self {
            Provider::Fidelity => "Fidelity",
            Provider::Robinhood => "Robinhood",
        }
    }

    /// Environment variable holding this provider's credential list.
    pub fn env_var(self) -> &'static str {
        match self {
            Provider::Fidelity => "FIDELITY",
            Provider::Robinhood => "ROBINHOOD",
        }
    }

    fn enabled_in(self, config: &Config) -> bool {
        match self {
            Provider::Fidelity => config.fidelity.enabled,
            Provider::Robinhood => config.robinhood.enabled,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every logged-in session of one provider plus its account registry.
pub struct Brokerage {
    sessions: Vec<SessionGuard<DynBroker>>,
    registry: AccountRegistry,
}

impl Brokerage {
    /// Log in every credential, then discover accounts.
    ///
    /// Any failure is fatal for the whole provider: sessions already open
    /// are logged out before the error is returned.
    pub fn connect<F>(name: &str, credentials: &[Credential], mut login: F) -> std::result::Result<Self, BrokerError>
    where
        F: FnMut(&str, &Credential) -> std::result::Result<DynBroker, BrokerError>,
    {
        let mut sessions = Vec::with_capacity(credentials.len());
        for (i, credential) in credentials.iter().enumerate() {
            let label = format!("{name} {}", i + 1);
            sessions.push(SessionGuard::new(login(&label, credential)?));
        }
        Self::discover(name, sessions)
    }

    /// Build the registry from already open sessions.
    pub fn discover(
        name: &str,
        mut sessions: Vec<SessionGuard<DynBroker>>,
    ) -> std::result::Result<Self, BrokerError> {
        let mut registry = AccountRegistry::new(name);
        for session in &mut sessions {
            let records = session.list_accounts()?;
            let label = session.label().to_string();
            let count = registry.refresh(&label, records)?;
            info!("{label}: {count} accounts");
        }
        info!(
            "{name}: {} accounts across {} logins",
            registry.account_count(),
            sessions.len()
        );
        Ok(Self {
            sessions,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        self.registry.brokerage()
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Send each login's accounts and balances.
    pub fn report_accounts(&self, notifier: &Notifier) {
        for label in self.registry.labels() {
            let Some(accounts) = self.registry.accounts(label) else {
                continue;
            };
            notifier.send(&format!(
                "{label}: {} accounts, ${:.2} total",
                accounts.len(),
                self.registry.total_balance(label)
            ));
            for (id, info) in accounts {
                notifier.send(&format!("  {id} ({}): ${:.2}", info.kind, info.balance));
            }
        }
    }

    /// Send the holdings report for every session. Returns rows reported.
    pub fn report_holdings(&mut self, notifier: &Notifier) -> usize {
        notifier.send(&format!("{} Holdings", self.registry.brokerage()));
        let mut rows = 0;
        for session in &mut self.sessions {
            rows += holdings::report_holdings(&mut **session, &self.registry, notifier);
        }
        rows
    }

    /// Run the order request on every session, in order.
    pub fn execute(
        &mut self,
        request: &OrderRequest,
        notifier: &Notifier,
        options: &ExecutorOptions,
    ) -> Vec<OrderOutcome> {
        let executor = Executor::new(notifier, options.clone());
        let mut outcomes = Vec::new();
        for session in &mut self.sessions {
            outcomes.extend(executor.execute(&mut **session, &self.registry, request));
        }
        outcomes
    }

    /// Log every session out.
    pub fn close(self) {
        for session in self.sessions {
            let label = session.label().to_string();
            if let Err(e) = session.close() {
                warn!("{label}: logout failed: {e}");
            }
        }
    }
}

/// Run `f` on every brokerage concurrently, one thread each.
///
/// Results come back in brokerage order. A panicking provider thread is
/// logged and contributes no result.
pub fn run_each<T, F>(brokerages: &mut [Brokerage], f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&mut Brokerage) -> T + Sync,
{
    let f = &f;
    thread::scope(|s| {
        let handles: Vec<_> = brokerages
            .iter_mut()
            .map(|b| {
                let name = b.name().to_string();
                (name, s.spawn(move || f(b)))
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|(name, h)| match h.join() {
                Ok(v) => Some(v),
                Err(_) => {
                    error!("{name}: provider thread panicked");
                    None
                }
            })
            .collect()
    })
}

/// Providers to run: the requested ones (all when none given) that the
/// config leaves enabled.
pub fn select_providers(config: &Config, requested: &[Provider]) -> Vec<Provider> {
    let wanted: &[Provider] = if requested.is_empty() {
        &Provider::ALL
    } else {
        requested
    };
    Provider::ALL
        .into_iter()
        .filter(|p| wanted.contains(p) && p.enabled_in(config))
        .collect()
}

fn open_session(
    config: &Config,
    provider: Provider,
    label: &str,
    credential: &Credential,
) -> std::result::Result<DynBroker, BrokerError> {
    match provider {
        Provider::Fidelity => Ok(Box::new(FidelitySession::login(
            label,
            credential,
            config.fidelity_options(),
        )?)),
        Provider::Robinhood => Ok(Box::new(RobinhoodSession::login(
            label,
            credential,
            config.robinhood_options(),
        )?)),
    }
}

fn connect_provider(config: &Config, provider: Provider, notifier: &Notifier) -> Option<Brokerage> {
    let credentials = match credentials::from_env(provider.env_var()) {
        Ok(Some(c)) => c,
        Ok(None) => {
            notifier.send(&format!("{provider} not found, skipping..."));
            return None;
        }
        Err(e) => {
            notifier.send(&format!("{provider}: {e}, skipping..."));
            return None;
        }
    };

    let result = Brokerage::connect(provider.name(), &credentials, |label, credential| {
        open_session(config, provider, label, credential)
    });
    match result {
        Ok(b) => {
            notifier.send(&format!("Logged in to {provider} ({} sessions)", b.session_count()));
            Some(b)
        }
        Err(e) => {
            let err = Error::Provider {
                provider: provider.name().to_string(),
                source: e,
            };
            error!("{err}");
            notifier.send(&format!("{err}; skipping {provider} for this run"));
            None
        }
    }
}

/// Log in to every selected provider concurrently. Failed providers are
/// reported and left out.
pub fn connect_all(config: &Config, providers: &[Provider], notifier: &Notifier) -> Vec<Brokerage> {
    thread::scope(|s| {
        let handles: Vec<_> = providers
            .iter()
            .map(|&p| (p, s.spawn(move || connect_provider(config, p, notifier))))
            .collect();
        handles
            .into_iter()
            .filter_map(|(p, h)| match h.join() {
                Ok(b) => b,
                Err(_) => {
                    error!("{p}: login thread panicked");
                    None
                }
            })
            .collect()
    })
}

/// Notifier for a run: console, plus Discord when a webhook is configured.
pub fn notifier_for(config: &Config) -> Result<Notifier> {
    match &config.notify.discord_webhook_url {
        Some(url) => Ok(Notifier::with_chat(DiscordWebhook::new(url)?)),
        None => Ok(Notifier::console()),
    }
}

/// Counts of attempt outcomes for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub placed: usize,
    pub rejected: usize,
    pub dry_run: usize,
    pub errored: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[OrderOutcome]) -> Self {
        let mut counts: FxHashMap<OrderStatus, usize> = FxHashMap::default();
        for o in outcomes {
            *counts.entry(o.status).or_default() += 1;
        }
        let get = |s| counts.get(&s).copied().unwrap_or(0);
        Self {
            placed: get(OrderStatus::Placed),
            rejected: get(OrderStatus::Rejected),
            dry_run: get(OrderStatus::DryRun),
            errored: get(OrderStatus::Error),
        }
    }

    pub fn total(&self) -> usize {
        self.placed + self.rejected + self.dry_run + self.errored
    }

    pub fn has_errors(&self) -> bool {
        self.errored > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts: {} placed, {} rejected, {} dry run, {} errored",
            self.total(),
            self.placed,
            self.rejected,
            self.dry_run,
            self.errored
        )
    }
}

/// Options for a trade run.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub providers: Vec<Provider>,
    /// Skip the confirmation prompt.
    pub force: bool,
}

fn connect_selected(config: &Config, requested: &[Provider], notifier: &Notifier) -> Result<Vec<Brokerage>> {
    let providers = select_providers(config, requested);
    if providers.is_empty() {
        return Err(Error::Config("no enabled brokerage selected".into()));
    }
    let brokerages = connect_all(config, &providers, notifier);
    if brokerages.is_empty() {
        return Err(Error::NoSessions);
    }
    Ok(brokerages)
}

/// Log in and print every account with its balance.
pub fn show_accounts(config: &Config, providers: &[Provider], notifier: &Notifier) -> Result<()> {
    let brokerages = connect_selected(config, providers, notifier)?;
    for b in brokerages {
        b.report_accounts(notifier);
        b.close();
    }
    Ok(())
}

/// Log in and send the holdings report for every account.
pub fn show_holdings(config: &Config, providers: &[Provider], notifier: &Notifier) -> Result<()> {
    let mut brokerages = connect_selected(config, providers, notifier)?;
    let rows: usize = run_each(&mut brokerages, |b| b.report_holdings(notifier))
        .into_iter()
        .sum();
    info!("{rows} holdings rows reported");
    for b in brokerages {
        b.close();
    }
    Ok(())
}

/// Run an order request across every selected provider.
pub fn trade(
    config: &Config,
    request: &OrderRequest,
    opts: &RunOptions,
    notifier: &Notifier,
) -> Result<RunSummary> {
    if !request.dry_run() && !opts.force {
        let symbols: Vec<String> = request.symbols().iter().map(|s| s.to_string()).collect();
        let prompt = format!(
            "{} {} of {} in every account. Execute?",
            request.side(),
            request.amount(),
            symbols.join(", ")
        );
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;
        if !confirmed {
            return Err(Error::Aborted("declined at confirmation".into()));
        }
    }

    let started = Local::now();
    let mut brokerages = connect_selected(config, &opts.providers, notifier)?;
    let options = ExecutorOptions {
        attempt_interval: config.attempt_interval(),
    };

    let outcomes: Vec<OrderOutcome> = run_each(&mut brokerages, |b| b.execute(request, notifier, &options))
        .into_iter()
        .flatten()
        .collect();

    for b in brokerages {
        b.close();
    }

    let summary = RunSummary::from_outcomes(&outcomes);
    notifier.send(&format!(
        "Run started {}: {summary}",
        started.format("%Y-%m-%d %H:%M:%S")
    ));
    Ok(summary)
}
