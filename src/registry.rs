//! Account registry: login label → account number → {type, balance}.
//!
//! One registry per brokerage. Each login label (e.g. "Fidelity 1") owns the
//! set of accounts discovered through its session. A refresh replaces the
//! label's accounts wholesale or not at all.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::types::{AccountId, AccountRecord};

/// Account type and balance for one discovered account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub kind: String,
    pub balance: Decimal,
}

/// Accounts of every login of one brokerage.
#[derive(Clone, Debug, Default)]
pub struct AccountRegistry {
    brokerage: String,
    logins: BTreeMap<String, BTreeMap<AccountId, AccountInfo>>,
}

impl AccountRegistry {
    pub fn new(brokerage: impl Into<String>) -> Self {
        Self {
            brokerage: brokerage.into(),
            logins: BTreeMap::new(),
        }
    }

    /// Brokerage name this registry belongs to.
    pub fn brokerage(&self) -> &str {
        &self.brokerage
    }

    /// Replace the accounts of `label` with `records`.
    ///
    /// Fails without touching the registry if an account number repeats.
    /// Returns the number of accounts stored.
    pub fn refresh(&mut self, label: &str, records: Vec<AccountRecord>) -> Result<usize, CoreError> {
        let mut accounts = BTreeMap::new();
        for record in records {
            let id = record.id.clone();
            let info = AccountInfo {
                kind: record.kind,
                balance: record.balance,
            };
            if accounts.insert(record.id, info).is_some() {
                return Err(CoreError::AccountDiscovery(format!(
                    "{label}: account {id} listed more than once"
                )));
            }
        }
        let count = accounts.len();
        self.logins.insert(label.to_string(), accounts);
        Ok(count)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.logins.keys().map(String::as_str)
    }

    pub fn accounts(&self, label: &str) -> Option<&BTreeMap<AccountId, AccountInfo>> {
        self.logins.get(label)
    }

    /// Account numbers of a login, in registry order. Empty for unknown labels.
    pub fn account_ids(&self, label: &str) -> Vec<AccountId> {
        self.logins
            .get(label)
            .map(|accts| accts.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_balance(&self, label: &str) -> Decimal {
        self.logins
            .get(label)
            .map(|accts| accts.values().map(|a| a.balance).sum())
            .unwrap_or_default()
    }

    /// Accounts across every login.
    pub fn account_count(&self) -> usize {
        self.logins.values().map(BTreeMap::len).sum()
    }
}

/// Strip currency symbols, thousands separators, whitespace, and a
/// `balance:` label from a scraped balance string.
pub fn normalize_balance(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let without_label = lowered.replace("balance:", "");
    without_label
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '$' | ',' | '€' | '£' | '¥'))
        .collect()
}

/// Parse a scraped balance string into a decimal.
pub fn parse_balance(raw: &str) -> Result<Decimal, CoreError> {
    let cleaned = normalize_balance(raw);
    Decimal::from_str(&cleaned).map_err(|_| CoreError::Balance {
        raw: raw.to_string(),
    })
}

/// Join three scraped columns (account numbers, balances, account names)
/// into records.
///
/// The columns come from independent page queries, so a length mismatch
/// means the page was read mid-render or its layout changed; that is an
/// error, never a partial join. Any malformed balance fails the whole join.
pub fn join_account_columns(
    ids: &[String],
    balances: &[String],
    names: &[String],
) -> Result<Vec<AccountRecord>, CoreError> {
    if ids.len() != balances.len() || ids.len() != names.len() {
        return Err(CoreError::AccountDiscovery(format!(
            "column lengths differ: {} ids, {} balances, {} names",
            ids.len(),
            balances.len(),
            names.len()
        )));
    }

    ids.iter()
        .zip(balances)
        .zip(names)
        .map(|((id, balance), name)| {
            Ok(AccountRecord {
                id: AccountId::new(id.trim()),
                kind: name.trim().to_string(),
                balance: parse_balance(balance)?,
            })
        })
        .collect()
}
