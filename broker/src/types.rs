//! Shared broker types: credentials, positions, placement results.

use std::fmt;

use brokerbot::{Decimal, Symbol};
use zeroize::Zeroizing;

use crate::error::BrokerError;
use crate::otp;

/// One login for one provider.
///
/// Secrets are wiped from memory on drop.
#[derive(Clone)]
pub struct Credential {
    pub login: String,
    pub secret: Zeroizing<String>,
    /// Base32 TOTP seed, when the login has app-based 2FA.
    pub totp_seed: Option<Zeroizing<String>>,
}

impl Credential {
    pub fn new(login: &str, secret: &str, totp_seed: Option<&str>) -> Self {
        Self {
            login: login.to_string(),
            secret: Zeroizing::new(secret.to_string()),
            totp_seed: totp_seed.map(|s| Zeroizing::new(s.to_string())),
        }
    }

    /// Current one-time code, if the login has a seed.
    pub fn one_time_code(&self) -> Result<Option<String>, BrokerError> {
        self.totp_seed
            .as_ref()
            .map(|seed| otp::totp_now(seed))
            .transpose()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("login", &self.login)
            .field("secret", &"***")
            .field("totp_seed", &self.totp_seed.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Broker-level position in one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub symbol: Symbol,
    pub quantity: Decimal,
    /// Price as reported alongside the position, if the provider shows one.
    pub price: Option<Decimal>,
}

/// What happened when an order was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The provider confirmed the order.
    Placed { order_id: Option<String> },
    /// The provider refused it (business rejection, not a fault).
    Rejected { reason: String },
}
