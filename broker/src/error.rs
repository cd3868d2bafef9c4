//! Broker error types.

use brokerbot::CoreError;

/// Errors that can occur during broker operations.
///
/// `Auth` and `AccountDiscovery` end a provider's run; everything else ends
/// only the attempt in progress.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("authentication error: {0}")]
    Auth(String),

    #[error("account discovery error: {0}")]
    AccountDiscovery(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("page element error: {0}")]
    Element(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("order error: {0}")]
    Order(String),

    #[error("{0}")]
    Other(String),
}

impl BrokerError {
    /// Errors that exclude the whole provider from the run.
    pub fn is_provider_fatal(&self) -> bool {
        matches!(self, BrokerError::Auth(_) | BrokerError::AccountDiscovery(_))
    }
}

impl From<CoreError> for BrokerError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::AccountDiscovery(_) | CoreError::Balance { .. } => {
                BrokerError::AccountDiscovery(e.to_string())
            }
            // A malformed ticker in provider data is a parse fault; only the
            // order ticket reports SymbolNotFound.
            CoreError::InvalidSymbol(_)
            | CoreError::InvalidRequest(_)
            | CoreError::Quantity { .. } => BrokerError::Parse(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_fatal_classification() {
        assert!(BrokerError::Auth("bad password".into()).is_provider_fatal());
        assert!(BrokerError::AccountDiscovery("3/3/2".into()).is_provider_fatal());
        assert!(!BrokerError::Timeout("page load".into()).is_provider_fatal());
        assert!(!BrokerError::SymbolNotFound("ZZZZ".into()).is_provider_fatal());
    }

    #[test]
    fn core_balance_error_is_discovery() {
        let e: BrokerError = CoreError::Balance { raw: "n/a".into() }.into();
        assert!(matches!(e, BrokerError::AccountDiscovery(_)));
        assert!(e.is_provider_fatal());
    }

    #[test]
    fn malformed_ticker_in_provider_data_is_a_parse_fault() {
        let e: BrokerError = CoreError::InvalidSymbol("BRK B!".into()).into();
        assert!(matches!(e, BrokerError::Parse(_)));
        assert!(!e.is_provider_fatal());
    }
}
