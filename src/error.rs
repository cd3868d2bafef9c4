//! Validation and integrity errors for core domain values.

/// Errors raised while building requests or aggregating account data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Symbol is empty or contains characters no exchange ticker uses.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// The order request is not internally consistent.
    #[error("invalid order request: {0}")]
    InvalidRequest(String),

    /// Account columns disagree, or an account number repeats.
    #[error("account discovery failed: {0}")]
    AccountDiscovery(String),

    /// A balance string could not be parsed after normalization.
    #[error("malformed balance {raw:?}")]
    Balance { raw: String },

    /// A share quantity could not be parsed.
    #[error("malformed quantity {raw:?}")]
    Quantity { raw: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            CoreError::InvalidSymbol("A B".into()).to_string(),
            "invalid symbol: \"A B\""
        );
        assert_eq!(
            CoreError::Balance { raw: "$x".into() }.to_string(),
            "malformed balance \"$x\""
        );
    }

    #[test]
    fn is_error() {
        let err: Box<dyn std::error::Error> =
            Box::new(CoreError::AccountDiscovery("lengths 3/3/2".into()));
        assert!(err.to_string().contains("3/3/2"));
    }
}
