//! Scoped ownership of a broker session.

use std::ops::{Deref, DerefMut};

use brokerbot_broker::{Broker, BrokerError};
use log::{debug, warn};

/// Owns a logged-in session and logs it out when dropped, on every exit
/// path including panics and early returns.
pub struct SessionGuard<B: Broker> {
    broker: B,
    closed: bool,
}

impl<B: Broker> SessionGuard<B> {
    pub fn new(broker: B) -> Self {
        Self {
            broker,
            closed: false,
        }
    }

    /// Log out now and report the result.
    pub fn close(mut self) -> Result<(), BrokerError> {
        self.closed = true;
        self.broker.logout()
    }
}

impl<B: Broker> Deref for SessionGuard<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.broker
    }
}

impl<B: Broker> DerefMut for SessionGuard<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.broker
    }
}

impl<B: Broker> Drop for SessionGuard<B> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        debug!("{}: closing session", self.broker.label());
        if let Err(e) = self.broker.logout() {
            warn!("{}: logout failed: {e}", self.broker.label());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerbot_broker::mock::MockBroker;

    #[test]
    fn drop_logs_out() {
        let broker = MockBroker::builder("Mock", "Mock 1").build();
        let journal = broker.journal();
        {
            let _guard = SessionGuard::new(broker);
        }
        assert_eq!(journal.logouts(), 1);
    }

    #[test]
    fn close_logs_out_once() {
        let broker = MockBroker::builder("Mock", "Mock 1").build();
        let journal = broker.journal();
        let guard = SessionGuard::new(broker);
        guard.close().unwrap();
        assert_eq!(journal.logouts(), 1);
    }

    #[test]
    fn deref_reaches_the_session() {
        let broker = MockBroker::builder("Mock", "Mock 7").build();
        let guard = SessionGuard::new(broker);
        assert_eq!(guard.label(), "Mock 7");
    }

    #[test]
    fn early_return_still_logs_out() {
        fn fails(guard: SessionGuard<MockBroker>) -> Result<(), BrokerError> {
            let _g = guard;
            Err(BrokerError::Other("boom".into()))
        }
        let broker = MockBroker::builder("Mock", "Mock 1").build();
        let journal = broker.journal();
        assert!(fails(SessionGuard::new(broker)).is_err());
        assert_eq!(journal.logouts(), 1);
    }
}
