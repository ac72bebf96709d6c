//! Connection state machine: `Disconnected` / `Connecting` / `Connected` /
//! `Reconnecting` / `Disconnecting`, plus the authenticated flag and the
//! intentional-disconnect marker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

/// Holds the current state, the authenticated flag, and whether the last
/// disconnect was caused by the application calling `disconnect()`.
pub struct StateMachine {
    state: Mutex<ConnectionState>,
    authenticated: AtomicBool,
    intentional_disconnect: AtomicBool,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            authenticated: AtomicBool::new(false),
            intentional_disconnect: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.current() == ConnectionState::Connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// `Connect()` is only legal from `Disconnected`.
    pub fn begin_connect(&self) -> Result<(), ClientError> {
        let mut guard = self.state.lock().unwrap();
        if *guard != ConnectionState::Disconnected {
            return Err(ClientError::IllegalState(
                "connect() called while not Disconnected",
            ));
        }
        *guard = ConnectionState::Connecting;
        Ok(())
    }

    pub fn connect_succeeded(&self) {
        let mut guard = self.state.lock().unwrap();
        if *guard == ConnectionState::Connecting || *guard == ConnectionState::Reconnecting {
            *guard = ConnectionState::Connected;
        }
    }

    /// Transport failed while connecting. Returns to `Disconnected`.
    pub fn connect_failed(&self) {
        self.enter_disconnected(false);
    }

    /// `Authenticate()` is only legal from `Connected` while not already authenticated.
    pub fn begin_authenticate(&self) -> Result<(), ClientError> {
        let guard = self.state.lock().unwrap();
        if *guard != ConnectionState::Connected {
            return Err(ClientError::Disconnected);
        }
        if self.authenticated.load(Ordering::Acquire) {
            return Err(ClientError::IllegalState(
                "authenticate() called while already authenticated",
            ));
        }
        Ok(())
    }

    pub fn mark_authenticated(&self) {
        self.authenticated.store(true, Ordering::Release);
    }

    /// `Send`/`Request` are only legal while `Connected`.
    pub fn require_connected(&self) -> Result<(), ClientError> {
        if self.current() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ClientError::Disconnected)
        }
    }

    pub fn require_authenticated(&self) -> Result<(), ClientError> {
        self.require_connected()?;
        if self.authenticated.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ClientError::Unauthenticated)
        }
    }

    /// User-initiated disconnect. Idempotent; marks the cause as intentional
    /// so the dispatcher suppresses the `Disconnect` event.
    pub fn begin_intentional_disconnect(&self) -> bool {
        let mut guard = self.state.lock().unwrap();
        if *guard == ConnectionState::Disconnected {
            return false;
        }
        *guard = ConnectionState::Disconnecting;
        self.intentional_disconnect.store(true, Ordering::Release);
        true
    }

    /// Link lost, protocol error, or idle/heartbeat timeout. Unintentional.
    pub fn link_lost(&self) {
        self.enter_disconnected(false);
    }

    pub fn intentional_disconnect_complete(&self) {
        self.enter_disconnected(true);
    }

    fn enter_disconnected(&self, intentional: bool) {
        let mut guard = self.state.lock().unwrap();
        *guard = ConnectionState::Disconnected;
        self.authenticated.store(false, Ordering::Release);
        self.intentional_disconnect
            .store(intentional, Ordering::Release);
    }

    /// Consume the intentional-disconnect marker: true if the disconnect we
    /// just entered was caused by the application, rather than link loss.
    pub fn take_was_intentional(&self) -> bool {
        self.intentional_disconnect.swap(false, Ordering::AcqRel)
    }

    pub fn begin_reconnect(&self) -> Result<(), ClientError> {
        let mut guard = self.state.lock().unwrap();
        if *guard != ConnectionState::Disconnected {
            return Err(ClientError::IllegalState(
                "reconnect() called while not Disconnected",
            ));
        }
        *guard = ConnectionState::Reconnecting;
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_then_connected_then_disconnect() {
        let sm = StateMachine::new();
        sm.begin_connect().unwrap();
        assert_eq!(sm.current(), ConnectionState::Connecting);
        sm.connect_succeeded();
        assert_eq!(sm.current(), ConnectionState::Connected);
        assert!(sm.begin_intentional_disconnect());
        sm.intentional_disconnect_complete();
        assert_eq!(sm.current(), ConnectionState::Disconnected);
        assert!(sm.take_was_intentional());
    }

    #[test]
    fn second_connect_is_illegal() {
        let sm = StateMachine::new();
        sm.begin_connect().unwrap();
        sm.connect_succeeded();
        assert!(sm.begin_connect().is_err());
    }

    #[test]
    fn authenticated_flag_clears_on_disconnect() {
        let sm = StateMachine::new();
        sm.begin_connect().unwrap();
        sm.connect_succeeded();
        sm.mark_authenticated();
        assert!(sm.is_authenticated());
        sm.link_lost();
        assert!(!sm.is_authenticated());
        assert!(!sm.take_was_intentional());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let sm = StateMachine::new();
        sm.begin_connect().unwrap();
        sm.connect_succeeded();
        assert!(sm.begin_intentional_disconnect());
        sm.intentional_disconnect_complete();
        assert!(!sm.begin_intentional_disconnect());
    }

    #[test]
    fn send_gated_while_not_connected() {
        let sm = StateMachine::new();
        assert!(sm.require_connected().is_err());
    }
}
