//! Keep-alive / idle monitor: heartbeat emission and dead-peer detection
//! driven off two independent last-activity clocks.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::ClientConfig;

/// What a monitor tick decided should happen.
#[derive(Debug, PartialEq, Eq)]
pub enum TickAction {
    /// Nothing to do.
    Idle,
    /// Emit a heartbeat now.
    SendHeartbeat,
    /// Declare the link dead (heartbeat timeout or idle timeout).
    DeclareDead,
}

pub struct KeepAliveMonitor {
    last_recv_at: Mutex<Instant>,
    last_send_heartbeat_at: Mutex<Instant>,
    heartbeat_interval: Option<Duration>,
    heartbeat_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
}

impl KeepAliveMonitor {
    pub fn new(config: &ClientConfig) -> Self {
        let now = Instant::now();
        Self {
            last_recv_at: Mutex::new(now),
            last_send_heartbeat_at: Mutex::new(now),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }

    /// Call whenever any inbound bytes arrive, including heartbeat echoes.
    pub fn record_activity(&self) {
        *self.last_recv_at.lock().unwrap() = Instant::now();
    }

    /// Call when a connection becomes active, so a gap between `Client::new`
    /// and `connect()` (or time spent disconnected before a reconnect) isn't
    /// mistaken for heartbeat/idle silence on the new link.
    pub fn reset_clocks(&self) {
        let now = Instant::now();
        *self.last_recv_at.lock().unwrap() = now;
        *self.last_send_heartbeat_at.lock().unwrap() = now;
    }

    fn record_heartbeat_sent(&self) {
        *self.last_send_heartbeat_at.lock().unwrap() = Instant::now();
    }

    /// Evaluate one tick. `authenticated` gates the idle-timeout check, which
    /// only applies once authentication has completed.
    pub fn tick(&self, authenticated: bool) -> TickAction {
        let now = Instant::now();
        let last_recv = *self.last_recv_at.lock().unwrap();

        if let Some(heartbeat_timeout) = self.heartbeat_timeout {
            if now.duration_since(last_recv) > heartbeat_timeout {
                return TickAction::DeclareDead;
            }
        }

        if authenticated {
            if let Some(idle_timeout) = self.idle_timeout {
                if now.duration_since(last_recv) > idle_timeout {
                    return TickAction::DeclareDead;
                }
            }
        }

        if let Some(interval) = self.heartbeat_interval {
            let last_sent = *self.last_send_heartbeat_at.lock().unwrap();
            if now.duration_since(last_sent) > interval {
                self.record_heartbeat_sent();
                return TickAction::SendHeartbeat;
            }
        }

        TickAction::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(heartbeat_interval_ms: u64, heartbeat_timeout_ms: u64, idle_ms: u64) -> ClientConfig {
        let mut cfg = ClientConfig::default();
        cfg.heartbeat_interval_ms = heartbeat_interval_ms;
        cfg.heartbeat_timeout_ms = heartbeat_timeout_ms;
        cfg.connection_idle_timeout_ms = idle_ms;
        cfg
    }

    #[test]
    fn idle_tick_does_nothing_before_interval_elapses() {
        let monitor = KeepAliveMonitor::new(&config_with(10_000, 30_000, 30_000));
        assert_eq!(monitor.tick(false), TickAction::Idle);
    }

    #[test]
    fn sends_heartbeat_after_interval() {
        let monitor = KeepAliveMonitor::new(&config_with(1, 30_000, 30_000));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(monitor.tick(false), TickAction::SendHeartbeat);
    }

    #[test]
    fn declares_dead_after_heartbeat_timeout() {
        let monitor = KeepAliveMonitor::new(&config_with(10_000, 1, 30_000));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(monitor.tick(false), TickAction::DeclareDead);
    }

    #[test]
    fn idle_timeout_only_applies_when_authenticated() {
        let monitor = KeepAliveMonitor::new(&config_with(10_000, 30_000, 1));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(monitor.tick(false), TickAction::Idle);
        assert_eq!(monitor.tick(true), TickAction::DeclareDead);
    }

    #[test]
    fn disabled_thresholds_never_fire() {
        let monitor = KeepAliveMonitor::new(&config_with(0, 0, 0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(monitor.tick(true), TickAction::Idle);
    }

    #[test]
    fn record_activity_resets_the_clock() {
        let monitor = KeepAliveMonitor::new(&config_with(10_000, 1, 30_000));
        std::thread::sleep(Duration::from_millis(5));
        monitor.record_activity();
        assert_eq!(monitor.tick(false), TickAction::Idle);
    }

    #[test]
    fn reset_clocks_clears_a_stale_gap_before_connect() {
        let monitor = KeepAliveMonitor::new(&config_with(10_000, 1, 30_000));
        std::thread::sleep(Duration::from_millis(5));
        // Without a reset this would already be DeclareDead from construction time.
        monitor.reset_clocks();
        assert_eq!(monitor.tick(false), TickAction::Idle);
    }
}
