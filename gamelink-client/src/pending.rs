//! Pending-request table: correlates responses with in-flight requests by
//! sequence number and arms a per-request timeout.
//!
//! Grounded in the same shape as a transaction table keyed by message id with
//! one-shot completion and a receive-with-timeout wait, translated into
//! Tokio's async primitives: a `Mutex<HashMap<..>>` guarding `oneshot`
//! senders, with each entry's timeout driven by a spawned `sleep` task
//! instead of a blocking `recv_timeout`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gamelink_protocol::{Packet, SequenceCounter};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::ClientError;

/// Outcome delivered to a request's waiter.
#[derive(Debug)]
pub enum RequestOutcome {
    Response(Packet),
    Application {
        error_code: u16,
        stage_id: i64,
        msg_seq: u16,
        request: Packet,
    },
    Timeout,
    Disconnected,
}

impl RequestOutcome {
    pub fn into_result(self) -> Result<Packet, ClientError> {
        match self {
            RequestOutcome::Response(p) => Ok(p),
            RequestOutcome::Application {
                error_code,
                stage_id,
                msg_seq,
                ..
            } => Err(ClientError::Application {
                error_code,
                stage_id,
                msg_seq,
            }),
            RequestOutcome::Timeout => Err(ClientError::RequestTimeout),
            RequestOutcome::Disconnected => Err(ClientError::Disconnected),
        }
    }
}

struct PendingEntry {
    request: Packet,
    is_authenticate: bool,
    completion: oneshot::Sender<RequestOutcome>,
    /// `Some` when a background `tokio::time::sleep` task owns this entry's
    /// timeout. `None` in swept mode, where `deadline` is checked by `sweep`
    /// instead (see "Timers without a background thread").
    timer: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
}

/// Shared, cloneable handle to the table. Cloning shares the same inner map.
#[derive(Clone)]
pub struct PendingTable {
    inner: Arc<Mutex<HashMap<u16, PendingEntry>>>,
    sequence: Arc<SequenceCounter>,
    /// When `false`, no per-request timer task is spawned; the caller must
    /// call `sweep()` on its own tick (e.g. from `MainThreadAction`).
    background_timers: bool,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::with_timer_mode(true)
    }

    pub fn with_timer_mode(background_timers: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            sequence: Arc::new(SequenceCounter::new()),
            background_timers,
        }
    }

    pub fn allocate_seq(&self) -> u16 {
        self.sequence.next()
    }

    /// Register a pending request and arm its timeout. Must be called before
    /// the request's bytes are handed to the transport.
    pub async fn track(
        &self,
        msg_seq: u16,
        request: Packet,
        is_authenticate: bool,
        timeout_duration: Duration,
    ) -> oneshot::Receiver<RequestOutcome> {
        let (tx, rx) = oneshot::channel();
        let (timer, deadline) = if self.background_timers {
            let table = self.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(timeout_duration).await;
                table.fail(msg_seq, RequestOutcome::Timeout).await;
            });
            (Some(handle), None)
        } else {
            (None, Some(Instant::now() + timeout_duration))
        };
        let entry = PendingEntry {
            request,
            is_authenticate,
            completion: tx,
            timer,
            deadline,
        };
        self.inner.lock().await.insert(msg_seq, entry);
        rx
    }

    /// Swept-timer mode: fail every entry whose deadline has passed. A no-op
    /// in background-timer mode, where each entry's own sleep task does this.
    pub async fn sweep(&self) {
        if self.background_timers {
            return;
        }
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        let expired: Vec<u16> = guard
            .iter()
            .filter(|(_, entry)| entry.deadline.is_some_and(|d| now >= d))
            .map(|(seq, _)| *seq)
            .collect();
        for seq in expired {
            if let Some(entry) = guard.remove(&seq) {
                let _ = entry.completion.send(RequestOutcome::Timeout);
            }
        }
    }

    /// A response arrived for `msg_seq`. Returns `true` if it was flagged as
    /// an authenticate request that just succeeded, so the caller can latch
    /// the authenticated flag.
    pub async fn complete(&self, msg_seq: u16, response: Packet) -> bool {
        let entry = self.inner.lock().await.remove(&msg_seq);
        let Some(entry) = entry else {
            // Late response: no matching entry. Silently dropped, never
            // reclassified as a push.
            return false;
        };
        if let Some(timer) = &entry.timer {
            timer.abort();
        }
        let authenticated_now = entry.is_authenticate && response.error_code == 0;
        let outcome = if response.error_code != 0 {
            RequestOutcome::Application {
                error_code: response.error_code,
                stage_id: entry.request.stage_id,
                msg_seq,
                request: entry.request,
            }
        } else {
            RequestOutcome::Response(response)
        };
        let _ = entry.completion.send(outcome);
        authenticated_now
    }

    /// Used by the timeout timer and by send-failure paths.
    pub async fn fail(&self, msg_seq: u16, outcome: RequestOutcome) {
        let entry = self.inner.lock().await.remove(&msg_seq);
        if let Some(entry) = entry {
            if let Some(timer) = &entry.timer {
                timer.abort();
            }
            let _ = entry.completion.send(outcome);
        }
    }

    /// Disconnect path: fail every outstanding request and clear the table.
    pub async fn cancel_all(&self) {
        let mut guard = self.inner.lock().await;
        for (_, entry) in guard.drain() {
            if let Some(timer) = &entry.timer {
                timer.abort();
            }
            let _ = entry.completion.send(RequestOutcome::Disconnected);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn req(seq: u16) -> Packet {
        Packet::new("Req", seq, 0, Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn complete_fulfills_exactly_once() {
        let table = PendingTable::new();
        let seq = table.allocate_seq();
        let rx = table
            .track(seq, req(seq), false, Duration::from_secs(5))
            .await;
        let response = Packet::new("Resp", seq, 0, Bytes::new()).unwrap();
        table.complete(seq, response).await;
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, RequestOutcome::Response(_)));
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn late_response_is_dropped() {
        let table = PendingTable::new();
        // no tracked entry for seq 99
        let authenticated = table
            .complete(99, Packet::new("Resp", 99, 0, Bytes::new()).unwrap())
            .await;
        assert!(!authenticated);
    }

    #[tokio::test]
    async fn timeout_fires_when_no_response_arrives() {
        let table = PendingTable::new();
        let seq = table.allocate_seq();
        let rx = table
            .track(seq, req(seq), false, Duration::from_millis(20))
            .await;
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, RequestOutcome::Timeout));
    }

    #[tokio::test]
    async fn cancel_all_fails_every_pending() {
        let table = PendingTable::new();
        let seq1 = table.allocate_seq();
        let seq2 = table.allocate_seq();
        let rx1 = table
            .track(seq1, req(seq1), false, Duration::from_secs(5))
            .await;
        let rx2 = table
            .track(seq2, req(seq2), false, Duration::from_secs(5))
            .await;
        table.cancel_all().await;
        assert!(matches!(rx1.await.unwrap(), RequestOutcome::Disconnected));
        assert!(matches!(rx2.await.unwrap(), RequestOutcome::Disconnected));
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn swept_mode_times_out_only_on_sweep() {
        let table = PendingTable::with_timer_mode(false);
        let seq = table.allocate_seq();
        let rx = table
            .track(seq, req(seq), false, Duration::from_millis(10))
            .await;
        // No background task armed, so nothing happens until swept.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(table.len().await, 1);
        table.sweep().await;
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, RequestOutcome::Timeout));
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn authenticate_flag_latches_only_on_success() {
        let table = PendingTable::new();
        let seq = table.allocate_seq();
        table
            .track(seq, req(seq), true, Duration::from_secs(5))
            .await;
        let mut response = Packet::new("AuthReply", seq, 0, Bytes::new()).unwrap();
        response.error_code = 0;
        let latched = table.complete(seq, response).await;
        assert!(latched);
    }
}
