//! Buffered, consume-once delivery of external signals to a waiting
//! orchestrator.
//!
//! Signals may arrive before the orchestrator starts waiting for them, so
//! they are buffered per step id; each buffered signal is consumed at most
//! once. One hub exists per running change.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio::time::{timeout_at, Duration, Instant};

#[derive(Default)]
struct Buffers {
    evidence: HashMap<String, VecDeque<String>>,
    approvals: HashMap<String, VecDeque<String>>,
}

#[derive(Default)]
pub struct SignalHub {
    inner: Mutex<Buffers>,
    notify: Notify,
}

enum Kind {
    Evidence,
    Approval,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire-and-forget: an evidence artifact was uploaded for a step.
    pub fn evidence_uploaded(&self, step_id: &str, evidence_id: &str) {
        self.push(Kind::Evidence, step_id, evidence_id);
    }

    /// Fire-and-forget: a human granted an override for a step.
    pub fn approval_granted(&self, step_id: &str, approver: &str) {
        self.push(Kind::Approval, step_id, approver);
    }

    /// Wait for the next evidence id for a step, up to `bound`. Returns
    /// `None` on expiry; the signal, if it ever arrives, stays buffered.
    pub async fn wait_evidence(&self, step_id: &str, bound: Duration) -> Option<String> {
        self.wait(Kind::Evidence, step_id, bound).await
    }

    /// Wait for an approver identity for a step, up to `bound`.
    pub async fn wait_approval(&self, step_id: &str, bound: Duration) -> Option<String> {
        self.wait(Kind::Approval, step_id, bound).await
    }

    fn push(&self, kind: Kind, step_id: &str, value: &str) {
        {
            let mut inner = self.inner.lock().expect("signal hub lock");
            let map = match kind {
                Kind::Evidence => &mut inner.evidence,
                Kind::Approval => &mut inner.approvals,
            };
            map.entry(step_id.to_string()).or_default().push_back(value.to_string());
        }
        self.notify.notify_waiters();
    }

    fn pop(&self, kind: &Kind, step_id: &str) -> Option<String> {
        let mut inner = self.inner.lock().expect("signal hub lock");
        let map = match kind {
            Kind::Evidence => &mut inner.evidence,
            Kind::Approval => &mut inner.approvals,
        };
        map.get_mut(step_id).and_then(VecDeque::pop_front)
    }

    async fn wait(&self, kind: Kind, step_id: &str, bound: Duration) -> Option<String> {
        let deadline = Instant::now() + bound;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register for wakeups before checking the buffer, so a signal
            // delivered between the check and the await is not missed.
            notified.as_mut().enable();
            if let Some(value) = self.pop(&kind, step_id) {
                return Some(value);
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.pop(&kind, step_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn buffered_signal_is_delivered_to_a_later_wait() {
        let hub = SignalHub::new();
        hub.evidence_uploaded("S1", "E1");
        let got = hub.wait_evidence("S1", Duration::from_secs(1)).await;
        assert_eq!(got.as_deref(), Some("E1"));
    }

    #[tokio::test(start_paused = true)]
    async fn each_signal_is_consumed_at_most_once() {
        let hub = SignalHub::new();
        hub.evidence_uploaded("S1", "E1");
        assert_eq!(hub.wait_evidence("S1", Duration::from_secs(1)).await.as_deref(), Some("E1"));
        assert_eq!(hub.wait_evidence("S1", Duration::from_secs(1)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn signals_are_keyed_by_step_id() {
        let hub = SignalHub::new();
        hub.approval_granted("S2", "alice");
        assert_eq!(hub.wait_approval("S1", Duration::from_secs(1)).await, None);
        assert_eq!(hub.wait_approval("S2", Duration::from_secs(1)).await.as_deref(), Some("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_expires_without_a_signal() {
        let hub = SignalHub::new();
        let got = hub.wait_evidence("S1", Duration::from_secs(3600)).await;
        assert_eq!(got, None);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_arriving_mid_wait_wakes_the_waiter() {
        let hub = std::sync::Arc::new(SignalHub::new());
        let waiter = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.wait_evidence("S1", Duration::from_secs(60)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        hub.evidence_uploaded("S1", "E9");
        assert_eq!(waiter.await.unwrap().as_deref(), Some("E9"));
    }
}
