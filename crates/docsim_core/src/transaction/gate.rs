//! The global gate serializing top-level transactions.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct GateState {
    held: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// A FIFO mutual-exclusion gate for top-level transactions.
///
/// Waiters queue in arrival order. Releasing hands the gate directly to the
/// next live waiter, so it never becomes free while someone is queued.
#[derive(Debug, Default)]
pub struct TransactionGate {
    state: Mutex<GateState>,
}

impl TransactionGate {
    /// Creates an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the gate is free, then holds it until the permit drops.
    pub async fn acquire(self: &Arc<Self>) -> GatePermit {
        let receiver = {
            let mut state = self.state.lock();
            if !state.held {
                state.held = true;
                return GatePermit {
                    gate: Arc::clone(self),
                };
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            receiver
        };

        let mut waiter = Waiter {
            gate: Arc::clone(self),
            receiver: Some(receiver),
        };
        if let Some(receiver) = waiter.receiver.as_mut() {
            // senders are only dropped by a handoff
            let _ = receiver.await;
        }
        waiter.receiver = None;
        GatePermit {
            gate: Arc::clone(self),
        }
    }

    /// Returns true while a top-level transaction holds the gate.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Number of queued waiters.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(next) = state.waiters.pop_front() {
            if next.send(()).is_ok() {
                return;
            }
        }
        state.held = false;
    }
}

/// Proof of holding the gate. Dropping it releases the gate.
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<TransactionGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// A queued acquisition. If the waiting future is dropped after the gate
/// was handed to it, the gate is passed on instead of leaking.
struct Waiter {
    gate: Arc<TransactionGate>,
    receiver: Option<oneshot::Receiver<()>>,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
            if receiver.try_recv().is_ok() {
                self.gate.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn free_gate_acquires_immediately() {
        let gate = Arc::new(TransactionGate::new());
        let permit = gate.acquire().await;
        assert!(gate.is_held());
        drop(permit);
        assert!(!gate.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_run_in_fifo_order() {
        let gate = Arc::new(TransactionGate::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = gate.acquire().await;

        let mut tasks = Vec::new();
        for i in 0..3 {
            let gate = Arc::clone(&gate);
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = gate.acquire().await;
                tx.send(i).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
            tokio::task::yield_now().await;
        }
        assert_eq!(gate.queued(), 3);
        drop(first);

        for task in tasks {
            task.await.unwrap();
        }
        drop(tx);
        let mut order = Vec::new();
        while let Some(i) = rx.recv().await {
            order.push(i);
        }
        assert_eq!(order, vec![0, 1, 2]);
        assert!(!gate.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_waiter_does_not_leak_gate() {
        let gate = Arc::new(TransactionGate::new());
        let first = gate.acquire().await;

        let waiting = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
            })
        };
        tokio::task::yield_now().await;
        waiting.abort();
        let _ = waiting.await;
        drop(first);

        assert!(!gate.is_held());
        let _again = gate.acquire().await;
    }
}
