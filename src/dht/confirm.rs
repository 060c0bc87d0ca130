use tokio::sync::{Mutex, Notify};

/// Single-slot rendezvous between a node's client and its own server.
///
/// The server calls `signal` when a `Confirm` arrives; the client blocked in `put` wakes, clears
/// the flag and returns. A signal that lands before the client starts waiting is not lost.
#[derive(Debug, Default)]
pub struct PendingConfirmation {
    confirmed: Mutex<bool>,
    wake: Notify,
}

impl PendingConfirmation {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn signal(&self) {
        *self.confirmed.lock().await = true;
        self.wake.notify_one();
    }

    /// Waits until confirmed, then resets the slot for the next `put`.
    pub async fn wait(&self) {
        loop {
            let notified = self.wake.notified();
            {
                let mut confirmed = self.confirmed.lock().await;
                if *confirmed {
                    *confirmed = false;
                    return;
                }
            }
            notified.await;
        }
    }

    pub async fn is_set(&self) -> bool {
        *self.confirmed.lock().await
    }
}
