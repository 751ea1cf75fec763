//! Session-wide coordination flags, both built on `tokio::sync::watch`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BusyState {
    busy: bool,
    closed: bool,
}

/// Set by the responder while it handles an event; the ambient loop waits on
/// it so it never talks over a reply.
#[derive(Debug, Clone)]
pub struct BusySignal {
    tx: Arc<watch::Sender<BusyState>>,
}

impl Default for BusySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl BusySignal {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(BusyState::default())),
        }
    }

    pub fn mark_busy(&self) {
        self.tx.send_modify(|s| s.busy = true);
    }

    pub fn mark_free(&self) {
        self.tx.send_modify(|s| s.busy = false);
    }

    /// Mark busy until the returned guard drops.
    pub fn hold(&self) -> BusyGuard<'_> {
        self.mark_busy();
        BusyGuard { signal: self }
    }

    pub fn is_busy(&self) -> bool {
        self.tx.borrow().busy
    }

    /// Wake every waiter with an error; used at shutdown.
    pub fn close(&self) {
        self.tx.send_modify(|s| s.closed = true);
    }

    /// Resolve once the flag is clear. Fails once the session is closing.
    pub async fn await_free(&self) -> Result<(), SessionError> {
        let mut rx = self.tx.subscribe();
        loop {
            let s = *rx.borrow_and_update();
            if s.closed {
                return Err(SessionError::ConnectionClosed("session closing".into()));
            }
            if !s.busy {
                return Ok(());
            }
            if rx.changed().await.is_err() {
                return Err(SessionError::ConnectionClosed("session closing".into()));
            }
        }
    }
}

pub struct BusyGuard<'a> {
    signal: &'a BusySignal,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.signal.mark_free();
    }
}

/// One-way shutdown flag shared by every session task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(false)),
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on trigger.
        let _ = rx.wait_for(|v| *v).await;
    }

    /// Sleep for `d` unless shutdown comes first. Returns `false` on shutdown.
    pub async fn pace(&self, d: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(d) => true,
            _ = self.wait() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_free_waits_for_clear() {
        let busy = BusySignal::new();
        busy.mark_busy();

        let b2 = busy.clone();
        let waiter = tokio::spawn(async move { b2.await_free().await });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        busy.mark_free();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn guard_clears_on_drop() {
        let busy = BusySignal::new();
        {
            let _g = busy.hold();
            assert!(busy.is_busy());
        }
        assert!(!busy.is_busy());
    }

    #[tokio::test]
    async fn close_wakes_blocked_waiters() {
        let busy = BusySignal::new();
        busy.mark_busy();
        let b2 = busy.clone();
        let waiter = tokio::spawn(async move { b2.await_free().await });
        tokio::task::yield_now().await;

        busy.close();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(SessionError::ConnectionClosed(_))
        ));
        // Closed stays closed even when free.
        busy.mark_free();
        assert!(busy.await_free().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn pace_returns_early_on_shutdown() {
        let sd = Shutdown::new();
        assert!(sd.pace(Duration::from_secs(5)).await);

        let s2 = sd.clone();
        let sleeper = tokio::spawn(async move { s2.pace(Duration::from_secs(3600)).await });
        tokio::task::yield_now().await;
        sd.trigger();
        assert!(!sleeper.await.unwrap());
        assert!(!sd.pace(Duration::from_secs(1)).await);
    }
}
