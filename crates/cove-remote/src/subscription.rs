//! Cancel-safe subscription handles for remote push streams.
//!
//! A [`Watch`] is the receiving half of a live subscription. Cancelling
//! flips a shared closed flag that the producer checks before every
//! delivery, so at most one in-flight item can still arrive after
//! `cancel()` returns and nothing is delivered after that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Producer half of a subscription channel.
pub struct WatchSender<T> {
    tx: mpsc::Sender<T>,
    closed: Arc<AtomicBool>,
}

impl<T> WatchSender<T> {
    /// Deliver one item. Returns `false` when the subscription has
    /// been cancelled or the receiver dropped; producers should stop.
    pub async fn send(&self, item: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(item).await.is_ok()
    }

    /// Whether the consumer has cancelled.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Receiving half of a live subscription.
pub struct Watch<T> {
    rx: mpsc::Receiver<T>,
    closed: Arc<AtomicBool>,
}

impl<T> Watch<T> {
    /// Create a connected sender/receiver pair.
    pub fn channel(capacity: usize) -> (WatchSender<T>, Watch<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        let closed = Arc::new(AtomicBool::new(false));
        (
            WatchSender {
                tx,
                closed: closed.clone(),
            },
            Watch { rx, closed },
        )
    }

    /// Receive the next delivery. `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Detach from the producer. Items already queued are discarded;
    /// the producer observes the flag before its next delivery.
    pub fn cancel(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.rx.close();
        // Closing alone leaves buffered items receivable; drop them.
        while self.rx.try_recv().is_ok() {}
    }
}

impl<T> Drop for Watch<T> {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_until_cancelled() {
        let (tx, mut watch) = Watch::channel(4);
        assert!(tx.send(1u32).await);
        assert_eq!(watch.recv().await, Some(1));

        watch.cancel();
        assert!(!tx.send(2).await);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn cancel_discards_buffered_items() {
        let (tx, mut watch) = Watch::channel(4);
        assert!(tx.send(1u32).await);
        assert!(tx.send(2u32).await);
        assert_eq!(watch.recv().await, Some(1));

        watch.cancel();
        assert_eq!(watch.recv().await, None);
    }

    #[tokio::test]
    async fn drop_closes_the_flag() {
        let (tx, watch) = Watch::<u32>::channel(1);
        drop(watch);
        assert!(!tx.send(9).await);
    }
}
