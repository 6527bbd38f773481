//! The two channel kinds the coordinator publishes on.
//!
//! [`StateChannel`] retains its latest value: every subscriber sees the
//! current state, and late subscribers catch up immediately. It carries
//! positional state such as the loaded template/entry pair.
//!
//! [`EventChannel`] is for one-shot signals: each emission reaches at most
//! one observer, and emitting with nobody attached drops the value instead
//! of queueing it for later. Request/response hops use this kind so a
//! re-attached surface never replays stale prompts.

use std::sync::{Mutex, PoisonError};

use tokio::sync::{mpsc, watch};

/// Retained-value channel; every subscriber observes the latest value.
pub struct StateChannel<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> StateChannel<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the retained value and notify all subscribers.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Attach a subscriber; its first [`StateReceiver::updated`] call
    /// yields the retained value right away.
    pub fn subscribe(&self) -> StateReceiver<T> {
        let mut rx = self.tx.subscribe();
        rx.mark_changed();
        StateReceiver { rx }
    }
}

impl<T: Clone + Default> Default for StateChannel<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Subscriber half of a [`StateChannel`].
pub struct StateReceiver<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> StateReceiver<T> {
    /// The retained value, without waiting.
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for a value not yet observed by this subscriber.
    ///
    /// Returns `None` once the publishing side is gone.
    pub async fn updated(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Single-consumption channel with one swappable observer slot.
pub struct EventChannel<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
}

impl<T> EventChannel<T> {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
        }
    }

    /// Deliver a value to the attached observer, if any.
    ///
    /// Without an observer, or with one whose receiver is gone, the value
    /// is dropped. Emission never fails and never blocks.
    pub fn emit(&self, value: T) {
        let mut slot = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = slot.as_ref() else {
            return;
        };
        if tx.send(value).is_err() {
            *slot = None;
        }
    }

    /// Attach an observer, displacing any previous one.
    pub fn subscribe(&self) -> EventReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        EventReceiver { rx }
    }
}

impl<T> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer half of an [`EventChannel`].
pub struct EventReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> EventReceiver<T> {
    /// Wait for the next emission.
    ///
    /// Returns `None` once this receiver has been displaced by a newer
    /// subscriber (or the channel itself is gone).
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take an already delivered emission, if one is pending.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_channel_delivers_latest_to_late_subscriber() {
        let channel = StateChannel::new(0u32);
        channel.publish(1);
        channel.publish(2);

        let mut late = channel.subscribe();
        assert_eq!(late.current(), 2);
        assert_eq!(late.updated().await, Some(2));
    }

    #[tokio::test]
    async fn state_channel_notifies_all_subscribers() {
        let channel = StateChannel::new("start");
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();
        assert_eq!(a.updated().await, Some("start"));
        assert_eq!(b.updated().await, Some("start"));

        channel.publish("next");
        assert_eq!(a.updated().await, Some("next"));
        assert_eq!(b.updated().await, Some("next"));
    }

    #[test]
    fn event_channel_drops_without_observer() {
        let channel = EventChannel::new();
        channel.emit(7u8);

        let mut rx = channel.subscribe();
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn event_channel_delivers_to_single_observer() {
        let channel = EventChannel::new();
        let mut rx = channel.subscribe();
        channel.emit(41u32);
        assert_eq!(rx.recv().await, Some(41));
    }

    #[tokio::test]
    async fn newer_subscriber_displaces_older() {
        let channel = EventChannel::new();
        let mut old = channel.subscribe();
        let mut new = channel.subscribe();

        channel.emit(1u8);
        assert_eq!(old.recv().await, None);
        assert_eq!(new.try_recv(), Some(1));
    }

    #[test]
    fn emit_to_dropped_observer_is_silent() {
        let channel = EventChannel::new();
        drop(channel.subscribe());
        channel.emit(3u8);
        // A fresh observer starts clean.
        let mut rx = channel.subscribe();
        assert_eq!(rx.try_recv(), None);
    }
}
