//! Notification delivery to the single subscriber
//!
//! The backend task owns the `Notifier`; a UI owns the `Subscription`.
//! Notifications go into an ordered pending buffer and move to the bounded
//! subscriber queue as space frees up. The backend task never waits on the
//! subscriber, so a subscriber may call back into the backend while it
//! holds undelivered notifications. The stream is never reordered, never
//! lossy and never duplicated.

use meshctl_core::Notify;
use std::collections::VecDeque;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Sending side of the notification stream
#[derive(Debug)]
pub struct Notifier {
    sender: Option<mpsc::Sender<Notify>>,
    /// Stamped notifications waiting for queue space, oldest first
    pending: VecDeque<Notify>,
    /// Unsubscribed; the sender goes away once `pending` is delivered
    closing: bool,
    capacity: usize,
    sequence: u64,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: None,
            pending: VecDeque::new(),
            closing: false,
            capacity: capacity.max(1),
            sequence: 0,
        }
    }

    /// Start a new subscription, ending the previous one
    pub fn subscribe(&mut self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        if self.sender.replace(sender).is_some() {
            debug!(
                "Replacing previous notification subscriber ({} undelivered)",
                self.pending.len()
            );
        }
        self.pending.clear();
        self.closing = false;
        Subscription { receiver }
    }

    /// Accept no further notifications; already emitted ones are still delivered
    pub fn unsubscribe(&mut self) {
        self.closing = true;
        self.pump();
    }

    pub fn has_subscriber(&self) -> bool {
        !self.closing && self.sender.as_ref().map_or(false, |s| !s.is_closed())
    }

    /// Sequence number of the last emitted notification
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Notifications emitted but not yet handed to the subscriber queue
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Stamp one notification and queue it; returns whether a subscriber takes it
    pub fn emit(&mut self, mut notify: Notify) -> bool {
        self.sequence += 1;
        notify.sequence = self.sequence;
        if !self.has_subscriber() {
            return false;
        }
        self.pending.push_back(notify);
        self.pump();
        true
    }

    /// Move pending notifications into the subscriber queue while it has room
    fn pump(&mut self) {
        let Some(sender) = &self.sender else {
            self.pending.clear();
            return;
        };
        while let Some(notify) = self.pending.pop_front() {
            match sender.try_send(notify) {
                Ok(()) => {}
                Err(TrySendError::Full(notify)) => {
                    self.pending.push_front(notify);
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Notification subscriber went away");
                    self.detach();
                    return;
                }
            }
        }
        if self.closing {
            self.detach();
        }
    }

    fn detach(&mut self) {
        self.sender = None;
        self.pending.clear();
        self.closing = false;
    }

    /// Wait for queue space and deliver; never resolves while nothing is pending
    ///
    /// Cancel safe: a notification leaves `pending` only together with the
    /// permit that sends it.
    pub async fn deliver_pending(&mut self) {
        let sender = match &self.sender {
            Some(sender) if !self.pending.is_empty() => sender.clone(),
            _ => return std::future::pending().await,
        };
        match sender.reserve().await {
            Ok(permit) => {
                if let Some(notify) = self.pending.pop_front() {
                    permit.send(notify);
                }
                self.pump();
            }
            Err(_) => {
                debug!("Notification subscriber went away");
                self.detach();
            }
        };
    }
}

/// Receiving side of the notification stream
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Notify>,
}

impl Subscription {
    /// Next notification; `None` once the subscription was replaced or ended
    pub async fn recv(&mut self) -> Option<Notify> {
        self.receiver.recv().await
    }

    /// Next notification if one is already queued
    pub fn try_recv(&mut self) -> Option<Notify> {
        self.receiver.try_recv().ok()
    }

    /// Everything queued right now
    pub fn drain(&mut self) -> Vec<Notify> {
        let mut out = Vec::new();
        while let Some(n) = self.try_recv() {
            out.push(n);
        }
        out
    }

    /// Stop receiving; the backend discards further notifications
    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}
