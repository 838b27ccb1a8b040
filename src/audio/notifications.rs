//! Hardware notification plumbing
//!
//! Backends deliver hardware changes as [`HardwareEvent`]s through an
//! [`EventSink`]. Listener callbacks may run on any OS thread; the sink only
//! queues, and the owner of the registry drains the queue on its own thread.
//!
//! Every registered listener is represented by a [`Subscription`] that removes
//! the listener exactly once, either through [`Subscription::release`] or on drop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::audio::types::{DefaultRole, DeviceId, Scope};

/// Device change event types
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareEvent {
    /// Devices were connected and/or disconnected
    DeviceListChanged {
        added: Vec<DeviceId>,
        removed: Vec<DeviceId>,
    },
    /// A default device assignment changed (`None` = no device holds it)
    DefaultDeviceChanged {
        role: DefaultRole,
        device: Option<DeviceId>,
    },
    /// Device nominal sample rate changed externally
    SampleRateChanged { device: DeviceId, rate: u32 },
    /// Device clock source changed externally
    ClockSourceChanged { device: DeviceId, source_id: u32 },
    /// Device volume changed (including echoes of our own writes)
    VolumeChanged {
        device: DeviceId,
        scope: Scope,
        volume: f32,
    },
}

/// Sending half of the hardware event queue, handed to backends
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<HardwareEvent>,
    overflowed: Arc<AtomicBool>,
}

impl EventSink {
    /// Queue an event without blocking. Returns false if the queue is full or
    /// the receiving side is gone. A dropped event marks the queue as
    /// overflowed so the consumer knows to resynchronize.
    pub fn send(&self, event: HardwareEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::warn!("Hardware event queue full, dropping {:?}", event);
                self.overflowed.store(true, Ordering::Release);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Receiving half of the hardware event queue, owned by the registry
#[derive(Debug)]
pub struct EventQueue {
    rx: Receiver<HardwareEvent>,
    overflowed: Arc<AtomicBool>,
}

impl EventQueue {
    /// Next queued event, without blocking
    pub fn try_next(&self) -> Option<HardwareEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// True once per overflow: events were dropped since the last call
    pub fn take_overflow(&self) -> bool {
        self.overflowed.swap(false, Ordering::AcqRel)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a bounded hardware event queue
pub fn event_queue(capacity: usize) -> (EventSink, EventQueue) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let overflowed = Arc::new(AtomicBool::new(false));
    (
        EventSink {
            tx,
            overflowed: Arc::clone(&overflowed),
        },
        EventQueue { rx, overflowed },
    )
}

/// Scoped handle for one registered hardware listener
pub struct Subscription {
    label: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// `release` removes the listener; it runs exactly once
    pub fn new(label: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: label.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Remove the listener now
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(release) = self.release.take() {
            log::debug!("Releasing subscription {}", self.label);
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owned collection of subscriptions, released together
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release every subscription in registration order. Safe to call twice.
    pub fn release_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.release();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.release_all();
    }
}
