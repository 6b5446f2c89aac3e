//! Event fan-out to any number of subscribers.
//!
//! Every subscriber owns a bounded queue. Publishing pushes into each queue
//! and returns; a full queue drops its oldest event, since readings are
//! superseded by the next batch anyway. The broadcaster only holds weak
//! references, so a dropped [`Subscription`] is reclaimed without any help
//! from the publishing side.

use crate::gpio::data::Pin;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

/// Subscriber-facing events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// First event on every subscription
    Connected { subscriber: Uuid, message: String },
    /// A pin entered (or re-entered) the configured set
    PinConfigured(Pin),
    /// A write or PWM update committed
    PinChanged(Pin),
    /// A pin left the configured set
    PinReleased { pin: u8 },
    /// One monitoring batch, always a full snapshot
    PinReadings { timestamp: i64, readings: Vec<Pin> },
    MonitoringStarted { pins: Vec<u8>, interval_ms: u64 },
    MonitoringStopped { message: String },
    Error { message: String },
}

impl Event {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::PinConfigured(_) => "pin_configured",
            Self::PinChanged(_) => "pin_changed",
            Self::PinReleased { .. } => "pin_released",
            Self::PinReadings { .. } => "pin_readings",
            Self::MonitoringStarted { .. } => "monitoring_started",
            Self::MonitoringStopped { .. } => "monitoring_stopped",
            Self::Error { .. } => "error",
        }
    }

    pub fn readings(readings: Vec<Pin>) -> Self {
        Self::PinReadings {
            timestamp: chrono::Utc::now().timestamp_millis(),
            readings,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Queue {
    events: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Queue {
    fn push(&self, event: Event) -> bool {
        let overflowed = {
            let mut events = lock(&self.events);
            let overflowed = events.len() >= self.capacity;
            if overflowed {
                events.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            events.push_back(event);
            overflowed
        };
        self.notify.notify_one();
        overflowed
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

struct Shared {
    subscribers: Mutex<HashMap<Uuid, Weak<Queue>>>,
    capacity: usize,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let subscribers = self
            .subscribers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for queue in subscribers.values().filter_map(Weak::upgrade) {
            queue.close();
        }
    }
}

/// Fan-out hub for [`Event`]s. Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
}

impl Broadcaster {
    /// Create a broadcaster whose subscribers each buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new subscriber. Its first event is `connected`.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let queue = Arc::new(Queue {
            events: Mutex::new(VecDeque::with_capacity(self.shared.capacity)),
            notify: Notify::new(),
            capacity: self.shared.capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        queue.push(Event::Connected {
            subscriber: id,
            message: "Connected to GPIO controller".to_string(),
        });

        lock(&self.shared.subscribers).insert(id, Arc::downgrade(&queue));
        debug!("Subscriber connected: {}", id);

        Subscription {
            id,
            queue,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Remove a subscriber explicitly. Dropping the subscription does the same.
    ///
    /// Returns `false` if the subscription belongs to another broadcaster.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let removed = lock(&self.shared.subscribers).remove(&subscription.id).is_some();
        drop(subscription);
        removed
    }

    /// Deliver `event` to every live subscriber without waiting on any of them.
    ///
    /// Returns how many subscribers received it.
    pub fn publish(&self, event: Event) -> usize {
        let mut subscribers = lock(&self.shared.subscribers);
        subscribers.retain(|_, queue| queue.strong_count() > 0);

        let mut delivered = 0;
        for (id, queue) in subscribers.iter() {
            let Some(queue) = queue.upgrade() else {
                continue;
            };
            if queue.push(event.clone()) {
                warn!(
                    "Subscriber {} is lagging, dropped oldest event to deliver {}",
                    id,
                    event.name()
                );
            }
            delivered += 1;
        }

        debug!("Published {} to {} subscribers", event.name(), delivered);
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers)
            .values()
            .filter(|queue| queue.strong_count() > 0)
            .count()
    }
}

/// Receiving end of one subscriber.
pub struct Subscription {
    id: Uuid,
    queue: Arc<Queue>,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event. `None` once the broadcaster is gone and the
    /// queue has drained.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Take the next buffered event, if any.
    pub fn try_recv(&mut self) -> Option<Event> {
        lock(&self.queue.events).pop_front()
    }

    /// Events lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            lock(&shared.subscribers).remove(&self.id);
        }
        debug!("Subscriber disconnected: {}", self.id);
    }
}
