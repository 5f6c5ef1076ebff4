//! Distributor - fans each captured frame out to every registered sink slot
//!
//! The registry is a copy-on-write list behind an atomic pointer: publish
//! iterates a snapshot without taking a lock, register/unregister swap in
//! a new list. Slots are held weakly, a sink that went away is skipped and
//! pruned on the next publish.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use arc_swap::ArcSwap;
use contracts::Frame;
use tracing::{debug, info, trace};

use crate::error::DistributorError;
use crate::handle::SinkHandle;
use crate::slot::FrameSlot;

/// Busy spins in `close` before yielding, then sleeping
const CLOSE_SPIN_LIMIT: u32 = 64;
const CLOSE_BACKOFF: Duration = Duration::from_micros(50);

/// Process-unique sink identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

impl SinkId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

#[derive(Clone)]
struct Registration {
    id: SinkId,
    name: Arc<str>,
    slot: Weak<FrameSlot>,
}

/// Frame fan-out point between the producer loop and the sinks
pub struct Distributor {
    registry: ArcSwap<Vec<Registration>>,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    published: AtomicU64,
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new()
    }
}

impl Distributor {
    pub fn new() -> Self {
        Self {
            registry: ArcSwap::from_pointee(Vec::new()),
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            published: AtomicU64::new(0),
        }
    }

    /// Register a running sink; its slot receives every later publish
    pub fn register(&self, sink: &SinkHandle) -> SinkId {
        self.register_slot(sink.id(), sink.name(), sink.slot());
        sink.id()
    }

    /// Register a bare slot under an explicit id
    pub fn register_slot(&self, id: SinkId, name: &str, slot: &Arc<FrameSlot>) {
        let registration = Registration {
            id,
            name: Arc::from(name),
            slot: Arc::downgrade(slot),
        };
        self.registry.rcu(|current| {
            let mut next = Vec::clone(current);
            next.retain(|r| r.id != id);
            next.push(registration.clone());
            next
        });
        debug!(sink = name, %id, "sink registered");
    }

    /// Remove a sink; returns whether it was registered
    ///
    /// A publish already in flight may still write the removed slot once.
    pub fn unregister(&self, id: SinkId) -> bool {
        let mut removed = false;
        self.registry.rcu(|current| {
            let next: Vec<Registration> = current.iter().filter(|r| r.id != id).cloned().collect();
            removed = next.len() != current.len();
            next
        });
        if removed {
            debug!(%id, "sink unregistered");
        }
        removed
    }

    /// Write `frame` into every registered slot, in registration order
    ///
    /// Returns how many slots received it. Fails only once closed.
    pub fn publish(&self, frame: Frame) -> Result<usize, DistributorError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(DistributorError::Closed);
        }

        let seq = frame.seq;
        let frame = Arc::new(frame);
        let registry = self.registry.load();
        let mut delivered = 0;
        let mut stale = false;

        for registration in registry.iter() {
            match registration.slot.upgrade() {
                Some(slot) => {
                    slot.publish(Arc::clone(&frame));
                    delivered += 1;
                }
                None => stale = true,
            }
        }
        drop(registry);

        self.published.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if stale {
            self.prune();
        }
        trace!(seq, delivered, "frame published");
        Ok(delivered)
    }

    /// Stop accepting publishes
    ///
    /// Returns once no publish is in progress, so nothing is written into
    /// any slot after this call.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // publish takes no lock and never awaits, so in_flight drains within
        // one fan-out unless the publishing thread is descheduled mid-loop
        let mut spins: u32 = 0;
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if spins < CLOSE_SPIN_LIMIT {
                std::hint::spin_loop();
            } else if spins < 2 * CLOSE_SPIN_LIMIT {
                thread::yield_now();
            } else {
                thread::sleep(CLOSE_BACKOFF);
            }
            spins = spins.saturating_add(1);
        }
        info!(published = self.published(), "distributor closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Frames accepted by publish so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Number of registered sinks
    pub fn len(&self) -> usize {
        self.registry.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered sink names, in registration order
    pub fn sink_names(&self) -> Vec<String> {
        self.registry
            .load()
            .iter()
            .map(|r| r.name.to_string())
            .collect()
    }

    fn prune(&self) {
        self.registry.rcu(|current| {
            current
                .iter()
                .filter(|r| r.slot.strong_count() > 0)
                .cloned()
                .collect::<Vec<_>>()
        });
        debug!("pruned dropped sink slots");
    }
}
