//! FrameSlot - single-capacity, latest-wins frame cell
//!
//! One slot per sink. The producer overwrites it on every publish, the
//! sink's pull worker reads it on every demand signal. Both sides are
//! lock-free: a publish is one atomic pointer swap, a read is one atomic
//! load (Peek) or swap (Drain), so a reader sees either the old frame or
//! the new one and never a mix.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use contracts::{Frame, SlotPolicy};

/// Latest-frame cell owned by one sink
#[derive(Debug)]
pub struct FrameSlot {
    current: ArcSwapOption<Frame>,
    policy: SlotPolicy,
    published: AtomicU64,
}

impl FrameSlot {
    /// Create an empty slot
    pub fn new(policy: SlotPolicy) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            policy,
            published: AtomicU64::new(0),
        }
    }

    /// Replace the current frame. Never blocks, never fails.
    pub fn publish(&self, frame: Arc<Frame>) {
        self.current.store(Some(frame));
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the latest frame according to the slot policy
    ///
    /// - `Peek` leaves the frame in place, repeated calls may return it again
    /// - `Drain` empties the slot, a second call without a publish returns `None`
    pub fn take(&self) -> Option<Arc<Frame>> {
        match self.policy {
            SlotPolicy::Peek => self.current.load_full(),
            SlotPolicy::Drain => self.current.swap(None),
        }
    }

    /// Look at the latest frame without consuming it, whatever the policy
    pub fn peek(&self) -> Option<Arc<Frame>> {
        self.current.load_full()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_none()
    }

    pub fn policy(&self) -> SlotPolicy {
        self.policy
    }

    /// Number of frames written into this slot so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
