//! Demand signals - when a sink is ready for its next frame
//!
//! - [`PacedDemand`]: fixed-rate pull, the usual choice for live sinks
//! - [`ManualDemand`]: fires when a [`DemandTrigger`] is signalled, for
//!   downstreams with their own readiness callbacks

use std::sync::Arc;
use std::time::Duration;

use contracts::DemandSignal;
use tokio::sync::Notify;
use tokio::time::{self, Interval, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_micros(100);

/// Demand at a fixed rate
///
/// Missed ticks are skipped rather than bunched up, a sink that fell behind
/// simply pulls the latest frame on its next tick.
pub struct PacedDemand {
    period: Duration,
    interval: Option<Interval>,
}

impl PacedDemand {
    pub fn new(hz: f64) -> Self {
        let period = Duration::from_secs_f64(1.0 / hz.max(1e-3)).max(MIN_PERIOD);
        Self {
            period,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl DemandSignal for PacedDemand {
    async fn ready(&mut self) {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;
    }
}

/// Create a trigger and the demand signal it drives
pub fn manual_demand() -> (DemandTrigger, ManualDemand) {
    let notify = Arc::new(Notify::new());
    (
        DemandTrigger {
            notify: Arc::clone(&notify),
        },
        ManualDemand { notify },
    )
}

/// Downstream-held handle that requests one more frame
///
/// Signals sent while the worker is busy coalesce into one.
#[derive(Clone)]
pub struct DemandTrigger {
    notify: Arc<Notify>,
}

impl DemandTrigger {
    pub fn signal(&self) {
        self.notify.notify_one();
    }
}

/// Demand driven by a [`DemandTrigger`]
pub struct ManualDemand {
    notify: Arc<Notify>,
}

impl DemandSignal for ManualDemand {
    async fn ready(&mut self) {
        self.notify.notified().await;
    }
}
