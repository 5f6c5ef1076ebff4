//! Frame pacing for sources that are not driven by real hardware

use std::thread;
use std::time::{Duration, Instant};

/// Blocking frame pacer
///
/// Sleeps the calling thread until the next frame deadline. When the caller
/// falls more than one interval behind, the schedule restarts from now
/// instead of bursting to catch up.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    started: Instant,
    next_deadline: Option<Instant>,
}

impl Pacer {
    /// Create a pacer for the given rate
    ///
    /// Rates outside `1e-3..=1e6` are clamped; NaN paces at the slowest rate.
    pub fn new(fps: f64) -> Self {
        // f64::max maps NaN to the other operand, clamp would panic
        let fps = fps.max(1e-3).min(1e6);
        Self {
            interval: Duration::from_secs_f64(1.0 / fps),
            started: Instant::now(),
            next_deadline: None,
        }
    }

    /// Frame interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Seconds since the pacer was created
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Block until the next frame is due
    pub fn wait(&mut self) {
        let now = Instant::now();
        let deadline = match self.next_deadline {
            // first frame goes out immediately
            None => now,
            Some(deadline) if now > deadline + self.interval => now,
            Some(deadline) => deadline,
        };

        if deadline > now {
            thread::sleep(deadline - now);
        }
        self.next_deadline = Some(deadline + self.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_wait_is_immediate() {
        let mut pacer = Pacer::new(1.0);
        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn waits_one_interval_between_frames() {
        let mut pacer = Pacer::new(50.0);
        let start = Instant::now();
        for _ in 0..5 {
            pacer.wait();
        }
        // 4 intervals of 20ms after the immediate first frame
        assert!(start.elapsed() >= Duration::from_millis(75));
    }

    #[test]
    fn degenerate_rates_are_clamped() {
        for fps in [f64::NAN, 0.0, -5.0] {
            let interval = Pacer::new(fps).interval();
            assert!(interval >= Duration::from_secs(999), "{fps}: {interval:?}");
        }
        let fastest = Pacer::new(f64::INFINITY).interval();
        assert!(fastest <= Duration::from_micros(1));
    }

    #[test]
    fn does_not_burst_after_stall() {
        let mut pacer = Pacer::new(100.0);
        pacer.wait();
        thread::sleep(Duration::from_millis(80));
        pacer.wait();
        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
