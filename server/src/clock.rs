//! Fixed-period scheduler driving one room's simulation.

use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Invokes a callback once per period on a spawned task.
///
/// The callback only signals; the owner of the simulation reacts to the
/// signal on its own event loop, so ticks never overlap message handling.
/// Late ticks are skipped rather than bunched up.
pub struct SimulationClock {
    period: Duration,
    ticks: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl SimulationClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticks: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    /// Starts ticking. Returns false, changing nothing, if already running.
    ///
    /// The callback receives the running tick count and returns false to
    /// stop the clock from inside, e.g. when its receiver is gone.
    pub fn start<F>(&mut self, mut on_tick: F) -> bool
    where
        F: FnMut(u64) -> bool + Send + 'static,
    {
        if self.is_running() {
            return false;
        }

        let ticks = Arc::clone(&self.ticks);
        let period = self.period;
        self.handle = Some(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            timer.tick().await;

            loop {
                timer.tick().await;
                let tick = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                if !on_tick(tick) {
                    debug!("Clock callback declined tick {}, stopping", tick);
                    break;
                }
            }
        }));

        info!("Simulation clock started ({:?} period)", self.period);
        true
    }

    /// Cancels the periodic task. Returns false if nothing was running.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                info!(
                    "Simulation clock stopped after {} ticks",
                    self.ticks.load(Ordering::Relaxed)
                );
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for SimulationClock {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
