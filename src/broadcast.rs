//! Periodic sample-and-broadcast cycle.
//!
//! The loop owns its timer as a plain value; there is no process-wide timer
//! state. Each tick samples the host and performs one group-send to the
//! registry. Tick work runs inline on the loop task, so overlap is bounded
//! to depth 1: the next tick waits for the previous one to finish, and
//! `MissedTickBehavior::Delay` keeps a slow tick from being followed by a
//! catch-up burst. Consumers only care about the latest state, so delayed
//! ticks are preferable to stacked ones.

use crate::metrics::{ClusterSnapshot, Sample};
use crate::registry::{envelope, Registry};
use crate::state::Shared;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// `Stopped -> Running -> Stopping -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    Stopping,
}

pub struct BroadcastLoop<S: Sample> {
    sampler: S,
    registry: Registry,
    period: Duration,
    /// Most recent snapshot, shared with the one-shot REST surface.
    latest: Shared<Option<ClusterSnapshot>>,
    state: LoopState,
}

impl<S: Sample> BroadcastLoop<S> {
    pub fn new(
        sampler: S,
        registry: Registry,
        period: Duration,
        latest: Shared<Option<ClusterSnapshot>>,
    ) -> Self {
        Self {
            sampler,
            registry,
            period,
            latest,
            state: LoopState::Stopped,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Sample once and fan the result out to the current broadcast group.
    ///
    /// Public so tests can drive ticks deterministically without waiting on
    /// wall-clock time.
    pub fn tick_once(&mut self) {
        let snapshot = self.sampler.sample();
        *self.latest.lock() = Some(snapshot.clone());

        match envelope("telemetry", &snapshot) {
            Ok(payload) => {
                let delivered = self.registry.broadcast(&payload);
                debug!("tick delivered to {delivered} subscribers");
            }
            Err(e) => warn!("failed to serialize snapshot: {e}"),
        }
    }

    /// Run until the shutdown channel flips. An in-flight tick always
    /// finishes before the loop observes the signal.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.state = LoopState::Running;
        info!("broadcast loop running (period {:?})", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick_once(),
                _ = shutdown.changed() => {
                    self.state = LoopState::Stopping;
                    break;
                }
            }
        }

        self.state = LoopState::Stopped;
        info!("broadcast loop stopped");
    }
}
