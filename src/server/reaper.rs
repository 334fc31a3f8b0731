//! Idle reaper background task.
//!
//! The reaper never touches chat state itself: on every tick it enqueues
//! a sweep event, so eviction runs inside the dispatcher with the same
//! serialization as every join and leave. Interval and timestamp are
//! injectable; deterministic tests feed `SweepIdle` events with
//! fabricated clocks instead of sleeping.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use super::event::GatewayEvent;

/// Periodic idle sweep scheduler.
pub struct IdleReaper {
    events: mpsc::Sender<GatewayEvent>,
    sweep_interval: Duration,
}

impl IdleReaper {
    /// Create a reaper feeding the given dispatcher queue.
    pub fn new(events: mpsc::Sender<GatewayEvent>, sweep_interval: Duration) -> Self {
        Self {
            events,
            sweep_interval,
        }
    }

    /// Run the tick loop until the dispatcher queue closes.
    pub async fn run(self) {
        info!(
            "Idle reaper started (sweep every {} seconds)",
            self.sweep_interval.as_secs()
        );

        let mut timer = interval(self.sweep_interval);
        // The first tick fires immediately; a sweep at startup is useless.
        timer.tick().await;

        loop {
            timer.tick().await;
            if self
                .events
                .send(GatewayEvent::SweepIdle { now: Utc::now() })
                .await
                .is_err()
            {
                debug!("Dispatcher queue closed; idle reaper stopping");
                break;
            }
        }
    }
}

/// Spawn the idle reaper on the runtime.
pub fn start_idle_reaper(events: mpsc::Sender<GatewayEvent>, sweep_interval: Duration) {
    let reaper = IdleReaper::new(events, sweep_interval);
    tokio::spawn(async move {
        reaper.run().await;
    });
}
