//! The control loop.
//!
//! Sensors are updated one after another on a fixed period. A failing sensor
//! is logged and counted, and the rest of the tick carries on. The loop stops
//! between ticks once the shutdown future resolves.

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::metrics::GaugeSink;
use crate::sensors::Sensor;

/// Runs until `shutdown` resolves and returns the number of completed ticks.
///
/// The first tick fires one `period` after the call. If a tick and shutdown
/// are ready together, shutdown wins.
pub async fn run<F>(
    sensors: &[Sensor<'_>],
    period: Duration,
    metrics: &dyn GaugeSink,
    shutdown: F,
) -> u64
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks = 0;
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Control loop stopping after {} ticks", ticks);
                break;
            }
            _ = ticker.tick() => {
                tick(sensors, metrics).await;
                ticks += 1;
            }
        }
    }

    ticks
}

/// Updates every sensor once, in order.
pub async fn tick(sensors: &[Sensor<'_>], metrics: &dyn GaugeSink) {
    for sensor in sensors {
        match sensor.update(metrics).await {
            Ok(Some(transition)) => {
                debug!("Sensor {} switched {:?}", sensor.name(), transition)
            }
            Ok(None) => {}
            Err(e) => {
                metrics.record_error(sensor.name());
                warn!("Sensor {} error: {}", sensor.name(), e);
            }
        }
    }
}
