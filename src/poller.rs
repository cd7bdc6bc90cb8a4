//! # Polling Engine
//!
//! One fixed-period task reads every monitored register, decides per
//! register whether its value is due for publishing, and emits the
//! batched JSON object upstream.
//!
//! The loop keeps an absolute deadline: each iteration runs, sleeps
//! until the deadline, then advances it by one period, so a slow
//! iteration never skews the base cadence. A logical seconds counter
//! (iteration index times the period) is the only clock the publish
//! decision ever sees, which keeps the decision a pure function.
//!
//! Publish acknowledgement is batch-wide: every emitted register keeps
//! its `must_publish` flag raised until the transport confirms the
//! batch, so a failed publish is retried on the next cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::batch::PublishBatch;
use crate::constants::{DIAG_TOPIC, PERIOD_TOO_SHORT_MSG, PUBLISH_PAYLOAD_MAX, PUBLISH_TOPIC};
use crate::descriptor::RegisterDescriptor;
use crate::gateway::GatewayCore;

/// Decide whether a freshly read value must be published.
///
/// True when any of the following holds:
/// - change publishing is on, the change-check interval elapsed, and
///   the value differs from the last published one;
/// - the heartbeat delay is set and elapsed;
/// - the register was never published (first successful read);
/// - the register is pending from an unacknowledged batch.
pub fn should_publish(
    desc: &RegisterDescriptor,
    last_value: &str,
    last_time_s: u32,
    must_publish: bool,
    seconds: u32,
    value: &str,
) -> bool {
    let elapsed = seconds.saturating_sub(last_time_s);
    (desc.publish_on_change && elapsed >= desc.change_check_interval_s && value != last_value)
        || (desc.max_publish_delay_s > 0 && elapsed >= desc.max_publish_delay_s)
        || last_time_s == 0
        || must_publish
}

/// Spawn the polling task for a started gateway.
pub(crate) fn spawn(core: Arc<GatewayCore>) -> JoinHandle<()> {
    tokio::spawn(run(core))
}

async fn run(core: Arc<GatewayCore>) {
    let period_s = core.read_period_s();
    let period = Duration::from_secs(u64::from(period_s));
    let mut next_wake = Instant::now() + period;
    // The seconds counter is 1-based in periods so that a published
    // time of 0 can only ever mean "never published".
    let mut seconds = u32::from(period_s);

    loop {
        poll_once(&core, seconds).await;

        let overran = Instant::now() > next_wake;
        tokio::time::sleep_until(next_wake).await;
        next_wake += period;
        if overran {
            warn!(period_s, "polling iteration overran its period");
            core.transport().publish(DIAG_TOPIC, PERIOD_TOO_SHORT_MSG).await;
        }
        seconds = seconds.wrapping_add(u32::from(period_s));
    }
}

/// One pass over the catalog in insertion order.
async fn poll_once(core: &Arc<GatewayCore>, seconds: u32) {
    let count = core.catalog().count();
    let mut batch = PublishBatch::new(PUBLISH_PAYLOAD_MAX);
    let mut considered_all = true;

    for index in 0..count {
        let bound = {
            let catalog = core.catalog();
            match (catalog.at(index), catalog.must_publish_at(index)) {
                (Some(desc), Some(must_publish)) => Some((desc, must_publish)),
                _ => None,
            }
        };
        // The catalog shrank under us; publish nothing this cycle.
        let Some((desc, must_publish)) = bound else {
            considered_all = false;
            break;
        };

        if !desc.monitored {
            continue;
        }

        let value = match core.read_typed_register(&desc).await {
            Ok(value) => value,
            Err(err) => {
                debug!(register = %desc.name, %err, "skipping register this cycle");
                continue;
            }
        };

        let due = {
            let catalog = core.catalog();
            let last_time = catalog.latest_published_time_at(index).unwrap_or(0);
            let last_value = catalog.latest_published_value_at(index).unwrap_or("");
            should_publish(&desc, last_value, last_time, must_publish, seconds, &value)
        };
        if !due {
            continue;
        }

        if !batch.append(&desc.name, &value) {
            considered_all = false;
            break;
        }

        let mut catalog = core.catalog();
        catalog.set_latest_published_time_at(index, seconds);
        catalog.set_latest_published_value_at(index, &value);
        catalog.set_must_publish_at(index, true);
    }

    if batch.entries() > 0 && considered_all {
        if let Some(payload) = batch.finish() {
            if core.transport().publish(PUBLISH_TOPIC, &payload).await {
                core.catalog().clear_must_publish();
            } else {
                warn!("batch publish failed, entries stay pending");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
