//! Feigned-Failure Driver (spec.md §4.6, optional tier): schedules a random
//! fail/recover cycle so the node behaves, to its peers, exactly like a
//! crashed-and-restarted process. Orthogonal to real failure detection.
//! Grounded in `distinsta::BullyElection::start_leader_monitoring`'s
//! `tokio::spawn(async move { loop { sleep(...); ... } })` shape, applied
//! here to a fail/recover schedule instead of a heartbeat.

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

/// Shared, cheaply-checked flag consulted by the listener (drop inbound
/// silently) and the engine (skip dispatching ELECT/I_AM_LEADER couriers)
/// and the failure detector (skip PROBEs) while "failed".
#[derive(Debug, Default)]
pub struct FailureFlag(AtomicBool);

impl FailureFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn is_failed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_failed(&self, failed: bool) {
        self.0.store(failed, Ordering::Release);
    }
}

/// One fail-then-recover cycle's scheduled delays, per spec.md §4.6: fail
/// at `now + rand(0, 10s)`, recover at `fail_time + rand(1s, 4s)`.
pub fn next_cycle() -> (Duration, Duration) {
    let mut rng = rand::thread_rng();
    let fail_after = Duration::from_millis(rng.gen_range(0..10_000));
    let recover_after = Duration::from_millis(rng.gen_range(1_000..4_000));
    (fail_after, recover_after)
}

/// What the driver asks its caller to do on recovery: re-bind the listener
/// (possibly on a new port), reset the engine to IDLE, re-HOWDY, and start
/// a fresh election. Implemented as a callback rather than inline logic
/// here because re-binding requires tearing down and recreating the
/// `Listener`, which this module has no access to — that orchestration
/// lives in `node.rs`.
pub async fn run<F, Fut>(flag: std::sync::Arc<FailureFlag>, mut on_recover: F) -> !
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        let (fail_after, recover_after) = next_cycle();
        tokio::time::sleep(fail_after).await;
        info!("feigning failure");
        flag.set_failed(true);

        tokio::time::sleep(recover_after).await;
        flag.set_failed(false);
        info!("recovering from feigned failure");
        on_recover().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_cycle_stays_within_documented_bounds() {
        for _ in 0..100 {
            let (fail_after, recover_after) = next_cycle();
            assert!(fail_after <= Duration::from_millis(10_000));
            assert!(recover_after >= Duration::from_millis(1_000));
            assert!(recover_after <= Duration::from_millis(4_000));
        }
    }

    #[test]
    fn flag_starts_unset() {
        let flag = FailureFlag::new();
        assert!(!flag.is_failed());
    }
}
