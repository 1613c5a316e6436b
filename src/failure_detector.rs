//! Failure Detector (spec.md §4.6, optional tier): periodically PROBEs the
//! current leader; on failure, re-HOWDYs the GCD and starts a new election.
//! Grounded in `distinsta::BullyElection::start_leader_monitoring` /
//! `check_leader_alive`'s sleep-probe-react loop.

use crate::engine::Engine;
use crate::feigned::FailureFlag;
use crate::identity::ListenAddress;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const PROBE_INTERVAL_MIN_MS: u64 = 500;
const PROBE_INTERVAL_MAX_MS: u64 = 3000;

fn random_probe_interval() -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(PROBE_INTERVAL_MIN_MS..=PROBE_INTERVAL_MAX_MS))
}

/// Runs forever. While `currentLeader` is known and isn't us, sleeps a
/// random `T_probe_interval`, PROBEs it, and on failure re-HOWDYs `gcd`
/// before asking `engine` to start a fresh election. While `feigned`
/// reports this node as failed, PROBEs are skipped entirely — a crashed
/// process doesn't go on monitoring anyone (spec.md §4.6).
pub async fn run(engine: Arc<Engine>, gcd: SocketAddr, feigned: Arc<FailureFlag>) -> ! {
    loop {
        sleep(random_probe_interval()).await;

        if feigned.is_failed() {
            continue;
        }

        let leader = engine.current_leader().await;
        let self_id = engine.self_id();
        let Some(leader_id) = leader else { continue };
        if leader_id == self_id {
            continue;
        }

        let snapshot = engine.membership_snapshot().await;
        let leader_addr = snapshot
            .as_map()
            .iter()
            .find(|(_, id)| **id == leader_id)
            .map(|(addr, _)| *addr);
        let Some(leader_addr) = leader_addr else { continue };

        let outcome = crate::courier::send_probe(
            leader_addr.addr,
            Duration::from_millis(750),
            Duration::from_millis(1500),
        )
        .await;

        if outcome == crate::courier::CourierOutcome::Failed {
            warn!(%leader_addr, "leader PROBE failed; re-joining via GCD");
            let self_addr = engine.self_addr().await;
            if let Err(e) = rejoin_and_elect(&engine, gcd, self_id, self_addr).await {
                warn!(error = %e, "re-HOWDY after leader failure did not succeed; will retry next cycle");
            }
        }
    }
}

async fn rejoin_and_elect(
    engine: &Arc<Engine>,
    gcd: SocketAddr,
    self_id: crate::identity::Identity,
    self_addr: ListenAddress,
) -> Result<(), crate::error::NodeError> {
    let members = crate::gcd_client::howdy(gcd, self_id, self_addr).await?;
    engine.merge_membership(&members).await;
    info!("starting a new election after leader failure");
    engine.start_election().await;
    Ok(())
}
