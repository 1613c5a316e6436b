//! The Election Engine: the state machine owning "election in progress",
//! "current leader", and when to emit I_AM_LEADER (spec.md §4.4). Grounded
//! in `PeerImage-Services::ElectionManager::{start_election,declare_leader}`,
//! generalized from that teacher's two-outcome logic (become leader, or do
//! nothing and passively wait) into the full
//! IDLE/ELECTING/FOLLOWER/LEADER table, a GOT_IT-driven follower
//! transition, and the re-entrancy guard on concurrent ELECT receipt.
//!
//! Every state transition runs under `Inner`'s single mutex (§5's "engine
//! lock"); socket I/O always happens outside it, in `crate::courier`.
//! Timers and courier results are tagged with an `epoch` so that a result
//! from an election/follower period the engine has already moved past is
//! silently ignored, instead of corrupting a newer one.

use crate::courier::{self, CourierOutcome};
use crate::feigned::FailureFlag;
use crate::identity::{Identity, ListenAddress};
use crate::membership::MembershipTable;
use crate::message::MembershipPayload;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Recommended defaults from spec.md §4.4: T_bully = 1.5s, T_follower =
/// 3×T_bully, T_connect ≤ T_bully/2.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub t_bully: Duration,
    pub t_follower: Duration,
    pub t_connect: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let t_bully = Duration::from_millis(1500);
        Self {
            t_bully,
            t_follower: t_bully * 3,
            t_connect: t_bully / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Electing,
    Leader,
    Follower,
}

struct Inner {
    state: State,
    membership: MembershipTable,
    current_leader: Option<Identity>,
    /// Bumped on every transition a timer/courier result must be checked
    /// against before acting, so stale async work becomes a no-op.
    epoch: u64,
    /// Peers in H we still await a GOT_IT from, for the current election.
    outstanding: usize,
    /// Lives under the lock, not a plain field, because the feigned-failure
    /// driver can rebind this node to a new port on recovery (spec.md
    /// §4.6); every other field here already needs the lock anyway.
    self_addr: ListenAddress,
}

pub struct Engine {
    self_id: Identity,
    config: EngineConfig,
    inner: Mutex<Inner>,
    /// Checked before every outbound courier dispatch. While "failed", this
    /// node must look to peers exactly like a crashed process, so ELECT and
    /// I_AM_LEADER sends are inhibited (spec.md §4.6) even though the engine
    /// keeps tracking state internally.
    feigned: Arc<FailureFlag>,
}

impl Engine {
    pub fn new(
        self_addr: ListenAddress,
        self_id: Identity,
        config: EngineConfig,
        feigned: Arc<FailureFlag>,
    ) -> Self {
        let mut membership = MembershipTable::new();
        membership.insert(self_addr, self_id);
        Engine {
            self_id,
            config,
            inner: Mutex::new(Inner {
                state: State::Idle,
                membership,
                current_leader: None,
                epoch: 0,
                outstanding: 0,
                self_addr,
            }),
            feigned,
        }
    }

    pub fn self_id(&self) -> Identity {
        self.self_id
    }

    pub async fn self_addr(&self) -> ListenAddress {
        self.inner.lock().await.self_addr
    }

    /// Resets to IDLE under a new listen address and bumps the epoch so any
    /// in-flight timer/courier from before recovery is ignored. Used by the
    /// feigned-failure driver after rebinding its listener — spec.md §4.6's
    /// "recovered" means a fresh IDLE engine, not a resumed one.
    pub async fn reset_for_recovery(&self, new_addr: ListenAddress) {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.state = State::Idle;
        inner.current_leader = None;
        inner.self_addr = new_addr;
        inner.membership.insert(new_addr, self.self_id);
    }

    pub async fn state(&self) -> State {
        self.inner.lock().await.state
    }

    pub async fn current_leader(&self) -> Option<Identity> {
        self.inner.lock().await.current_leader
    }

    pub async fn membership_snapshot(&self) -> MembershipTable {
        self.inner.lock().await.membership.clone()
    }

    /// Merge a freshly-fetched HOWDY membership into the table without
    /// triggering an election (used on re-HOWDY after a failed PROBE).
    pub async fn merge_membership(&self, members: &MembershipPayload) {
        self.inner.lock().await.membership.merge(members);
    }

    /// §4.4 row 1: IDLE/FOLLOWER/LEADER → ELECTING on `start_election()`.
    /// Snapshots membership, computes H, and either becomes leader
    /// immediately (H empty) or dispatches ELECT to every peer in H and
    /// arms the election deadline. Returns as soon as couriers are
    /// dispatched, never waiting for their results (§4.5's non-blocking
    /// contract).
    pub async fn start_election(self: &Arc<Self>) {
        let (higher, epoch) = {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            inner.state = State::Electing;
            let self_addr = inner.self_addr;
            let higher = inner.membership.higher_peers(&self_addr, self.self_id);
            inner.outstanding = higher.len();
            (higher, inner.epoch)
        };

        if higher.is_empty() {
            self.become_leader(epoch).await;
            return;
        }

        info!(epoch, peers = higher.len(), "starting election");
        let members = {
            let inner = self.inner.lock().await;
            inner.membership.as_map().clone()
        };

        for peer in higher {
            let this = Arc::clone(self);
            let members = members.clone();
            tokio::spawn(async move {
                let outcome = if this.feigned.is_failed() {
                    CourierOutcome::Failed
                } else {
                    let (t_connect, t_bully) = (this.config.t_connect, this.config.t_bully);
                    courier::send_elect(peer.addr, members, t_connect, t_bully).await
                };
                this.on_courier_elect_result(epoch, outcome).await;
            });
        }

        let this = Arc::clone(self);
        let deadline_wait = self.config.t_bully;
        tokio::spawn(async move {
            tokio::time::sleep(deadline_wait).await;
            this.on_election_deadline(epoch).await;
        });
    }

    /// §4.4 rows 2/3: merge `members`; if already ELECTING, do nothing
    /// further (no recursive election — the re-entrancy rule). Otherwise
    /// start a fresh election. The `"GOT_IT"` reply itself is written by
    /// the dispatcher before this is called (§4.3).
    pub async fn on_elect_received(self: &Arc<Self>, members: MembershipPayload) {
        let should_start = {
            let mut inner = self.inner.lock().await;
            inner.membership.merge(&members);
            inner.state != State::Electing
        };
        if should_start {
            self.start_election().await;
        }
    }

    /// §4.4: `on_leader_announced` — adopted unconditionally, even from a
    /// strictly-lower identity (DESIGN.md open-question resolution #2);
    /// PROBE cycles self-heal a bad announcement.
    pub async fn on_leader_announced(self: &Arc<Self>, identity: Identity) {
        let (epoch, became_follower) = {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            inner.current_leader = Some(identity);
            inner.state = if identity == self.self_id {
                State::Leader
            } else {
                State::Follower
            };
            (inner.epoch, inner.state == State::Follower)
        };

        if became_follower {
            self.arm_follower_timeout(epoch);
        }
    }

    /// A courier reports back the outcome of one ELECT send.
    async fn on_courier_elect_result(self: &Arc<Self>, epoch: u64, outcome: CourierOutcome) {
        let action = {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch || inner.state != State::Electing {
                return;
            }
            match outcome {
                CourierOutcome::GotIt => {
                    inner.state = State::Follower;
                    Some(Action::BecomeFollower)
                }
                CourierOutcome::Failed => {
                    inner.outstanding = inner.outstanding.saturating_sub(1);
                    if inner.outstanding == 0 {
                        Some(Action::BecomeLeader)
                    } else {
                        None
                    }
                }
            }
        };

        match action {
            Some(Action::BecomeFollower) => {
                info!(epoch, "a higher peer is alive, yielding and awaiting I_AM_LEADER");
                self.arm_follower_timeout(epoch);
            }
            Some(Action::BecomeLeader) => self.become_leader(epoch).await,
            None => {}
        }
    }

    /// §4.4 row: `electionDeadline` expires with zero GOT_IT received →
    /// LEADER. A no-op if the engine already moved on (epoch mismatch, or
    /// it already transitioned away from ELECTING — e.g. a GOT_IT arrived,
    /// or all couriers had already failed and triggered the early leader
    /// transition in `on_courier_elect_result`).
    async fn on_election_deadline(self: &Arc<Self>, epoch: u64) {
        let still_electing = {
            let inner = self.inner.lock().await;
            inner.epoch == epoch && inner.state == State::Electing
        };
        if still_electing {
            warn!(epoch, "election deadline expired with no GOT_IT; becoming leader");
            self.become_leader(epoch).await;
        }
    }

    /// §4.4 row: FOLLOWER, `T_follower` expires with no I_AM_LEADER →
    /// restart election.
    async fn on_follower_timeout(self: &Arc<Self>, epoch: u64) {
        let still_waiting = {
            let inner = self.inner.lock().await;
            inner.epoch == epoch && inner.state == State::Follower
        };
        if still_waiting {
            warn!(epoch, "follower timeout with no I_AM_LEADER; restarting election");
            self.start_election().await;
        }
    }

    fn arm_follower_timeout(self: &Arc<Self>, epoch: u64) {
        let this = Arc::clone(self);
        let wait = self.config.t_follower;
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            this.on_follower_timeout(epoch).await;
        });
    }

    /// Declares self the winner: sets state/currentLeader under the lock,
    /// then broadcasts I_AM_LEADER to every other known peer outside it.
    /// Invariant: exactly one of these runs per election won. The guard
    /// checks `state == Electing` in addition to the epoch: `epoch` alone
    /// isn't enough, since `on_courier_elect_result` can decide to become
    /// leader and release the lock before this re-acquires it, and
    /// `on_election_deadline` can observe the same still-Electing state in
    /// that window and also call in — both would otherwise pass the epoch
    /// check (this function never bumps it) and broadcast twice.
    async fn become_leader(self: &Arc<Self>, epoch: u64) {
        let peers = {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch || inner.state != State::Electing {
                return;
            }
            inner.state = State::Leader;
            inner.current_leader = Some(self.self_id);
            let self_addr = inner.self_addr;
            inner.membership.all_peers_except_self(&self_addr)
        };

        info!(epoch, "elected leader, broadcasting I_AM_LEADER");
        for peer in peers {
            let this = Arc::clone(self);
            let identity = self.self_id;
            tokio::spawn(async move {
                if this.feigned.is_failed() {
                    return;
                }
                let _ = courier::send_i_am_leader(peer.addr, identity, this.config.t_connect).await;
            });
        }
    }
}

enum Action {
    BecomeFollower,
    BecomeLeader,
}
