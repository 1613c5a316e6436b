//! End-to-end convergence tests: real sockets, real `Engine`s, no stubs
//! standing in for the wire format. Each test binds several nodes on
//! `127.0.0.1:0`, gives every node the full membership up front (as if a
//! GCD had already answered everyone's HOWDY), and asserts the group
//! converges on exactly one leader: the highest `(days_to_birthday,
//! student_id)` pair known, per spec.md §3's ordering rule.

use bully_node::engine::{Engine, EngineConfig};
use bully_node::feigned::FailureFlag;
use bully_node::identity::{Identity, ListenAddress};
use bully_node::listener::Listener;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> EngineConfig {
    EngineConfig {
        t_bully: Duration::from_millis(150),
        t_follower: Duration::from_millis(300),
        t_connect: Duration::from_millis(75),
    }
}

struct Node {
    engine: Arc<Engine>,
}

/// Binds one listener per identity, builds an `Engine` preloaded with the
/// full membership, and spawns the listener's accept loop. Mirrors what
/// `node::Node::bootstrap` does after its HOWDY round-trip, minus the GCD
/// hop itself, so these tests can exercise the engine/listener/courier
/// trio directly over real sockets.
async fn spawn_group(identities: &[Identity]) -> Vec<Node> {
    let mut listeners = Vec::new();
    for _ in identities {
        listeners.push(Listener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());
    }

    let members: HashMap<ListenAddress, Identity> = listeners
        .iter()
        .zip(identities)
        .map(|(l, id)| (ListenAddress::new(l.local_addr()), *id))
        .collect();

    let mut nodes = Vec::new();
    for (listener, id) in listeners.into_iter().zip(identities) {
        let self_addr = ListenAddress::new(listener.local_addr());
        let feigned = Arc::new(FailureFlag::new());
        let engine = Arc::new(Engine::new(self_addr, *id, fast_config(), Arc::clone(&feigned)));
        engine.merge_membership(&members).await;

        let engine_for_serve = Arc::clone(&engine);
        tokio::spawn(async move { listener.serve(engine_for_serve, feigned).await });

        nodes.push(Node { engine });
    }
    nodes
}

/// Polls every node's `current_leader()` until they all agree (or the
/// deadline passes), returning the agreed identity.
async fn wait_for_convergence(nodes: &[Node], deadline: Duration) -> Vec<Option<Identity>> {
    let start = tokio::time::Instant::now();
    loop {
        let leaders: Vec<Option<Identity>> = {
            let mut v = Vec::with_capacity(nodes.len());
            for n in nodes {
                v.push(n.engine.current_leader().await);
            }
            v
        };
        let all_agree = leaders.iter().all(|l| l.is_some()) && leaders.windows(2).all(|w| w[0] == w[1]);
        if all_agree || start.elapsed() > deadline {
            return leaders;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Scenario 1 (spec.md §8): three nodes join, the highest identity wins
/// deterministically regardless of who starts electing first.
#[tokio::test]
async fn three_node_group_converges_on_the_highest_identity() {
    let identities = [Identity::new(10, 1), Identity::new(20, 2), Identity::new(5, 3)];
    let nodes = spawn_group(&identities).await;

    for n in &nodes {
        n.engine.start_election().await;
    }

    let leaders = wait_for_convergence(&nodes, Duration::from_secs(2)).await;
    assert!(leaders.iter().all(|l| *l == Some(Identity::new(20, 2))));
}

/// Scenario 2 (spec.md §8): a days-to-birthday tie is broken by student id.
#[tokio::test]
async fn tied_birthday_is_broken_by_student_id() {
    let identities = [Identity::new(10, 100), Identity::new(10, 200), Identity::new(10, 50)];
    let nodes = spawn_group(&identities).await;

    for n in &nodes {
        n.engine.start_election().await;
    }

    let leaders = wait_for_convergence(&nodes, Duration::from_secs(2)).await;
    assert!(leaders.iter().all(|l| *l == Some(Identity::new(10, 200))));
}

/// Boundary behavior (spec.md §8): only the lowest-identity node starts
/// electing; everyone still converges because ELECT fans out to higher
/// peers, who in turn run their own elections.
#[tokio::test]
async fn election_started_by_the_lowest_node_still_converges() {
    let identities = [Identity::new(1, 1), Identity::new(50, 1), Identity::new(99, 1)];
    let nodes = spawn_group(&identities).await;

    nodes[0].engine.start_election().await;

    let leaders = wait_for_convergence(&nodes, Duration::from_secs(2)).await;
    assert!(leaders.iter().all(|l| *l == Some(Identity::new(99, 1))));
}

/// Scenario 5 (spec.md §8): every node starts electing at once (a
/// concurrent ELECT storm); the group still settles on exactly one leader.
#[tokio::test]
async fn concurrent_elections_from_every_node_settle_on_one_leader() {
    let identities = [
        Identity::new(3, 1),
        Identity::new(7, 2),
        Identity::new(7, 9),
        Identity::new(1, 50),
    ];
    let nodes = spawn_group(&identities).await;

    let starts: Vec<_> = nodes
        .iter()
        .map(|n| {
            let engine = Arc::clone(&n.engine);
            tokio::spawn(async move { engine.start_election().await })
        })
        .collect();
    for s in starts {
        s.await.unwrap();
    }

    let leaders = wait_for_convergence(&nodes, Duration::from_secs(2)).await;
    assert!(leaders.iter().all(|l| *l == Some(Identity::new(7, 9))));
}

/// Scenario 3 (spec.md §8): a node that joins after the others have
/// already elected a leader, with a higher identity than the incumbent,
/// preempts it once it elects.
#[tokio::test]
async fn a_higher_latecomer_preempts_the_incumbent_leader() {
    let identities = [Identity::new(10, 1), Identity::new(20, 1)];
    let nodes = spawn_group(&identities).await;

    for n in &nodes {
        n.engine.start_election().await;
    }
    let leaders = wait_for_convergence(&nodes, Duration::from_secs(2)).await;
    assert!(leaders.iter().all(|l| *l == Some(Identity::new(20, 1))));

    // A third, higher-identity node joins with full membership knowledge
    // (as HOWDY would give it) and starts its own election.
    let newcomer_listener = Listener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let newcomer_addr = ListenAddress::new(newcomer_listener.local_addr());
    let newcomer_id = Identity::new(99, 1);
    let newcomer_feigned = Arc::new(FailureFlag::new());
    let newcomer_engine = Arc::new(Engine::new(
        newcomer_addr,
        newcomer_id,
        fast_config(),
        Arc::clone(&newcomer_feigned),
    ));

    let mut members: HashMap<ListenAddress, Identity> = HashMap::new();
    for n in &nodes {
        let snapshot = n.engine.membership_snapshot().await;
        for (addr, id) in snapshot.as_map() {
            members.insert(*addr, *id);
        }
    }
    newcomer_engine.merge_membership(&members).await;
    for n in &nodes {
        let mut one = HashMap::new();
        one.insert(newcomer_addr, newcomer_id);
        n.engine.merge_membership(&one).await;
    }

    let engine_for_serve = Arc::clone(&newcomer_engine);
    tokio::spawn(async move { newcomer_listener.serve(engine_for_serve, newcomer_feigned).await });

    newcomer_engine.start_election().await;

    let mut all_nodes = nodes;
    all_nodes.push(Node {
        engine: newcomer_engine,
    });
    let leaders = wait_for_convergence(&all_nodes, Duration::from_secs(2)).await;
    assert!(leaders.iter().all(|l| *l == Some(newcomer_id)));
}
