//! Wires the six components together: HOWDY → initial election → listener
//! + courier pool + failure detector + (optional) feigned-failure driver
//! running concurrently off one shared `Engine` (spec.md §2's control
//! flow).

use crate::config::Cli;
use crate::engine::{Engine, EngineConfig};
use crate::feigned::FailureFlag;
use crate::identity::{Identity, ListenAddress};
use crate::listener::Listener;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Node {
    engine: Arc<Engine>,
    gcd: SocketAddr,
    bind_host: String,
    feigned: Arc<FailureFlag>,
    feign_enabled: bool,
    listener_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Binds the listener, HOWDYs the GCD, and builds the engine. Either
    /// failure is fatal at startup (spec.md §7: `BindError`/
    /// `GCDUnreachable`).
    pub async fn bootstrap(cli: &Cli) -> anyhow::Result<Self> {
        let gcd = cli.gcd_addr()?;
        let bind_addr = cli.bind_addr()?;
        let self_id = Identity::new(cli.days, cli.student_id);

        let listener = Listener::bind(bind_addr).await?;
        let self_addr = ListenAddress::new(listener.local_addr());

        info!(%self_addr, %self_id, "bound listener, HOWDYing GCD");
        let members = crate::gcd_client::howdy(gcd, self_id, self_addr).await?;

        let feigned = Arc::new(FailureFlag::new());
        let engine = Arc::new(Engine::new(
            self_addr,
            self_id,
            EngineConfig::default(),
            Arc::clone(&feigned),
        ));
        engine.merge_membership(&members).await;

        let listener_task = tokio::spawn(spawn_listener_serve(
            listener,
            Arc::clone(&engine),
            Arc::clone(&feigned),
        ));

        Ok(Node {
            engine,
            gcd,
            bind_host: cli.bind_host.clone(),
            feigned,
            feign_enabled: cli.feign_failure,
            listener_task: tokio::sync::Mutex::new(Some(listener_task)),
        })
    }

    /// Starts the initial election and the background failure-detector /
    /// feigned-failure tasks, then waits for Ctrl-C (spec.md §6: exit 0 on
    /// graceful shutdown).
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        self.engine.start_election().await;

        let detector_engine = Arc::clone(&self.engine);
        let detector_feigned = Arc::clone(&self.feigned);
        let gcd = self.gcd;
        tokio::spawn(async move {
            crate::failure_detector::run(detector_engine, gcd, detector_feigned).await
        });

        if self.feign_enabled {
            let node = Arc::clone(&self);
            let flag = Arc::clone(&self.feigned);
            tokio::spawn(async move {
                crate::feigned::run(flag, move || {
                    let node = Arc::clone(&node);
                    async move { node.recover_from_feigned_failure().await }
                })
                .await
            });
        }

        tokio::signal::ctrl_c().await?;
        info!("shutting down gracefully");
        Ok(())
    }

    /// Rebinds the listener (possibly a new port), resets the engine to
    /// IDLE, and re-HOWDYs — spec.md §4.6's recovery contract.
    async fn recover_from_feigned_failure(self: Arc<Self>) {
        let bind_addr: SocketAddr = format!("{}:0", self.bind_host)
            .parse()
            .expect("bind host was already validated at startup");

        let listener = match Listener::bind(bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, "failed to rebind listener on recovery");
                return;
            }
        };
        let new_addr = ListenAddress::new(listener.local_addr());

        if let Some(old) = self.listener_task.lock().await.take() {
            old.abort();
        }
        let new_task = tokio::spawn(spawn_listener_serve(
            listener,
            Arc::clone(&self.engine),
            Arc::clone(&self.feigned),
        ));
        *self.listener_task.lock().await = Some(new_task);

        self.engine.reset_for_recovery(new_addr).await;

        match crate::gcd_client::howdy(self.gcd, self.engine.self_id(), new_addr).await {
            Ok(members) => {
                self.engine.merge_membership(&members).await;
                self.engine.start_election().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "re-HOWDY after recovery failed; next PROBE cycle will retry");
            }
        }
    }
}

async fn spawn_listener_serve(listener: Listener, engine: Arc<Engine>, feigned: Arc<FailureFlag>) {
    listener.serve(engine, feigned).await
}
