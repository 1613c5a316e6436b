use anyhow::Context;
use bully_node::config::{init_tracing, Cli};
use bully_node::node::Node;
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:?}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let node = Node::bootstrap(&cli)
        .await
        .context("startup failed: could not bind listener or reach the GCD")?;
    Arc::new(node).run().await
}
