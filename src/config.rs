//! CLI surface (SPEC_FULL.md §6). Argument shape is an operator choice per
//! spec.md §6; this mirrors `Rusty-Raft::Config` and `CloudP2P::
//! ServerConfig` in spirit, adapted to flags since there is no config-file
//! requirement here.

use clap::Parser;
use std::net::SocketAddr;

#[derive(Debug, Parser)]
#[command(name = "bully-node", about = "A Bully-algorithm election participant")]
pub struct Cli {
    /// Host the Group Coordinator Daemon listens on.
    #[arg(long)]
    pub gcd_host: String,

    /// Port the Group Coordinator Daemon listens on.
    #[arg(long)]
    pub gcd_port: u16,

    /// Days until this node's student's birthday (higher wins ties ahead of student-id).
    #[arg(long)]
    pub days: u32,

    /// This node's student id (tiebreaker).
    #[arg(long = "student-id")]
    pub student_id: u64,

    /// Local address to bind the listener on.
    #[arg(long, default_value = "127.0.0.1")]
    pub bind_host: String,

    /// Local port to bind the listener on; 0 lets the OS choose.
    #[arg(long, default_value_t = 0)]
    pub bind_port: u16,

    /// Enable the feigned-failure driver (§4.6's optional tier).
    #[arg(long)]
    pub feign_failure: bool,

    /// tracing-subscriber env-filter level.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn gcd_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.gcd_host, self.gcd_port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid --gcd-host/--gcd-port: {e}"))
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind_host, self.bind_port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid --bind-host/--bind-port: {e}"))
    }
}

pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
