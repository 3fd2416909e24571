//! Command line surface.

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;

/// Where the two ends meet.
pub const DEFAULT_SOCKET: &str = "/tmp/vrlink/sock";

/// Where the listening end appends its log.
pub const DEFAULT_LOG: &str = "/tmp/vrlink/log";

#[derive(Parser, Debug)]
#[command(name = "vrlink")]
#[command(about = "One end of a synchronous, reentrant call bridge over a Unix socket")]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Create the rendezvous socket, accept one peer, and serve until it leaves.
    Listen(ListenArgs),
    /// Connect to a listening peer and run the demo session against it.
    Connect(ConnectArgs),
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Rendezvous socket path. A stale file at this path is removed.
    #[arg(long, default_value = DEFAULT_SOCKET)]
    pub socket: PathBuf,

    /// Log file, opened in append mode.
    #[arg(long, default_value = DEFAULT_LOG)]
    pub log: PathBuf,

    /// Label for logs and thread names.
    #[arg(long, default_value = "driver")]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Rendezvous socket path.
    #[arg(long, default_value = DEFAULT_SOCKET)]
    pub socket: PathBuf,

    /// Label for logs and thread names.
    #[arg(long, default_value = "host")]
    pub name: String,

    /// How many times the countdown bounces between the two processes.
    #[arg(long, default_value_t = 8)]
    pub depth: u64,

    /// Concurrent callers, each with its own identity.
    #[arg(long, default_value_t = 2)]
    pub callers: usize,
}
