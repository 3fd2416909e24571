//! # vrlink
//!
//! Runs either end of a bridge. The listening end plays the out-of-process driver: it
//! owns the rendezvous socket and serves until its peer goes away. The connecting end
//! plays the host: it drives a demo session from several concurrent callers and exits.
//!
//! ```bash
//! vrlink listen &
//! vrlink connect --depth 16 --callers 4
//! ```

mod cli;
mod demo;
mod logging;

use std::thread;

use anyhow::Context;
use bridgerun::Connection;
use clap::Parser;

use crate::cli::Cli;
use crate::cli::ConnectArgs;
use crate::cli::ListenArgs;
use crate::cli::Mode;
use crate::demo::Demo;
use crate::demo::DemoHandler;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.mode {
        Mode::Listen(args) => listen(args),
        Mode::Connect(args) => connect(args),
    }
}

fn listen(args: ListenArgs) -> anyhow::Result<()> {
    logging::to_file(&args.log)?;
    tracing::info!(pid = std::process::id(), socket = %args.socket.display(), "starting listener");

    let conn = Connection::<Demo>::builder(DemoHandler::new())
        .name(args.name)
        .listen(&args.socket)
        .context("establishing bridge")?;
    conn.wait_closed();

    tracing::info!(
        workers = conn.worker_count(),
        devices = conn.handles().len(),
        "peer left, shutting down"
    );
    Ok(())
}

fn connect(args: ConnectArgs) -> anyhow::Result<()> {
    logging::to_stderr()?;
    tracing::info!(pid = std::process::id(), socket = %args.socket.display(), "starting connector");

    let conn = Connection::<Demo>::builder(DemoHandler::new())
        .name(args.name)
        .connect(&args.socket)
        .context("establishing bridge")?;

    let reports = thread::scope(|scope| {
        let sessions: Vec<_> = (0..args.callers)
            .map(|caller| {
                let conn = &conn;
                scope.spawn(move || demo::run_session(conn, caller, args.depth))
            })
            .collect();
        sessions
            .into_iter()
            .map(|s| s.join().unwrap_or_else(|_| Err(anyhow::anyhow!("session thread panicked"))))
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    for (caller, report) in reports.iter().enumerate() {
        println!(
            "caller {}: ping #{}, countdown depth {}, devices {:?}, {} bytes via shared descriptor",
            caller, report.pings, report.depth, report.devices, report.shared_bytes
        );
    }

    conn.shutdown().context("closing bridge")?;
    Ok(())
}
