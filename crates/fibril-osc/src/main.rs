use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;

use fibril_core::{Allocator, DEFAULT_LISTEN_PORT, DEFAULT_SEND_PORT, DEFAULT_TICK_MS};

mod osc;
mod server;

/// Probabilistic 48-voice allocation engine driven by OSC rank controllers.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// UDP port for inbound controller messages
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT)]
    listen_port: u16,

    /// UDP port the host listens on for voice updates
    #[arg(long, default_value_t = DEFAULT_SEND_PORT)]
    send_port: u16,

    /// Host to send voice updates to
    #[arg(long, default_value = "127.0.0.1")]
    send_host: String,

    /// Allocator period in milliseconds
    #[arg(long, default_value_t = DEFAULT_TICK_MS)]
    tick_ms: u64,

    /// PRNG seed; a random seed is drawn (and logged) when omitted
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let seed = args.seed.unwrap_or_else(rand::random);
    info!("allocator seed {seed} (pass --seed {seed} to replay this run)");

    let listen = UdpSocket::bind(("0.0.0.0", args.listen_port))
        .with_context(|| format!("binding inbound port {}", args.listen_port))?;
    // A finite read timeout lets the ingest loop notice shutdown.
    listen
        .set_read_timeout(Some(Duration::from_millis(500)))
        .context("setting inbound read timeout")?;
    let outbound = UdpSocket::bind(("0.0.0.0", 0)).context("binding outbound socket")?;
    let target: SocketAddr = (args.send_host.as_str(), args.send_port)
        .to_socket_addrs()
        .with_context(|| format!("resolving send host {}", args.send_host))?
        .next()
        .with_context(|| format!("send host {} has no address", args.send_host))?;

    info!(
        "listening on {}, sending to {target}, tick {} ms",
        args.listen_port, args.tick_ms
    );

    let shared = Arc::new(Mutex::new(server::Shared::new()));
    let running = Arc::new(AtomicBool::new(true));

    let ingest = {
        let shared = Arc::clone(&shared);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("fibril-ingest".into())
            .spawn(move || server::ingest_loop(listen, shared, running))
            .context("spawning ingest thread")?
    };

    server::scheduler_loop(
        shared,
        running,
        Allocator::new(seed),
        outbound,
        target,
        Duration::from_millis(args.tick_ms.max(1)),
    );

    let _ = ingest.join();
    Ok(())
}
