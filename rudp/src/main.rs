//! Entry point for `rudp`.
//!
//! Parses CLI arguments and dispatches into either **send** or **recv** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing).

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use rudp::{Encoding, Receiver, ReceiverConfig, Sender, SenderConfig, UdpTransport};

/// Reliable byte-stream transfer over UDP (go-back-N with optional SACK).
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file (or stdin) to a receiver.
    Send(SendArgs),
    /// Receive one transfer and write it to a file (or stdout).
    Recv(RecvArgs),
}

/// Flags shared by both ends; they must agree.
#[derive(Args)]
struct WireArgs {
    /// Window size in messages.
    #[arg(short, long, default_value_t = rudp::config::DEFAULT_WINDOW_SIZE)]
    window: usize,
    /// Enable selective acknowledgments.
    #[arg(short = 'k', long)]
    sack: bool,
    /// Use the binary record encoding instead of delimited text.
    #[arg(short, long)]
    binary: bool,
}

impl WireArgs {
    fn encoding(&self) -> Encoding {
        if self.binary {
            Encoding::Binary
        } else {
            Encoding::Text
        }
    }
}

#[derive(Args)]
struct SendArgs {
    /// File to transfer; reads stdin when omitted.
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Receiver address.
    #[arg(short, long, default_value = "localhost:33122")]
    address: String,
    /// Local address to bind.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,
    /// Milliseconds before the oldest unacked message forces a go-back-N rewind.
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,
    /// Milliseconds to wait for a response each round.
    #[arg(long, default_value_t = 50)]
    wait_ms: u64,
    /// Bytes per message.
    #[arg(long, default_value_t = rudp::config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    #[command(flatten)]
    wire: WireArgs,
}

#[derive(Args)]
struct RecvArgs {
    /// Local address to listen on.
    #[arg(long, default_value = "0.0.0.0:33122")]
    bind: SocketAddr,
    /// Output file; writes stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Seconds to wait for the first frame; waits forever when omitted.
    #[arg(long)]
    start_secs: Option<u64>,
    /// Seconds of silence before giving up on a transfer that has begun.
    #[arg(long, default_value_t = 10)]
    idle_secs: u64,
    /// Milliseconds to keep answering retransmissions after completion.
    #[arg(long, default_value_t = 2000)]
    linger_ms: u64,
    #[command(flatten)]
    wire: WireArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send(args) => send(args).await,
        Mode::Recv(args) => recv(args).await,
    }
}

async fn send(args: SendArgs) -> Result<()> {
    let peer = tokio::net::lookup_host(&args.address)
        .await
        .with_context(|| format!("resolving {}", args.address))?
        .next()
        .with_context(|| format!("no address for {}", args.address))?;

    let source: Box<dyn Read + Send> = match &args.file {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        // A pipe can stall; drain it off the runtime so timeouts keep firing.
        None => Box::new(rudp::source::buffer_blocking(io::stdin()).await?),
    };

    let config = SenderConfig {
        window_size: args.wire.window,
        send_timeout: Duration::from_millis(args.timeout_ms),
        receive_wait: Duration::from_millis(args.wait_ms),
        chunk_size: args.chunk_size,
        sack: args.wire.sack,
        encoding: args.wire.encoding(),
    };

    let transport = UdpTransport::connect(args.bind, peer).await?;
    log::info!("Sending to {peer} from {}", transport.local_addr);
    let mut sender = Sender::new(transport, source, config)?;

    // Dropping the sender on interrupt closes the source; in-flight state is abandoned.
    tokio::select! {
        result = sender.run() => {
            let stats = result?;
            log::info!("Done: {stats}");
        }
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted; transfer abandoned");
        }
    }
    Ok(())
}

async fn recv(args: RecvArgs) -> Result<()> {
    let output: Box<dyn Write + Send> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    let config = ReceiverConfig {
        window_size: args.wire.window,
        sack: args.wire.sack,
        encoding: args.wire.encoding(),
        start_timeout: args.start_secs.map(Duration::from_secs),
        idle_timeout: Duration::from_secs(args.idle_secs),
        linger: Duration::from_millis(args.linger_ms),
    };

    let transport = UdpTransport::bind(args.bind).await?;
    log::info!("Listening on {}", transport.local_addr);
    let mut receiver = Receiver::new(transport, output, config)?;

    tokio::select! {
        result = receiver.run() => {
            let stats = result?;
            if !stats.complete {
                anyhow::bail!("transfer incomplete (stopped at ack {})", stats.final_ack);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted; output may be partial");
        }
    }
    Ok(())
}
