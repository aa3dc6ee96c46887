use clap::Parser;
use tokio::signal;

use snownode::config::RuntimeConfig;
use snownode::server::Node;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the runtime config file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Address to listen on, host:port
    #[arg(long)]
    addr: Option<String>,

    /// Bootstrap addresses to join the p2p network
    #[arg(long)]
    bootstrap: Vec<String>,

    /// Sample size of each round of query. K < number of peers
    #[arg(long)]
    k: Option<usize>,

    /// Quorum size. A <= K
    #[arg(long)]
    a: Option<usize>,

    /// Decision threshold
    #[arg(long)]
    b: Option<u64>,

    /// Maximum number of rounds of query
    #[arg(long)]
    max_step: Option<u64>,

    /// Initial preference value
    #[arg(long)]
    preference: Option<i64>,

    /// Start a convergence run this many seconds after startup
    #[arg(long)]
    sync_after: Option<u64>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::try_init().unwrap_or_default();
    let args = Args::parse();

    let mut config = RuntimeConfig::from_toml(&args.config);
    if let Some(addr) = args.addr {
        config.addr = addr;
    }
    if !args.bootstrap.is_empty() {
        config.bootstrap = args.bootstrap;
    }
    if let Some(k) = args.k {
        config.snow.k = k;
    }
    if let Some(a) = args.a {
        config.snow.a = a;
    }
    if let Some(b) = args.b {
        config.snow.b = b;
    }
    if let Some(max_step) = args.max_step {
        config.snow.max_step = max_step;
    }

    let mut node = Node::new(config);
    if let Some(preference) = args.preference {
        node.consensus.update_preference(preference);
    }
    node.start().await?;

    if let Some(secs) = args.sync_after {
        let consensus = node.consensus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;
            consensus.sync().await;
        });
    }

    shutdown_signal().await;
    node.stop().await;
    Ok(())
}
