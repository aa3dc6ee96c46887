use clap::Parser;
use hdrhistogram::Histogram;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

use pb::consensus_service_client::ConsensusServiceClient;
use pb::GetPreferenceRequest;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of concurrent clients
    #[arg(short, long, default_value = "1")]
    concurrency: usize,

    /// Interval between requests per client, in ms
    #[arg(short, long, default_value = "100")]
    interval: u64,

    /// Duration of the benchmark in seconds
    #[arg(short, long, default_value = "30")]
    duration: u64,

    /// Node address
    #[arg(short, long, default_value = "http://127.0.0.1:9774")]
    server: String,
}

#[allow(clippy::module_inception)]
pub mod pb {
    tonic::include_proto!("consensus");
}

async fn run_client(
    server_addr: String,
    interval: Duration,
    deadline: Instant,
    histogram: Arc<Mutex<Histogram<u64>>>,
) {
    let mut client = match ConsensusServiceClient::connect(server_addr).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to connect to server: {}", e);
            return;
        }
    };

    while Instant::now() < deadline {
        let start = Instant::now();
        match client.get_preference(GetPreferenceRequest {}).await {
            Ok(_) => {
                let elapsed = start.elapsed().as_micros() as u64;
                let _ = histogram.lock().await.record(elapsed);
            }
            Err(e) => {
                eprintln!("get_preference failed: {}", e);
            }
        }
        sleep(interval).await;
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let histogram = Arc::new(Mutex::new(
        Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap(),
    ));
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    let mut workers = Vec::new();
    for _ in 0..args.concurrency {
        workers.push(tokio::spawn(run_client(
            args.server.clone(),
            Duration::from_millis(args.interval),
            deadline,
            histogram.clone(),
        )));
    }
    for worker in workers {
        let _ = worker.await;
    }

    let histogram = histogram.lock().await;
    println!("requests: {}", histogram.len());
    println!("latency p50: {}us", histogram.value_at_quantile(0.50));
    println!("latency p90: {}us", histogram.value_at_quantile(0.90));
    println!("latency p99: {}us", histogram.value_at_quantile(0.99));
    println!("latency max: {}us", histogram.max());
}
