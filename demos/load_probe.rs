//! Fires N concurrent queries and reports latency percentiles.
//!
//! ```bash
//! cargo run --release --example load_probe -- 127.0.0.1:44445 "hello world" 5000
//! ```

use std::env;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let mut args = env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:44445".to_string());
    let query = args.next().unwrap_or_else(|| "hello world".to_string());
    let total: usize = args.next().and_then(|v| v.parse().ok()).unwrap_or(1000);

    let mut tasks = Vec::with_capacity(total);
    for _ in 0..total {
        let addr = addr.clone();
        let line = format!("{query}\n");

        tasks.push(tokio::spawn(async move {
            let started = Instant::now();
            let mut stream = TcpStream::connect(&addr).await?;
            stream.write_all(line.as_bytes()).await?;

            let mut response = Vec::new();
            stream.read_to_end(&mut response).await?;
            Ok::<_, std::io::Error>(started.elapsed())
        }));
    }

    let mut latencies = Vec::with_capacity(total);
    let mut failed = 0usize;
    for task in tasks {
        match task.await.expect("probe task panicked") {
            Ok(elapsed) => latencies.push(elapsed),
            Err(_) => failed += 1,
        }
    }

    latencies.sort();
    println!("{} ok, {} failed", latencies.len(), failed);

    if !latencies.is_empty() {
        let pct = |p: usize| latencies[(latencies.len() * p / 100).min(latencies.len() - 1)];
        println!(
            "p50 {:?}  p95 {:?}  p99 {:?}  max {:?}",
            pct(50),
            pct(95),
            pct(99),
            latencies[latencies.len() - 1]
        );
    }

    Ok(())
}
