//! Server lifecycle: construction from a frozen `Config`, the worker pool,
//! the accept loop, and graceful shutdown.
//!
//! The worker model is a fixed pool of long-lived tasks popping accepted
//! connections from a bounded queue. The queue is the admission gate: its
//! capacity equals the worker count, so once every worker is busy and the
//! handoff queue is full, new connections are closed at accept time with no
//! response.

use crate::{
    cache::LookupCache,
    config::Config,
    errors::StartupError,
    metrics::Metrics,
    ratelimit::RateLimiter,
    server::{connection::ConnectionContext, listener},
    source::DataSource,
};
use crossbeam::queue::ArrayQueue;
use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, error, info, warn};

/// How long an idle worker sleeps between queue polls.
const WORKER_POLL_INTERVAL: Duration = Duration::from_micros(50);

type Admitted = (TcpStream, SocketAddr, Instant);

/// The query server.
///
/// # Examples
///
/// ```no_run
/// use linegate::{Config, Server};
///
/// #[tokio::main]
/// async fn main() {
///     let mut config = Config::default();
///     config.data_path = "/var/lib/linegate/data.txt".into();
///
///     let server = Server::bind(config).expect("startup failed");
///     server.serve().await.expect("runtime failure");
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    queue: Arc<ArrayQueue<Admitted>>,
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<Metrics>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    config: Config,
}

impl Server {
    /// Validates the configuration, prepares the data source, binds the
    /// socket, and starts the worker pool.
    ///
    /// In indexed mode this is where the whole data file is read. Must be
    /// called from within the tokio runtime.
    pub fn bind(config: Config) -> Result<Self, StartupError> {
        config.validate()?;

        let source = DataSource::open(&config)?;
        if let DataSource::Indexed(index) = &source {
            info!(
                lines = index.len(),
                bytes = index.source_size(),
                modified = ?index.source_modified(),
                "line index built"
            );
        }

        // Reread mode always runs with the cache disabled: the file may
        // change between queries, so cached answers could lie.
        let cache = if config.reread_on_query {
            LookupCache::new(0)
        } else {
            LookupCache::new(config.cache_capacity)
        };

        let limiter = if config.rate_limit_enabled {
            RateLimiter::new(config.requests_per_minute)
        } else {
            RateLimiter::disabled()
        };
        if limiter.is_enabled() {
            info!(
                requests_per_minute = config.requests_per_minute,
                "per-IP rate limiting enabled"
            );
        }

        let tls = listener::load_tls(&config)?;
        let listener = listener::bind(&config)?;
        let local_addr = listener.local_addr().map_err(|source| StartupError::Bind {
            addr: config.addr(),
            source,
        })?;

        let metrics = Arc::new(Metrics::default());
        let ctx = Arc::new(ConnectionContext {
            source,
            cache,
            limiter,
            metrics: Arc::clone(&metrics),
            tls,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            max_query_bytes: config.max_query_bytes,
            buffer_size: config.buffer_size,
        });

        let queue = Arc::new(ArrayQueue::new(config.max_workers));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers = (0..config.max_workers)
            .map(|_| spawn_worker(Arc::clone(&queue), Arc::clone(&ctx), shutdown_rx.clone()))
            .collect();

        Ok(Self {
            listener,
            local_addr,
            queue,
            workers,
            metrics,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            config,
        })
    }

    /// Address the server is actually listening on; useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Live counters for this instance.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// A handle that stops the serve loop from anywhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Accepts connections until shutdown is triggered, then drains.
    pub async fn serve(self) -> io::Result<()> {
        let Server {
            listener,
            local_addr,
            queue,
            workers,
            metrics,
            shutdown_tx: _shutdown_tx,
            mut shutdown_rx,
            config,
        } = self;

        info!(
            addr = %local_addr,
            mode = if config.reread_on_query { "reread" } else { "indexed" },
            tls = config.tls_enabled,
            workers = config.max_workers,
            "listening"
        );

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => admit(&queue, &metrics, stream, peer),
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                },
                _ = shutdown_rx.changed() => break,
            }
        }

        // Stop accepting before waiting out in-flight requests. Workers
        // drain whatever is still queued, then observe the shutdown flag.
        drop(listener);
        info!(grace = ?config.shutdown_grace, "draining in-flight connections");

        let aborts: Vec<_> = workers.iter().map(|worker| worker.abort_handle()).collect();
        let drained = time::timeout(config.shutdown_grace, async {
            for worker in workers {
                let _ = worker.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!("shutdown grace expired; aborting remaining workers");
            for abort in aborts {
                abort.abort();
            }
        }

        info!("shutdown complete");
        Ok(())
    }
}

fn admit(
    queue: &ArrayQueue<Admitted>,
    metrics: &Metrics,
    stream: TcpStream,
    peer: SocketAddr,
) {
    Metrics::incr(&metrics.accepted_connections);

    // Dropping the stream closes the socket immediately, with no response
    // and no rate-limit effect.
    if let Err((stream, peer, _)) = queue.push((stream, peer, Instant::now())) {
        Metrics::incr(&metrics.dropped_connections);
        debug!(%peer, "worker pool saturated; connection dropped");
        drop(stream);
    }
}

fn spawn_worker(
    queue: Arc<ArrayQueue<Admitted>>,
    ctx: Arc<ConnectionContext>,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some((stream, peer, accepted_at)) = next_connection(&queue, &shutdown_rx).await
            else {
                break;
            };

            // One task per connection so a panicking handler cannot take
            // the worker down with it.
            let task = tokio::spawn(Arc::clone(&ctx).handle(stream, peer, accepted_at));
            if let Err(err) = task.await {
                if err.is_panic() {
                    Metrics::incr(&ctx.metrics.request_errors);
                    error!(%peer, "connection handler panicked");
                }
            }
        }
    })
}

/// Pops the next admitted connection, draining the queue before honoring
/// the shutdown flag.
async fn next_connection(
    queue: &ArrayQueue<Admitted>,
    shutdown_rx: &watch::Receiver<bool>,
) -> Option<Admitted> {
    loop {
        if let Some(admitted) = queue.pop() {
            return Some(admitted);
        }
        if *shutdown_rx.borrow() {
            return None;
        }
        time::sleep(WORKER_POLL_INTERVAL).await;
    }
}

/// Clonable trigger for graceful shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Stops the accept loop; in-flight requests get the grace period.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}
