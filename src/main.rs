use clap::Parser;
use linegate::{Config, Server, StartupError};
use std::{path::PathBuf, process::ExitCode};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exact full-line membership queries over TCP.
///
/// Flags override environment variables (`LINEGATE_*`), which override the
/// configuration file, which overrides built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "linegate", version, about)]
struct Args {
    /// Path to an INI-style configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// File whose lines form the membership set.
    #[arg(long, value_name = "PATH")]
    data_path: Option<PathBuf>,

    /// Re-scan the data file on every query instead of indexing at startup.
    #[arg(long, value_name = "BOOL")]
    reread_on_query: Option<bool>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Kernel listen backlog.
    #[arg(long)]
    backlog: Option<u32>,

    /// Concurrent connection cap; excess connections are dropped at accept.
    #[arg(long)]
    max_workers: Option<usize>,

    /// LRU cache entries; 0 disables the cache.
    #[arg(long)]
    cache_capacity: Option<usize>,

    /// Read buffer size in bytes for sockets and file scans.
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Hard upper bound in bytes on one request line.
    #[arg(long)]
    max_query_bytes: Option<usize>,

    #[arg(long, value_name = "BOOL")]
    tls_enabled: Option<bool>,

    /// PEM certificate chain.
    #[arg(long, value_name = "PATH")]
    tls_cert: Option<PathBuf>,

    /// PEM private key.
    #[arg(long, value_name = "PATH")]
    tls_key: Option<PathBuf>,

    #[arg(long, value_name = "BOOL")]
    rate_limit_enabled: Option<bool>,

    /// Per-IP budget inside a sliding 60-second window.
    #[arg(long)]
    requests_per_minute: Option<u32>,

    /// Seconds allowed for reading one request, measured from accept.
    #[arg(long, value_name = "SECONDS")]
    read_timeout: Option<u64>,

    /// Seconds allowed for writing the response.
    #[arg(long, value_name = "SECONDS")]
    write_timeout: Option<u64>,

    /// Seconds shutdown waits for in-flight requests.
    #[arg(long, value_name = "SECONDS")]
    shutdown_grace: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<Config, StartupError> {
        let mut config = Config::load(self.config.as_deref())?;

        macro_rules! apply {
            ($($field:ident => $write:expr;)*) => {
                $(if let Some($field) = self.$field {
                    $write;
                })*
            };
        }

        apply! {
            data_path => config.data_path = data_path;
            reread_on_query => config.reread_on_query = reread_on_query;
            host => config.host = host;
            port => config.port = port;
            backlog => config.backlog = backlog;
            max_workers => config.max_workers = max_workers;
            cache_capacity => config.cache_capacity = cache_capacity;
            buffer_size => config.buffer_size = buffer_size;
            max_query_bytes => config.max_query_bytes = max_query_bytes;
            tls_enabled => config.tls_enabled = tls_enabled;
            tls_cert => config.tls_cert = Some(tls_cert);
            tls_key => config.tls_key = Some(tls_key);
            rate_limit_enabled => config.rate_limit_enabled = rate_limit_enabled;
            requests_per_minute => config.requests_per_minute = requests_per_minute;
            read_timeout => config.read_timeout = std::time::Duration::from_secs(read_timeout);
            write_timeout => config.write_timeout = std::time::Duration::from_secs(write_timeout);
            shutdown_grace => config.shutdown_grace = std::time::Duration::from_secs(shutdown_grace);
        }

        Ok(config)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
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
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(1);
        }
    };

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(1);
        }
    };

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        shutdown.trigger();
    });

    match server.serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("fatal runtime failure: {err}");
            ExitCode::from(2)
        }
    }
}
