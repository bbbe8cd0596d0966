//! linegate - High-performance TCP line-membership query server
//!
//! Answers one question very quickly: does a given string appear as a full
//! line in a configured text file? Clients open a TCP connection (optionally
//! TLS), send one query terminated by `\n`, and receive a single response
//! line: `STRING EXISTS`, `STRING NOT FOUND`, `RATE LIMIT EXCEEDED`, or
//! `ERROR`.
//!
//! # Operating modes
//!
//! - **Indexed** (default): the data file is read once at startup into an
//!   in-memory membership set; lookups are O(1) and results are cached in a
//!   bounded LRU. External edits to the file are not observed.
//! - **Reread** (`reread_on_query=true`): every query streams the file from
//!   the beginning, so edits are observed immediately. The cache is
//!   disabled in this mode.
//!
//! # Features
//!
//! - **Byte-exact matching** - queries are opaque bytes; no partial,
//!   substring, or case-insensitive matching, and non-UTF-8 lines match.
//! - **Admission control** - a fixed worker pool of `max_workers`; excess
//!   connections are closed at accept time.
//! - **Per-IP rate limiting** - sliding 60-second window over accepted
//!   requests.
//! - **Optional TLS** - rustls with PEM cert/key material, TLS 1.2+.
//! - **Local fault recovery** - per-request failures close one connection;
//!   only startup errors are fatal.
//!
//! # Quick Start
//!
//! ```no_run
//! use linegate::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = Config::default();
//!     config.data_path = "/var/lib/linegate/data.txt".into();
//!
//!     let server = Server::bind(config).expect("startup failed");
//!     server.serve().await.expect("runtime failure");
//! }
//! ```
//!
//! Querying it is one line of netcat:
//!
//! ```text
//! $ printf 'hello world\n' | nc 127.0.0.1 44445
//! STRING EXISTS
//! ```
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod listener;
    pub(crate) mod server_impl;
}
pub(crate) mod cache;
pub mod config;
pub(crate) mod errors;
pub(crate) mod index;
pub(crate) mod metrics;
pub(crate) mod protocol;
pub(crate) mod ratelimit;
pub(crate) mod source;

pub use crate::{
    config::Config,
    errors::StartupError,
    metrics::{Metrics, MetricsSnapshot},
    server::server_impl::{Server, ShutdownHandle},
};
