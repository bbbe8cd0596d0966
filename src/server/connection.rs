//! Per-connection request handling.
//!
//! One request per connection: read bytes until the first `\n` (bounded by
//! `max_query_bytes` and the read deadline), consult the rate limiter, then
//! the cache and data source, write one response line, half-close, drop.
//! Every failure is recovered locally; a connection can never take the
//! server down.

use crate::{
    cache::LookupCache,
    errors::RequestError,
    metrics::Metrics,
    protocol,
    ratelimit::RateLimiter,
    source::{scan_file, DataSource},
};
use memchr::memchr;
use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    task,
    time::{sleep, sleep_until, Instant},
};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

/// Shared state a worker needs to serve one connection.
pub(crate) struct ConnectionContext {
    pub(crate) source: DataSource,
    pub(crate) cache: LookupCache,
    pub(crate) limiter: RateLimiter,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) tls: Option<TlsAcceptor>,
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) max_query_bytes: usize,
    pub(crate) buffer_size: usize,
}

impl ConnectionContext {
    /// Serves one connection end to end.
    ///
    /// The read deadline starts at accept, so time spent queued and in the
    /// TLS handshake counts against it. Handshake failures close the socket
    /// without touching the rate limiter.
    pub(crate) async fn handle(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        accepted_at: Instant,
    ) {
        let _ = stream.set_nodelay(true);
        let deadline = accepted_at + self.read_timeout;

        match self.tls.clone() {
            Some(acceptor) => {
                let handshake = tokio::select! {
                    biased;

                    result = acceptor.accept(stream) => result,
                    _ = sleep_until(deadline) => {
                        Metrics::incr(&self.metrics.tls_handshake_failures);
                        debug!(%peer, "TLS handshake timed out");
                        return;
                    }
                };

                match handshake {
                    Ok(mut stream) => self.serve(&mut stream, peer, deadline).await,
                    Err(err) => {
                        Metrics::incr(&self.metrics.tls_handshake_failures);
                        debug!(%peer, error = %err, "TLS handshake failed");
                    }
                }
            }
            None => {
                let mut stream = stream;
                self.serve(&mut stream, peer, deadline).await;
            }
        }
    }

    async fn serve<S>(&self, stream: &mut S, peer: SocketAddr, deadline: Instant)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(err) = self.run(stream, peer, deadline).await {
            match &err {
                RequestError::RateLimited => Metrics::incr(&self.metrics.rate_limited),
                RequestError::Io(io_err) => {
                    Metrics::incr(&self.metrics.request_errors);
                    warn!(%peer, error = %io_err.0, "request failed");
                }
                _ => {
                    Metrics::incr(&self.metrics.request_errors);
                    debug!(%peer, error = %err, "request aborted");
                }
            }

            if let Some(response) = err.response() {
                let _ = self.write(stream, response).await;
            }
        }

        // Half-close the write side so the client sees a clean EOF, then
        // drop the connection.
        let _ = stream.shutdown().await;
    }

    async fn run<S>(
        &self,
        stream: &mut S,
        peer: SocketAddr,
        deadline: Instant,
    ) -> Result<(), RequestError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = Vec::with_capacity(self.buffer_size);
        let len = self.read_query(stream, &mut buf, deadline).await?;
        let query = protocol::trim_cr(&buf[..len]);

        Metrics::incr(&self.metrics.queries);
        match protocol::printable(query) {
            Some(text) => debug!(%peer, query = text, "query received"),
            None => debug!(%peer, len = query.len(), "binary query received"),
        }

        // Rate limiting counts requests that completed the read phase, not
        // connection attempts.
        if !self.limiter.check(peer.ip()) {
            return Err(RequestError::RateLimited);
        }

        let found = self.lookup(query).await?;
        self.write(stream, protocol::membership_response(found)).await
    }

    /// Reads until the first `\n` and returns the query length before it.
    async fn read_query<S>(
        &self,
        stream: &mut S,
        buf: &mut Vec<u8>,
        deadline: Instant,
    ) -> Result<usize, RequestError>
    where
        S: AsyncRead + Unpin,
    {
        let mut scanned = 0;

        loop {
            if let Some(pos) = memchr(b'\n', &buf[scanned..]) {
                let len = scanned + pos;
                if len > self.max_query_bytes {
                    return Err(RequestError::Oversize);
                }
                return Ok(len);
            }

            scanned = buf.len();
            if scanned > self.max_query_bytes {
                return Err(RequestError::Oversize);
            }

            let read = tokio::select! {
                biased;

                result = stream.read_buf(buf) => result?,
                _ = sleep_until(deadline) => return Err(RequestError::Timeout),
            };

            if read == 0 {
                return Err(RequestError::Closed);
            }
        }
    }

    async fn lookup(&self, query: &[u8]) -> Result<bool, RequestError> {
        // The cache is only ever enabled over the immutable index, so a
        // cached value cannot go stale.
        if self.cache.is_enabled() {
            if let Some(found) = self.cache.get(query) {
                Metrics::incr(&self.metrics.cache_hits);
                return Ok(found);
            }

            Metrics::incr(&self.metrics.cache_misses);
            let found = self.source.contains(query)?;
            self.cache.put(query, found);
            return Ok(found);
        }

        match &self.source {
            DataSource::Indexed(_) => Ok(self.source.contains(query)?),
            DataSource::Reread { path, buffer_size } => {
                // The scan is blocking file I/O; keep it off the runtime
                // workers.
                let path = path.clone();
                let buffer_size = *buffer_size;
                let query = query.to_vec();

                let found = task::spawn_blocking(move || scan_file(&path, buffer_size, &query))
                    .await
                    .map_err(|err| io::Error::new(io::ErrorKind::Other, err))??;
                Ok(found)
            }
        }
    }

    async fn write<S>(&self, stream: &mut S, response: &'static [u8]) -> Result<(), RequestError>
    where
        S: AsyncWrite + Unpin,
    {
        tokio::select! {
            biased;

            result = stream.write_all(response) => Ok(result?),
            _ = sleep(self.write_timeout) => Err(RequestError::Timeout),
        }
    }
}
