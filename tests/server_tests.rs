//! End-to-end tests over real sockets.
//!
//! Each test starts its own server on an ephemeral port with its own data
//! file, speaks the wire protocol with plain TCP clients, and checks the
//! exact response bytes.

use linegate::{Config, Metrics, Server, ShutdownHandle};
use std::{io::Write, net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tempfile::NamedTempFile;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    task::JoinHandle,
    time::{sleep, timeout},
};

const DATA: &[u8] = b"7;0;6;28;0;23;5;0;\n1;0;6;16;0;19;3;0;\nhello world\n";

fn data_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file
}

fn test_config(data_path: &Path) -> Config {
    let mut config = Config::default();
    config.data_path = data_path.to_path_buf();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.max_workers = 4;
    config.rate_limit_enabled = false;
    config
}

struct TestServer {
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    shutdown: ShutdownHandle,
    serve: JoinHandle<std::io::Result<()>>,
}

fn start(config: Config) -> TestServer {
    let server = Server::bind(config).unwrap();
    TestServer {
        addr: server.local_addr(),
        metrics: server.metrics(),
        shutdown: server.shutdown_handle(),
        serve: tokio::spawn(server.serve()),
    }
}

async fn query(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn indexed_membership_over_the_wire() {
    let file = data_file(DATA);
    let server = start(test_config(file.path()));

    #[rustfmt::skip]
    let cases: [(&[u8], &[u8]); 7] = [
        (b"7;0;6;28;0;23;5;0;\n",   b"STRING EXISTS\n"),
        (b"1;0;6;16;0;19;3;0;\n",   b"STRING EXISTS\n"),
        (b"hello world\n",          b"STRING EXISTS\n"),
        (b"hello world\r\n",        b"STRING EXISTS\n"),
        (b"hello worl\n",           b"STRING NOT FOUND\n"),
        (b"7;0;6;28;0;23;5;0;;\n",  b"STRING NOT FOUND\n"),
        (b"\n",                     b"STRING NOT FOUND\n"),
    ];

    for (request, expected) in cases {
        assert_eq!(query(server.addr, request).await, expected);
    }

    server.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_request_per_connection() {
    let file = data_file(DATA);
    let server = start(test_config(file.path()));

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"hello world\n").await.unwrap();

    // The server answers exactly once, then half-closes: after the response
    // line the client sees a clean EOF, never a second response.
    let mut response = [0u8; 14];
    stream.read_exact(&mut response).await.unwrap();
    assert_eq!(&response, b"STRING EXISTS\n");
    assert_eq!(stream.read(&mut [0u8; 8]).await.unwrap(), 0);

    server.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn indexed_mode_ignores_file_edits() {
    let file = data_file(DATA);
    let server = start(test_config(file.path()));

    assert_eq!(query(server.addr, b"hello world\n").await, b"STRING EXISTS\n");

    std::fs::write(file.path(), b"7;0;6;28;0;23;5;0;\n").unwrap();

    // Still answered from the startup snapshot.
    assert_eq!(query(server.addr, b"hello world\n").await, b"STRING EXISTS\n");

    server.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reread_mode_observes_file_edits() {
    let file = data_file(DATA);
    let mut config = test_config(file.path());
    config.reread_on_query = true;
    let server = start(config);

    assert_eq!(query(server.addr, b"hello world\n").await, b"STRING EXISTS\n");

    std::fs::write(file.path(), b"7;0;6;28;0;23;5;0;\n1;0;6;16;0;19;3;0;\n").unwrap();

    assert_eq!(
        query(server.addr, b"hello world\n").await,
        b"STRING NOT FOUND\n"
    );

    server.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_utf8_queries_round_trip() {
    let file = data_file(b"\xde\xad\xbe\xef\nhello world\n");
    let server = start(test_config(file.path()));

    assert_eq!(
        query(server.addr, b"\xde\xad\xbe\xef\n").await,
        b"STRING EXISTS\n"
    );
    assert_eq!(
        query(server.addr, b"\xde\xad\n").await,
        b"STRING NOT FOUND\n"
    );

    server.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rate_limit_kicks_in_after_budget() {
    let file = data_file(DATA);
    let mut config = test_config(file.path());
    config.rate_limit_enabled = true;
    config.requests_per_minute = 3;
    let server = start(config);

    for _ in 0..3 {
        assert_eq!(query(server.addr, b"hello world\n").await, b"STRING EXISTS\n");
    }
    assert_eq!(
        query(server.addr, b"hello world\n").await,
        b"RATE LIMIT EXCEEDED\n"
    );

    assert_eq!(server.metrics.snapshot().rate_limited, 1);
    server.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversize_query_is_rejected() {
    let file = data_file(DATA);
    let mut config = test_config(file.path());
    config.max_query_bytes = 64;
    let server = start(config);

    // One segment past the limit, no newline anywhere.
    let request = vec![b'x'; 100];
    assert_eq!(query(server.addr, &request).await, b"ERROR\n");

    server.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cache_agrees_with_cold_lookups() {
    let file = data_file(DATA);
    let server = start(test_config(file.path()));

    for _ in 0..2 {
        assert_eq!(query(server.addr, b"hello world\n").await, b"STRING EXISTS\n");
        assert_eq!(
            query(server.addr, b"not in the file\n").await,
            b"STRING NOT FOUND\n"
        );
    }

    let snapshot = server.metrics.snapshot();
    assert_eq!(snapshot.queries, 4);
    assert_eq!(snapshot.cache_misses, 2);
    assert_eq!(snapshot.cache_hits, 2);

    server.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn saturated_pool_drops_connections_at_accept() {
    let file = data_file(DATA);
    let mut config = test_config(file.path());
    config.max_workers = 1;
    config.read_timeout = Duration::from_secs(30);
    let server = start(config);

    // Occupy the only worker with a connection that never sends a newline.
    let busy = TcpStream::connect(server.addr).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    // Fill the one-slot handoff queue.
    let queued = TcpStream::connect(server.addr).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    // Beyond the admission cap: closed immediately, no response.
    let mut rejected = TcpStream::connect(server.addr).await.unwrap();
    let mut response = Vec::new();
    rejected.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"");
    assert_eq!(server.metrics.snapshot().dropped_connections, 1);

    drop(busy);
    drop(queued);
    server.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn graceful_shutdown_stops_accepting() {
    let file = data_file(DATA);
    let mut config = test_config(file.path());
    config.shutdown_grace = Duration::from_secs(2);
    let server = start(config);

    assert_eq!(query(server.addr, b"hello world\n").await, b"STRING EXISTS\n");

    server.shutdown.trigger();
    timeout(Duration::from_secs(10), server.serve)
        .await
        .expect("serve did not drain within the grace period")
        .unwrap()
        .unwrap();

    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_data_file_refuses_startup() {
    let config = test_config(Path::new("/nonexistent/linegate-data.txt"));

    assert!(Server::bind(config).is_err());
}
