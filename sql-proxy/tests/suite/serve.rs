use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use portal_sql_proxy::HandlerError;
use portal_sql_proxy::Listener;
use portal_sql_proxy::ProxyError;
use portal_sql_proxy::serve;
use pretty_assertions::assert_eq;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::DuplexStream;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::task::JoinSet;

use super::echo_upstream;
use super::read_startup;
use super::round_trip;
use super::spawn_proxy;
use super::ssl_request;
use super::startup_packet;
use super::upstream_config;

const DEADLINE: Duration = Duration::from_secs(5);

/// Listener whose accepts always fail, counting attempts.
#[derive(Default)]
struct BrokenListener {
    accepts: Arc<AtomicUsize>,
}

#[async_trait]
impl Listener for BrokenListener {
    type Conn = DuplexStream;

    async fn accept(&mut self) -> io::Result<(Self::Conn, String)> {
        self.accepts.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::other("listener closed"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn relays_concurrent_clients_to_upstream() -> anyhow::Result<()> {
    let upstream = echo_upstream().await?;
    let (proxy, _task) = spawn_proxy(upstream_config("mysql", upstream)).await?;

    let mut clients = JoinSet::new();
    for i in 0..8 {
        clients.spawn(async move {
            let payload = format!("client-{i}").into_bytes();
            let echoed = round_trip(proxy, &payload).await?;
            io::Result::Ok((payload, echoed))
        });
    }

    let mut finished = 0;
    while let Some(result) = tokio::time::timeout(DEADLINE, clients.join_next()).await? {
        let (payload, echoed) = result??;
        assert_eq!(echoed, payload);
        finished += 1;
    }
    assert_eq!(finished, 8);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_unix_listener() -> anyhow::Result<()> {
    let upstream = echo_upstream().await?;
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("proxy.sock");
    let listener = UnixListener::bind(&socket)?;
    tokio::spawn(serve(listener, upstream_config("mysql", upstream)));

    let mut stream = UnixStream::connect(&socket).await?;
    stream.write_all(b"over unix").await?;
    let mut echoed = [0u8; 9];
    tokio::time::timeout(DEADLINE, stream.read_exact(&mut echoed)).await??;

    assert_eq!(&echoed, b"over unix");
    Ok(())
}

#[tokio::test]
async fn accept_failure_ends_serve() {
    let listener = BrokenListener::default();
    let accepts = Arc::clone(&listener.accepts);

    let err = serve(listener, upstream_config("mysql", "127.0.0.1:1".parse().unwrap())).await;

    assert!(matches!(err, ProxyError::Accept(_)), "unexpected error: {err:?}");
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_failure_stops_before_accepting() {
    let listener = BrokenListener::default();
    let accepts = Arc::clone(&listener.accepts);
    let mut config = upstream_config("mysql", "127.0.0.1:1".parse().unwrap());
    config.rds_iam = true;

    let err = serve(listener, config).await;

    assert!(
        matches!(err, ProxyError::Handler(HandlerError::RdsIamWithoutRegion)),
        "unexpected error: {err:?}"
    );
    assert_eq!(accepts.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_upstream_only_closes_that_client() -> anyhow::Result<()> {
    let unused = TcpListener::bind("127.0.0.1:0").await?;
    let dead_upstream = unused.local_addr()?;
    drop(unused);
    let (proxy, task) = spawn_proxy(upstream_config("mysql", dead_upstream)).await?;

    for _ in 0..2 {
        let mut stream = TcpStream::connect(proxy).await?;
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(DEADLINE, stream.read(&mut buf)).await?;
        assert!(matches!(read, Ok(0) | Err(_)), "unexpected read: {read:?}");
    }
    assert!(!task.is_finished());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn postgres_declines_client_tls_and_forwards_startup() -> anyhow::Result<()> {
    let upstream = TcpListener::bind("127.0.0.1:0").await?;
    let upstream_addr = upstream.local_addr()?;
    let upstream_task = tokio::spawn(async move {
        let (mut stream, _) = upstream.accept().await?;
        let startup = read_startup(&mut stream).await?;
        stream.write_all(b"welcome").await?;
        io::Result::Ok(startup)
    });
    let (proxy, _task) = spawn_proxy(upstream_config("postgres", upstream_addr)).await?;

    let mut client = TcpStream::connect(proxy).await?;
    client.write_all(&ssl_request()).await?;
    let reply = tokio::time::timeout(DEADLINE, client.read_u8()).await??;
    assert_eq!(reply, b'N');

    client.write_all(&startup_packet("app")).await?;
    let mut welcome = [0u8; 7];
    tokio::time::timeout(DEADLINE, client.read_exact(&mut welcome)).await??;

    assert_eq!(&welcome, b"welcome");
    assert_eq!(upstream_task.await??, startup_packet("app"));
    Ok(())
}
