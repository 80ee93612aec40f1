//! Unauthenticated gateway relay over real loopback sockets.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use remote_browser::gateway::relay::pipe;
use remote_browser::gateway::DebugPortGateway;
use remote_browser::AppError;

async fn echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut rd, mut wr) = stream.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    addr
}

async fn start_gateway(upstream: SocketAddr, ct: &CancellationToken) -> SocketAddr {
    let gateway = DebugPortGateway::bind_addr(
        "127.0.0.1:0".parse().expect("addr"),
        upstream,
        None,
    )
    .await
    .expect("gateway binds");
    let addr = gateway.local_addr().expect("gateway addr");
    let _task = gateway.spawn(ct.clone());
    addr
}

#[tokio::test]
async fn arbitrary_bytes_round_trip_unmodified() {
    let ct = CancellationToken::new();
    let gateway = start_gateway(echo_upstream().await, &ct).await;

    let payload: Vec<u8> = (0..=255_u8).cycle().take(64 * 1024).collect();
    let mut client = TcpStream::connect(gateway).await.expect("connect");
    let (mut rd, mut wr) = client.split();

    let expected = payload.clone();
    let writer = async move {
        wr.write_all(&payload).await.expect("write");
    };
    let reader = async move {
        let mut received = vec![0_u8; expected.len()];
        rd.read_exact(&mut received).await.expect("read echo");
        assert_eq!(received, expected);
    };
    tokio::join!(writer, reader);

    ct.cancel();
}

#[tokio::test]
async fn upstream_bytes_reach_client_first() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let upstream_addr = upstream.local_addr().expect("addr");
    let (seen_tx, mut seen_rx) = mpsc::channel::<Vec<u8>>(1);
    tokio::spawn(async move {
        let (mut stream, _) = upstream.accept().await.expect("accept");
        stream.write_all(b"\x00hello\xff").await.expect("greet");
        let mut buf = [0_u8; 5];
        stream.read_exact(&mut buf).await.expect("read client");
        seen_tx.send(buf.to_vec()).await.expect("report");
    });

    let ct = CancellationToken::new();
    let gateway = start_gateway(upstream_addr, &ct).await;
    let mut client = TcpStream::connect(gateway).await.expect("connect");

    let mut greeting = [0_u8; 7];
    client.read_exact(&mut greeting).await.expect("greeting");
    assert_eq!(&greeting, b"\x00hello\xff");

    client.write_all(b"world").await.expect("write");
    let seen = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .expect("upstream saw bytes")
        .expect("channel open");
    assert_eq!(seen, b"world");

    ct.cancel();
}

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    let ct = CancellationToken::new();
    let gateway = start_gateway(echo_upstream().await, &ct).await;

    let mut tasks = Vec::new();
    for i in 0..8_u8 {
        tasks.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(gateway).await.expect("connect");
            let msg = vec![i; 1024];
            client.write_all(&msg).await.expect("write");
            let mut back = vec![0_u8; msg.len()];
            client.read_exact(&mut back).await.expect("read");
            assert_eq!(back, msg);
        }));
    }
    for task in tasks {
        task.await.expect("session task");
    }

    ct.cancel();
}

#[tokio::test]
async fn client_is_closed_when_upstream_unreachable() {
    // Reserve a port, then free it so nothing listens there.
    let dead = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let dead_addr = dead.local_addr().expect("addr");
    drop(dead);

    let ct = CancellationToken::new();
    let gateway = start_gateway(dead_addr, &ct).await;
    let mut client = TcpStream::connect(gateway).await.expect("connect");

    let mut buf = [0_u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .expect("gateway closes promptly")
        .unwrap_or(0);
    assert_eq!(n, 0);

    ct.cancel();
}

#[tokio::test]
async fn occupied_port_is_a_bind_error() {
    let taken = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = taken.local_addr().expect("addr");

    let result = DebugPortGateway::bind_addr(addr, addr, None).await;
    assert!(matches!(result, Err(AppError::Bind(_))));
}

#[tokio::test]
async fn pipe_writes_preamble_before_relaying() {
    let (mut client_side, mut client) = tokio::io::duplex(1024);
    let (mut upstream_side, mut upstream) = tokio::io::duplex(1024);

    let relay = tokio::spawn(async move { pipe(&mut client, &mut upstream, b"GET / ").await });

    client_side.write_all(b"HTTP/1.1\r\n").await.expect("write");
    let mut buf = vec![0_u8; 16];
    upstream_side.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"GET / HTTP/1.1\r\n");

    upstream_side.write_all(b"ok").await.expect("reply");
    let mut reply = [0_u8; 2];
    client_side.read_exact(&mut reply).await.expect("reply arrives");
    assert_eq!(&reply, b"ok");

    drop(client_side);
    drop(upstream_side);
    let stats = relay.await.expect("join").expect("relay ok");
    assert_eq!(stats.to_upstream, 16);
    assert_eq!(stats.to_client, 2);
}
