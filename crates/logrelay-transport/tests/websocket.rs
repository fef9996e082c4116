use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use logrelay_core::{Level, RelayConfig, RelayCore, SessionKey};
use logrelay_transport::create_router;
use serde_json::{Value as Json, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

async fn start_relay(config: RelayConfig) -> (Arc<RelayCore>, SocketAddr) {
    let relay = Arc::new(RelayCore::new(config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(Arc::clone(&relay));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (relay, addr)
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, message: Json) {
    socket.send(Message::text(message.to_string())).await.unwrap();
}

/// Next text frame as JSON, skipping control frames.
async fn recv(socket: &mut Socket) -> Json {
    loop {
        let frame = timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for a frame");
        match frame {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn register(socket: &mut Socket, key: &str) -> Json {
    send(socket, json!({"action": "register", "key": key})).await;
    let reply = recv(socket).await;
    assert_eq!(reply["type"], "registered");
    reply
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn log(relay: &RelayCore, key: &str, text: &str) {
    relay.ingest(&SessionKey::new(key).unwrap(), Level::Info, vec![text.into()], Some(1));
}

#[tokio::test]
async fn register_replays_history_then_streams() {
    let (relay, addr) = start_relay(RelayConfig::default()).await;
    log(&relay, "app", "e1");
    log(&relay, "app", "e2");

    let mut socket = connect(addr).await;
    let reply = register(&mut socket, "app").await;
    assert_eq!(reply["key"], "app");
    let formatted: Vec<&str> = reply["bufferedLogs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["formatted"].as_str().unwrap())
        .collect();
    assert_eq!(formatted, ["e1", "e2"]);

    log(&relay, "app", "e3");
    log(&relay, "other", "noise");
    let live = recv(&mut socket).await;
    assert_eq!(
        live,
        json!({"type": "log", "level": "info", "data": ["e3"], "timestamp": 1, "formatted": "e3"})
    );
}

#[tokio::test]
async fn rejected_messages_leave_socket_open() {
    let (_relay, addr) = start_relay(RelayConfig::default()).await;
    let mut socket = connect(addr).await;

    send(&mut socket, json!({"action": "dance", "key": "app"})).await;
    assert_eq!(
        recv(&mut socket).await,
        json!({"type": "error", "error": "Unknown action: dance"})
    );

    socket.send(Message::text("not json")).await.unwrap();
    assert_eq!(recv(&mut socket).await["error"], "Invalid message format");

    send(&mut socket, json!({"action": "register"})).await;
    assert_eq!(recv(&mut socket).await["error"], "Key is required");

    register(&mut socket, "app").await;
}

#[tokio::test]
async fn clear_notifies_every_subscriber() {
    let (relay, addr) = start_relay(RelayConfig::default()).await;
    log(&relay, "app", "old");

    let mut first = connect(addr).await;
    let mut second = connect(addr).await;
    register(&mut first, "app").await;
    register(&mut second, "app").await;

    send(&mut first, json!({"action": "clear", "key": "app"})).await;
    assert_eq!(recv(&mut first).await, json!({"type": "cleared"}));
    assert_eq!(recv(&mut second).await, json!({"type": "cleared"}));
    assert!(relay.buffer().snapshot("app").is_empty());
    assert!(relay.buffer().has("app"));
}

#[tokio::test]
async fn closing_socket_unsubscribes() {
    let (relay, addr) = start_relay(RelayConfig::default()).await;
    let mut staying = connect(addr).await;
    let mut leaving = connect(addr).await;
    register(&mut staying, "app").await;
    register(&mut leaving, "app").await;
    assert_eq!(relay.registry().count_for("app"), 2);

    leaving.close(None).await.unwrap();
    wait_until(|| relay.registry().count_for("app") == 1).await;

    log(&relay, "app", "after");
    assert_eq!(recv(&mut staying).await["formatted"], "after");
}

#[tokio::test]
async fn evicted_subscriber_is_disconnected() {
    let (relay, addr) = start_relay(RelayConfig {
        buffer_capacity: 100,
        subscriber_queue: 1,
    })
    .await;
    let mut socket = connect(addr).await;
    register(&mut socket, "app").await;

    // The runtime is single-threaded, so nothing drains the queue during
    // this burst and the second event overflows it.
    for i in 0..5 {
        log(&relay, "app", &format!("burst {i}"));
    }
    assert_eq!(relay.registry().count_for("app"), 0);
    assert!(relay.stats().delivery_failures >= 1);

    let closed = timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket stayed open after eviction");
    assert_eq!(relay.buffer().count("app"), 5);
}
