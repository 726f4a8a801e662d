mod common;

use common::*;
use course_pay::domain::account::Role;
use course_pay::domain::id::UserId;
use course_pay::domain::payment::SettleOutcome;
use futures::StreamExt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

async fn connect(app: &TestApp, addr: SocketAddr, user: UserId, role: Role) -> Client {
    let token = app.token(user, role);
    let (socket, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .unwrap();
    // Registration happens in the server task after the handshake.
    eventually(|| app.state.registry.is_connected(user)).await;
    socket
}

async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

async fn next_frame(socket: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("no frame within 2s")
        .expect("stream ended")
        .expect("socket error")
}

// ── 1. connect_registers_and_receives_pushes ──────────────────────────────

#[tokio::test]
async fn connect_registers_and_receives_pushes() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    let mut socket = connect(&app, addr, PROVIDER, Role::Nutri).await;
    assert!(app.state.registry.is_connected(PROVIDER));

    let payment = app.state.ledger.create_pending(CLIENT, course()).await.unwrap();
    app.state
        .ledger
        .settle(payment.id(), SettleOutcome::Paid, None)
        .await
        .unwrap();

    let frame = next_frame(&mut socket).await;
    let value: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(value["type"], "notification");
    assert_eq!(value["data"]["user_id"], PROVIDER.get());
    assert_eq!(value["data"]["type"], "payment");
}

// ── 2. second_connection_closes_the_first ─────────────────────────────────

#[tokio::test]
async fn second_connection_closes_the_first() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    let mut first = connect(&app, addr, PROVIDER, Role::Nutri).await;
    // The first socket's Close frame proves the second one has registered.
    let mut second = connect(&app, addr, PROVIDER, Role::Nutri).await;

    assert!(matches!(next_frame(&mut first).await, Message::Close(_)));
    assert_eq!(app.state.registry.len(), 1);

    let payment = app.state.ledger.create_pending(CLIENT, course()).await.unwrap();
    app.state
        .ledger
        .settle(payment.id(), SettleOutcome::Paid, None)
        .await
        .unwrap();

    let frame = next_frame(&mut second).await;
    assert!(frame.to_text().unwrap().contains(r#""type":"notification""#));
    assert!(app.state.registry.is_connected(PROVIDER));
}

// ── 3. disconnect_unregisters ─────────────────────────────────────────────

#[tokio::test]
async fn disconnect_unregisters() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    let socket = connect(&app, addr, CLIENT, Role::Client).await;
    assert!(app.state.registry.is_connected(CLIENT));

    drop(socket);
    eventually(|| !app.state.registry.is_connected(CLIENT)).await;
    assert!(app.state.registry.is_empty());
}

// ── 4. bad_token_never_upgrades ───────────────────────────────────────────

#[tokio::test]
async fn bad_token_never_upgrades() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    let err = connect_async(format!("ws://{addr}/ws?token=nope"))
        .await
        .unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected http rejection, got {other:?}"),
    }
    assert!(app.state.registry.is_empty());
}
