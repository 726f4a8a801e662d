use {
    super::{api_errors::ApiError, extract::ApiQuery},
    crate::{
        AppState,
        domain::error::PipelineError,
        services::registry::{PushFrame, PushReceiver},
    },
    axum::{
        body::Bytes,
        extract::{
            State, WebSocketUpgrade,
            ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
        },
        response::{IntoResponse, Response},
    },
    futures::{SinkExt, StreamExt},
    serde::Deserialize,
    std::{sync::Arc, time::Duration},
    tokio::time::{Instant, MissedTickBehavior, interval_at, timeout},
};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Push endpoint. The token is checked before the upgrade; a bad token never
/// gets a socket.
pub async fn push_socket(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user = match query.token.filter(|t| !t.is_empty()) {
        Some(token) => state.auth.verify(&token),
        None => Err(PipelineError::Unauthorized("missing token".into())),
    };
    let user = match user {
        Ok(user) => user,
        Err(e) => return ApiError(e).into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let registry = Arc::clone(&state.registry);
    ws.on_upgrade(move |socket| async move {
        let (channel, rx) = registry.open_channel();
        let connection = channel.id();
        registry.register(user.id, channel);
        tracing::info!(user_id = %user.id, %connection, "push connection opened");

        run_connection(socket, rx).await;

        let removed = registry.unregister(user.id, connection);
        tracing::info!(user_id = %user.id, %connection, removed, "push connection closed");
    })
}

/// Bound on a single frame write; a peer that stops reading is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
/// No inbound frame (pongs included) for this long closes the connection.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Drives one socket: drains the outbound queue, keeps the peer alive with
/// pings and watches the inbound side only to notice disconnects.
async fn run_connection(socket: WebSocket, mut rx: PushReceiver) {
    let (mut sink, mut stream) = socket.split();
    let eviction = rx.eviction();

    let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let idle = tokio::time::sleep(IDLE_TIMEOUT);
    tokio::pin!(idle);

    loop {
        let outbound = tokio::select! {
            frame = rx.recv() => match frame {
                Some(PushFrame::Text(payload)) => Message::Text(payload.into()),
                Some(PushFrame::Close) | None => break,
            },
            () = eviction.wait() => break,
            _ = ping.tick() => Message::Ping(Bytes::new()),
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {
                    idle.as_mut().reset(Instant::now() + IDLE_TIMEOUT);
                    continue;
                }
            },
            () = &mut idle => {
                tracing::info!("push connection idle, closing");
                break;
            }
        };

        tokio::select! {
            sent = timeout(WRITE_TIMEOUT, sink.send(outbound)) => match sent {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "push write failed");
                    return;
                }
                Err(_) => {
                    tracing::warn!("push write timed out, dropping connection");
                    return;
                }
            },
            () = eviction.wait() => return,
        }
    }

    let _ = timeout(WRITE_TIMEOUT, sink.send(Message::Close(None))).await;
}
