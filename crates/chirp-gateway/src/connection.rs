use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use chirp_types::events::{ChatCommand, ChatEvent};

use crate::engine::{ChatEngine, Outcome};
use crate::session::Session;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive an admitted chat socket until either side goes away.
///
/// The handshake has already bound `user_id`; no command handler runs
/// before this point.
pub async fn handle_connection(socket: WebSocket, engine: ChatEngine, user_id: Uuid) {
    let (mut sender, receiver) = socket.split();

    let (session, events) = engine.connect(user_id).await;

    if send_event(&mut sender, &ChatEvent::Ready { user_id }).await.is_err() {
        engine.disconnect(&session).await;
        return;
    }

    run_connection_loop(sender, receiver, events, engine, session).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut events: mpsc::UnboundedReceiver<ChatEvent>,
    engine: ChatEngine,
    session: Session,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client, one at a time in arrival order. Shutdown
    // is only observed between frames, never while a command is handled.
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let recv_engine = engine.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = &mut shutdown_rx => break,
                frame = receiver.next() => frame,
            };
            let Some(Ok(msg)) = frame else { break };

            match msg {
                Message::Text(text) => match serde_json::from_str::<ChatCommand>(&text) {
                    Ok(cmd) => dispatch_command(&recv_engine, &session, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            session.user_id(),
                            session.conn_id(),
                            e,
                            truncate(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    let send_finished = tokio::select! {
        _ = &mut send_task => true,
        _ = &mut recv_task => false,
    };

    if send_finished {
        // Let the command in progress complete before releasing rooms
        let _ = shutdown_tx.send(());
        if let Err(e) = recv_task.await {
            warn!("{} ({}) receive task failed: {}", session.user_id(), session.conn_id(), e);
        }
    } else {
        send_task.abort();
    }

    engine.disconnect(&session).await;
}

/// Run one command through the engine. Failures stay on this connection:
/// they are logged and, for a failed write, reported back as an error frame.
async fn dispatch_command(engine: &ChatEngine, session: &Session, cmd: ChatCommand) {
    let name = cmd.name();
    match engine.handle(session, cmd).await {
        Ok(Outcome::Dropped(_)) => {}
        Ok(outcome) => debug!(
            "{} ({}) '{}' handled: {:?}",
            session.user_id(),
            session.conn_id(),
            name,
            outcome
        ),
        Err(e) => {
            warn!(
                "{} ({}) '{}' failed: {:#}",
                session.user_id(),
                session.conn_id(),
                name,
                e
            );
            engine
                .dispatcher()
                .send_to(
                    session.conn_id(),
                    ChatEvent::Error {
                        code: e.code().to_string(),
                    },
                )
                .await;
        }
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ChatEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode chat event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
