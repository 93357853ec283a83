use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use folio_core::channels::Channel;
use folio_db::Database;
use folio_types::events::{GatewayCommand, RealtimeEvent};

use crate::access::authorize_channel;
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

type Subscriptions = Arc<RwLock<HashSet<Channel>>>;

/// Per-connection context shared by the read side.
struct Session {
    conn_id: Uuid,
    user_id: Uuid,
    username: String,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    subscriptions: Subscriptions,
    /// Direct replies to this connection only.
    reply: mpsc::UnboundedSender<RealtimeEvent>,
}

/// Serve a WebSocket whose bearer token was already validated at the
/// upgrade. The connection starts subscribed to the user's own channel.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, receiver) = socket.split();
    info!("{} ({}) connected to gateway", username, user_id);

    let ready = RealtimeEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    let own = Channel::for_user(user_id);
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::from([own])));
    let (reply, reply_rx) = mpsc::unbounded_channel();
    let _ = reply.send(RealtimeEvent::Subscribed {
        channel: own.to_string(),
    });

    let session = Arc::new(Session {
        conn_id: Uuid::new_v4(),
        user_id,
        username,
        dispatcher,
        db,
        subscriptions,
        reply,
    });

    run_connection_loop(sender, receiver, reply_rx, session.clone()).await;

    // Leave every presence room this connection was in.
    let rooms: Vec<Uuid> = match session.subscriptions.read() {
        Ok(subs) => subs
            .iter()
            .filter(|c| c.is_presence())
            .filter_map(|c| c.room_id())
            .collect(),
        Err(_) => Vec::new(),
    };
    for room_id in rooms {
        session
            .dispatcher
            .leave_room(room_id, session.conn_id, session.user_id)
            .await;
    }
    info!("{} ({}) disconnected from gateway", session.username, session.user_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut reply_rx: mpsc::UnboundedReceiver<RealtimeEvent>,
    session: Arc<Session>,
) {
    let mut broadcast_rx = session.dispatcher.subscribe();
    let send_subscriptions = session.subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward published events + direct replies -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let subscribed = send_subscriptions
                        .read()
                        .is_ok_and(|subs| subs.contains(&msg.channel));
                    if !subscribed {
                        continue;
                    }

                    if sender.send(Message::Text(msg.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                event = reply_rx.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_PONGS {
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

    // Read commands from client
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_session, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_session.username,
                            recv_session.user_id,
                            e,
                            text.chars().take(200).collect::<String>()
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

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_command(session: &Session, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Subscribe { channel: name } => {
            let channel = match name.parse::<Channel>() {
                Ok(channel) => channel,
                Err(e) => {
                    debug!("{} ({}) {}", session.username, session.user_id, e);
                    let _ = session.reply.send(RealtimeEvent::SubscriptionDenied { channel: name });
                    return;
                }
            };

            let allowed = match authorize_channel(&session.db, session.user_id, channel).await {
                Ok(allowed) => allowed,
                Err(e) => {
                    error!("Channel authorization failed for {}: {:#}", name, e);
                    false
                }
            };
            if !allowed {
                warn!("{} ({}) denied subscription to {}", session.username, session.user_id, name);
                let _ = session.reply.send(RealtimeEvent::SubscriptionDenied { channel: name });
                return;
            }

            let newly_added = session
                .subscriptions
                .write()
                .map(|mut subs| subs.insert(channel))
                .unwrap_or(false);
            let _ = session.reply.send(RealtimeEvent::Subscribed { channel: name });

            if newly_added && channel.is_presence() {
                if let Some(room_id) = channel.room_id() {
                    let existing = session
                        .dispatcher
                        .join_room(room_id, session.conn_id, session.user_id, &session.username)
                        .await;
                    for member in existing {
                        let _ = session.reply.send(RealtimeEvent::PresenceUpdate {
                            room_id,
                            user_id: member.user_id,
                            username: member.username,
                            online: true,
                        });
                    }
                }
            }
        }

        GatewayCommand::Unsubscribe { channel: name } => {
            let Ok(channel) = name.parse::<Channel>() else {
                return;
            };
            let removed = session
                .subscriptions
                .write()
                .map(|mut subs| subs.remove(&channel))
                .unwrap_or(false);

            if removed && channel.is_presence() {
                if let Some(room_id) = channel.room_id() {
                    session
                        .dispatcher
                        .leave_room(room_id, session.conn_id, session.user_id)
                        .await;
                }
            }
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &RealtimeEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize {} event: {}", event.kind(), e);
            true
        }
    }
}
