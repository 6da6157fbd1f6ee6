use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warp::ws::{Message, WebSocket};

use crate::auth::AuthService;
use crate::battle_service::BattleService;
use duel_core::BattleEvent;
use duel_types::{ClientMessage, ServerMessage};

pub mod connection;
pub mod handlers;
pub mod rate_limiter;

use connection::ConnectionId;
pub use connection::ConnectionManager;
use handlers::MessageHandler;
use rate_limiter::RateLimiter;

/// What to do with the socket after one inbound frame.
enum Inbound {
    Continue,
    Close,
}

pub async fn handle_connection(
    websocket: WebSocket,
    connection_manager: Arc<ConnectionManager>,
    battle_service: Arc<BattleService>,
    auth_service: Arc<AuthService>,
) {
    let connection_id = ConnectionId::new();
    info!("New WebSocket connection: {}", connection_id);

    let (ws_sender, mut ws_receiver) = websocket.split();
    let outbox = connection_manager.create_connection(connection_id).await;
    let handler = MessageHandler::new(
        connection_id,
        connection_manager.clone(),
        battle_service,
        auth_service,
    );

    let inbound = async {
        let mut rate_limiter = RateLimiter::new();
        while let Some(frame) = ws_receiver.next().await {
            let msg = match frame {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            };
            match handle_frame(msg, &mut rate_limiter, &handler, connection_id).await {
                Inbound::Continue => {}
                Inbound::Close => break,
            }
        }
    };

    tokio::select! {
        _ = inbound => {},
        _ = pump_outbox(outbox, ws_sender, connection_id) => {},
    }

    // Battles live in the store, so a dropped socket only loses its subscriptions
    info!("Connection {} disconnected", connection_id);
    connection_manager.remove_connection(connection_id).await;
}

/// Forward queued server messages onto the socket until either side goes away.
async fn pump_outbox(
    mut outbox: UnboundedReceiver<ServerMessage>,
    mut ws_sender: SplitSink<WebSocket, Message>,
    connection_id: ConnectionId,
) {
    while let Some(message) = outbox.recv().await {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize message for {}: {:?}", connection_id, e);
                continue;
            }
        };
        if let Err(e) = ws_sender.send(Message::text(json)).await {
            warn!("Failed to send message to {}: {:?}", connection_id, e);
            break;
        }
    }
}

async fn handle_frame(
    msg: Message,
    rate_limiter: &mut RateLimiter,
    handler: &MessageHandler,
    connection_id: ConnectionId,
) -> Inbound {
    if msg.is_close() {
        return Inbound::Close;
    }
    let Ok(text) = msg.to_str() else {
        // Ping/pong and binary frames carry nothing for us
        return Inbound::Continue;
    };

    let reply = if !rate_limiter.check_rate_limit() {
        warn!("Rate limit exceeded for connection {}", connection_id);
        Some("Rate limit exceeded, message dropped".to_string())
    } else {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => {
                if let Err(e) = handler.handle_message(message).await {
                    // Only fails when our own outbox is gone
                    error!("Error handling message for {}: {}", connection_id, e);
                    return Inbound::Close;
                }
                None
            }
            Err(e) => {
                warn!("Invalid JSON message from {}: {}", connection_id, e);
                Some(format!("Invalid JSON message: {}", e))
            }
        }
    };

    match reply {
        Some(message) => match handler.send_message(ServerMessage::Error { message }).await {
            Ok(()) => Inbound::Continue,
            Err(_) => Inbound::Close,
        },
        None => Inbound::Continue,
    }
}

/// Push a fresh, per-viewer snapshot to every connection watching the battle
/// an event is about.
pub fn spawn_event_forwarder(
    battle_service: Arc<BattleService>,
    connection_manager: Arc<ConnectionManager>,
) -> JoinHandle<()> {
    let mut events = battle_service.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => forward_event(&battle_service, &connection_manager, &event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event forwarder lagged behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn forward_event(
    battle_service: &BattleService,
    connection_manager: &ConnectionManager,
    event: &BattleEvent,
) {
    let battle_id = event.battle_id();
    let subscribers = connection_manager.subscribers(battle_id).await;
    if subscribers.is_empty() {
        return;
    }

    if let BattleEvent::RematchUpdated { .. } = event {
        let request = match battle_service.get_rematch_status(battle_id).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                debug!("Skipping rematch push for {}: {}", battle_id, e);
                return;
            }
        };
        for (connection_id, _) in subscribers {
            let _ = connection_manager
                .send_to_connection(
                    connection_id,
                    ServerMessage::RematchUpdate {
                        request: request.clone(),
                    },
                )
                .await;
        }
        return;
    }

    // One read per event; each subscriber gets its own projection of it
    let view = match battle_service.battle_view(battle_id).await {
        Ok(view) => view,
        Err(e) => {
            debug!("Skipping snapshot push for {}: {}", battle_id, e);
            return;
        }
    };
    for (connection_id, player) in subscribers {
        let snapshot = view.snapshot_for(player.as_ref());
        let _ = connection_manager
            .send_to_connection(connection_id, ServerMessage::BattleUpdate { snapshot })
            .await;
    }
}
