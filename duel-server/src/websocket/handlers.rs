use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::AuthService;
use crate::battle_service::BattleService;
use crate::websocket::connection::{ConnectionId, ConnectionManager};
use duel_types::{BattleError, BattleId, ClientMessage, PlayerIdentity, ServerMessage};

#[derive(Clone)]
pub struct MessageHandler {
    connection_id: ConnectionId,
    connection_manager: Arc<ConnectionManager>,
    battle_service: Arc<BattleService>,
    auth_service: Arc<AuthService>,
}

impl MessageHandler {
    pub fn new(
        connection_id: ConnectionId,
        connection_manager: Arc<ConnectionManager>,
        battle_service: Arc<BattleService>,
        auth_service: Arc<AuthService>,
    ) -> Self {
        Self {
            connection_id,
            connection_manager,
            battle_service,
            auth_service,
        }
    }

    pub async fn handle_message(&self, message: ClientMessage) -> Result<(), String> {
        self.connection_manager
            .update_activity(self.connection_id)
            .await;

        match message {
            ClientMessage::Authenticate { token } => self.handle_authenticate(token).await,
            ClientMessage::Heartbeat => Ok(()),
            ClientMessage::Subscribe { battle_id } => self.handle_subscribe(battle_id).await,
            ClientMessage::Unsubscribe { battle_id } => {
                self.connection_manager
                    .unsubscribe(self.connection_id, battle_id)
                    .await;
                self.send_message(ServerMessage::Unsubscribed { battle_id })
                    .await
            }
            gameplay => {
                let Some(player) = self.connection_manager.player(self.connection_id).await
                else {
                    return self.send_error("Authentication required").await;
                };
                match self.handle_gameplay(&player, gameplay).await {
                    Ok(Some(reply)) => self.send_message(reply).await,
                    Ok(None) => Ok(()),
                    Err(error) => {
                        debug!(
                            "Rejected request from {} on {}: {}",
                            player.display_name, self.connection_id, error
                        );
                        self.send_message(ServerMessage::Rejected { error }).await
                    }
                }
            }
        }
    }

    async fn handle_authenticate(&self, token: String) -> Result<(), String> {
        info!("Authenticating connection {}", self.connection_id);

        match self.auth_service.validate_token(&token) {
            Ok(player) => {
                self.connection_manager
                    .set_player(self.connection_id, player.clone())
                    .await?;
                info!("Connection {} authenticated as {}", self.connection_id, player.id);
                self.send_message(ServerMessage::AuthenticationSuccess { player })
                    .await
            }
            Err(e) => {
                warn!(
                    "Authentication failed for connection {}: {}",
                    self.connection_id, e
                );
                self.send_message(ServerMessage::AuthenticationFailed {
                    reason: e.to_string(),
                })
                .await
            }
        }
    }

    /// Spectating needs no identity; participants get their own view.
    async fn handle_subscribe(&self, battle_id: BattleId) -> Result<(), String> {
        let player = self.connection_manager.player(self.connection_id).await;
        match self
            .battle_service
            .get_snapshot(player.as_ref(), battle_id)
            .await
        {
            Ok(snapshot) => {
                self.connection_manager
                    .subscribe(self.connection_id, battle_id)
                    .await?;
                self.send_message(ServerMessage::Subscribed { battle_id })
                    .await?;
                self.send_message(ServerMessage::BattleUpdate { snapshot })
                    .await
            }
            Err(error) => self.send_message(ServerMessage::Rejected { error }).await,
        }
    }

    async fn handle_gameplay(
        &self,
        player: &PlayerIdentity,
        message: ClientMessage,
    ) -> Result<Option<ServerMessage>, BattleError> {
        let service = &self.battle_service;
        let reply = match message {
            ClientMessage::CreateBattle { max_words } => {
                let snapshot = service.create_battle(player, max_words).await?;
                self.watch(snapshot.id).await;
                ServerMessage::BattleUpdate { snapshot }
            }
            ClientMessage::JoinBattle { battle_id } => {
                let snapshot = service.join_battle(player, battle_id).await?;
                self.watch(battle_id).await;
                ServerMessage::BattleUpdate { snapshot }
            }
            ClientMessage::MarkReady { battle_id } => ServerMessage::BattleUpdate {
                snapshot: service.mark_ready(player, battle_id).await?,
            },
            ClientMessage::SubmitGuess {
                battle_id,
                round_index,
                guess,
            } => ServerMessage::GuessResult {
                outcome: service
                    .submit_guess(player, battle_id, round_index, &guess)
                    .await?,
            },
            ClientMessage::UpdateDraftGuess {
                battle_id,
                round_index,
                text,
            } => {
                service
                    .update_draft_guess(player, battle_id, round_index, &text)
                    .await?;
                return Ok(None);
            }
            ClientMessage::RequestHint {
                battle_id,
                round_index,
            } => ServerMessage::AssistGranted {
                outcome: service.request_hint(player, battle_id, round_index).await?,
            },
            ClientMessage::RequestClue {
                battle_id,
                round_index,
            } => ServerMessage::AssistGranted {
                outcome: service.request_clue(player, battle_id, round_index).await?,
            },
            ClientMessage::UseInviteFriend {
                battle_id,
                round_index,
            } => ServerMessage::AssistGranted {
                outcome: service
                    .use_invite_friend(player, battle_id, round_index)
                    .await?,
            },
            ClientMessage::ProposeRematch { battle_id } => ServerMessage::RematchUpdate {
                request: service.propose_rematch(player, battle_id).await?,
            },
            ClientMessage::RespondRematch {
                battle_id,
                decision,
            } => {
                let request = service.respond_rematch(player, battle_id, decision).await?;
                if let Some(new_battle_id) = request.new_challenge_id {
                    self.watch(new_battle_id).await;
                }
                ServerMessage::RematchUpdate { request }
            }
            ClientMessage::Authenticate { .. }
            | ClientMessage::Heartbeat
            | ClientMessage::Subscribe { .. }
            | ClientMessage::Unsubscribe { .. } => return Ok(None),
        };
        Ok(Some(reply))
    }

    async fn watch(&self, battle_id: BattleId) {
        if let Err(e) = self
            .connection_manager
            .subscribe(self.connection_id, battle_id)
            .await
        {
            warn!("Could not subscribe {} to {}: {}", self.connection_id, battle_id, e);
        }
    }

    pub async fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.connection_manager
            .send_to_connection(self.connection_id, message)
            .await
    }

    async fn send_error(&self, message: &str) -> Result<(), String> {
        self.send_message(ServerMessage::Error {
            message: message.to_string(),
        })
        .await
    }
}
