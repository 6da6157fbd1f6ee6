use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    AssistOutcome, BattleError, BattleId, BattleSnapshot, GuessOutcome, PlayerIdentity,
    RematchDecision, RematchRequest,
};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ClientMessage {
    Authenticate {
        token: String,
    },
    CreateBattle {
        max_words: Option<u32>,
    },
    JoinBattle {
        battle_id: BattleId,
    },
    MarkReady {
        battle_id: BattleId,
    },
    SubmitGuess {
        battle_id: BattleId,
        round_index: u32,
        guess: String,
    },
    UpdateDraftGuess {
        battle_id: BattleId,
        round_index: u32,
        text: String,
    },
    RequestHint {
        battle_id: BattleId,
        round_index: u32,
    },
    RequestClue {
        battle_id: BattleId,
        round_index: u32,
    },
    UseInviteFriend {
        battle_id: BattleId,
        round_index: u32,
    },
    ProposeRematch {
        battle_id: BattleId,
    },
    RespondRematch {
        battle_id: BattleId,
        decision: RematchDecision,
    },
    Subscribe {
        battle_id: BattleId,
    },
    Unsubscribe {
        battle_id: BattleId,
    },
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ServerMessage {
    AuthenticationSuccess { player: PlayerIdentity },
    AuthenticationFailed { reason: String },
    BattleUpdate { snapshot: BattleSnapshot },
    GuessResult { outcome: GuessOutcome },
    AssistGranted { outcome: AssistOutcome },
    RematchUpdate { request: RematchRequest },
    Subscribed { battle_id: BattleId },
    Unsubscribed { battle_id: BattleId },
    Rejected { error: BattleError },
    Error { message: String },
}
