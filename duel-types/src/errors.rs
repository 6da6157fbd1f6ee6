use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::AssistKind;

/// Per-request outcome of a rejected battle operation. None of these are fatal;
/// state is left unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, thiserror::Error)]
#[ts(export)]
pub enum BattleError {
    #[error("battle {battle_id} not found")]
    BattleNotFound { battle_id: String },
    #[error("player is not a participant in this battle")]
    NotAParticipant,
    #[error("operation not allowed while battle is {current_state}")]
    InvalidState { current_state: String },
    #[error("battle already has a different opponent")]
    AlreadyJoined,
    #[error("cannot join your own battle")]
    CannotJoinOwnBattle,
    #[error("max words must be between 1 and {max}, got {requested}")]
    InvalidMaxWords { requested: u32, max: u32 },
    #[error("round {requested} is not the current round ({current})")]
    RoundMismatch { requested: u32, current: u32 },
    #[error("round already completed")]
    RoundAlreadyCompleted,
    #[error("round expired")]
    RoundExpired,
    #[error("no attempts left this round")]
    AttemptsExhausted,
    #[error("guess must not be empty")]
    EmptyGuess,
    #[error("{kind} already used this round")]
    AssistAlreadyUsed { kind: AssistKind },
    #[error("a rematch is already pending for this battle")]
    RematchAlreadyPending,
    #[error("a rematch was already accepted for this battle")]
    RematchAlreadyAccepted,
    #[error("rematch request not found")]
    RematchNotFound,
    #[error("rematch request is no longer pending")]
    RematchNotPending,
    #[error("rematch request expired")]
    RematchExpired,
    #[error("only the other player can respond to this rematch")]
    NotRematchRecipient,
    #[error("admin token required")]
    Unauthorized,
    #[error("concurrent update, re-read and retry")]
    Conflict,
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl BattleError {
    /// Conflicts are the only errors a caller should blindly retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BattleError::Conflict)
    }

    pub fn not_found(battle_id: impl ToString) -> Self {
        BattleError::BattleNotFound {
            battle_id: battle_id.to_string(),
        }
    }
}
