use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{AssistKind, BattleId, BattleStatus, PlayerIdentity, PlayerRole, Winner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RoundProgress {
    NotStarted, // No RoundAttempt yet and the round is still open
    Guessing,
    Solved,
    Forfeited, // Timed out or out of attempts
}

/// One player's standing in a round, as seen by a particular viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerRoundView {
    pub role: PlayerRole,
    pub display_name: String,
    pub progress: RoundProgress,
    pub attempts_used: u32,
    pub score: Option<u32>,
    pub elapsed_ms: Option<u64>,
    pub hint_used: bool,
    pub clue_used: bool,
    pub invite_friend_used: bool,
    /// Only populated for the viewer's own row.
    pub current_guess: Option<String>,
}

/// Per-round detail. The answer and assist texts are filtered for the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoundDetail {
    pub battle_id: BattleId,
    pub round_index: u32,
    pub word_length: Option<u32>,
    pub word: Option<String>,
    pub hint_text: Option<String>,
    pub clue_text: Option<String>,
    pub challenger: PlayerRoundView,
    pub opponent: Option<PlayerRoundView>,
}

/// Safe battle state for clients: never carries an unrevealed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BattleSnapshot {
    pub id: BattleId,
    pub status: BattleStatus,
    pub challenger: PlayerIdentity,
    pub opponent: Option<PlayerIdentity>,
    pub viewer_role: Option<PlayerRole>,
    pub current_word_index: u32,
    pub max_words: u32,
    pub challenger_score: u32,
    pub opponent_score: u32,
    pub winner: Option<Winner>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_round_start_time: Option<DateTime<Utc>>,
    pub round_seconds_remaining: Option<u32>,
    pub current_round: Option<RoundDetail>,
    pub rematch_of: Option<BattleId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GuessOutcome {
    pub correct: bool,
    pub round_index: u32,
    pub attempts_used: u32,
    pub attempts_remaining: u32,
    pub round_score: Option<u32>,
    pub snapshot: BattleSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AssistOutcome {
    pub kind: AssistKind,
    pub round_index: u32,
    pub text: String,
}

/// Admin moderation flags. Fields left out are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ModerationUpdate {
    pub hidden: Option<bool>,
    pub deleted: Option<bool>,
}

/// Row of the completion-time index consumed by leaderboard aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompletedBattleSummary {
    pub id: BattleId,
    pub challenger: PlayerIdentity,
    pub opponent: Option<PlayerIdentity>,
    pub challenger_score: u32,
    pub opponent_score: u32,
    pub winner: Option<Winner>,
    pub completed_at: Option<DateTime<Utc>>,
}
