use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::{BattleId, PlayerId, PlayerRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AssistKind {
    Hint,
    Clue,
    InviteFriend,
}

impl fmt::Display for AssistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssistKind::Hint => "hint",
            AssistKind::Clue => "clue",
            AssistKind::InviteFriend => "invite_friend",
        };
        f.write_str(name)
    }
}

/// One player's record for one round of a battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoundAttempt {
    pub id: Uuid,
    pub battle_id: BattleId,
    pub round_index: u32,
    pub word_id: Uuid,
    pub role: PlayerRole,
    pub player_id: PlayerId,
    pub attempts_used: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_guess: String,
    pub score: Option<u32>,
    pub elapsed_ms: Option<u64>,
    pub hint_used: bool,
    pub clue_used: bool,
    pub invite_friend_used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl RoundAttempt {
    pub fn assist_used(&self, kind: AssistKind) -> bool {
        match kind {
            AssistKind::Hint => self.hint_used,
            AssistKind::Clue => self.clue_used,
            AssistKind::InviteFriend => self.invite_friend_used,
        }
    }

    pub fn assists_used(&self) -> u32 {
        [self.hint_used, self.clue_used, self.invite_friend_used]
            .iter()
            .filter(|used| **used)
            .count() as u32
    }
}

/// The word both players are judged against for a round.
/// Never serialized to clients directly; projections decide what is revealed.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundWord {
    pub id: Uuid,
    pub battle_id: BattleId,
    pub round_index: u32,
    pub word: String,
    pub hint_text: Option<String>,
    pub clue_text: Option<String>,
    pub created_at: DateTime<Utc>,
}
