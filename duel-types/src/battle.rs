use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

pub type BattleId = Uuid;
pub type PlayerId = Uuid;

/// Caller-supplied identity. Every battle operation receives one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlayerIdentity {
    pub id: PlayerId,
    pub display_name: String,
}

impl PlayerIdentity {
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PlayerRole {
    Challenger,
    Opponent,
}

impl PlayerRole {
    pub fn other(self) -> Self {
        match self {
            PlayerRole::Challenger => PlayerRole::Opponent,
            PlayerRole::Opponent => PlayerRole::Challenger,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerRole::Challenger => "challenger",
            PlayerRole::Opponent => "opponent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "challenger" => Some(PlayerRole::Challenger),
            "opponent" => Some(PlayerRole::Opponent),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum BattleStatus {
    WaitingForOpponent, // Challenger created the battle, invite outstanding
    ReadyToStart,       // Both players bound, nobody ready yet
    ChallengerReady,
    OpponentReady,
    InProgress,
    Completed,
}

impl BattleStatus {
    /// Position in the forward-only lifecycle. The two single-ready states share a rank.
    pub fn rank(self) -> u8 {
        match self {
            BattleStatus::WaitingForOpponent => 0,
            BattleStatus::ReadyToStart => 1,
            BattleStatus::ChallengerReady | BattleStatus::OpponentReady => 2,
            BattleStatus::InProgress => 3,
            BattleStatus::Completed => 4,
        }
    }

    /// Whether `role` has already signalled readiness in this status.
    pub fn is_ready(self, role: PlayerRole) -> bool {
        match self {
            BattleStatus::ChallengerReady => role == PlayerRole::Challenger,
            BattleStatus::OpponentReady => role == PlayerRole::Opponent,
            BattleStatus::InProgress | BattleStatus::Completed => true,
            BattleStatus::WaitingForOpponent | BattleStatus::ReadyToStart => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BattleStatus::WaitingForOpponent => "waiting_for_opponent",
            BattleStatus::ReadyToStart => "ready_to_start",
            BattleStatus::ChallengerReady => "challenger_ready",
            BattleStatus::OpponentReady => "opponent_ready",
            BattleStatus::InProgress => "in_progress",
            BattleStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting_for_opponent" => Some(BattleStatus::WaitingForOpponent),
            "ready_to_start" => Some(BattleStatus::ReadyToStart),
            "challenger_ready" => Some(BattleStatus::ChallengerReady),
            "opponent_ready" => Some(BattleStatus::OpponentReady),
            "in_progress" => Some(BattleStatus::InProgress),
            "completed" => Some(BattleStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Winner {
    Challenger,
    Opponent,
    Tie,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Challenger => "challenger",
            Winner::Opponent => "opponent",
            Winner::Tie => "tie",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "challenger" => Some(Winner::Challenger),
            "opponent" => Some(Winner::Opponent),
            "tie" => Some(Winner::Tie),
            _ => None,
        }
    }
}

/// The aggregate root of a 1v1 duel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Battle {
    pub id: BattleId,
    pub challenger: PlayerIdentity,
    pub opponent: Option<PlayerIdentity>,
    pub status: BattleStatus,
    pub current_word_index: u32,
    pub max_words: u32,
    pub challenger_score: u32,
    pub opponent_score: u32,
    pub winner: Option<Winner>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_round_start_time: Option<DateTime<Utc>>,
    pub hidden: bool,
    pub deleted: bool,
    pub rematch_of: Option<BattleId>,
    /// Rounds whose result is already folded into `challenger_score`, one bit per round.
    pub challenger_credited: u32,
    pub opponent_credited: u32,
    /// Bumped by the store on every accepted conditional write.
    pub version: u64,
}

impl Battle {
    pub fn role_of(&self, player_id: PlayerId) -> Option<PlayerRole> {
        if self.challenger.id == player_id {
            Some(PlayerRole::Challenger)
        } else if self.opponent.as_ref().is_some_and(|o| o.id == player_id) {
            Some(PlayerRole::Opponent)
        } else {
            None
        }
    }

    pub fn player(&self, role: PlayerRole) -> Option<&PlayerIdentity> {
        match role {
            PlayerRole::Challenger => Some(&self.challenger),
            PlayerRole::Opponent => self.opponent.as_ref(),
        }
    }

    pub fn score(&self, role: PlayerRole) -> u32 {
        match role {
            PlayerRole::Challenger => self.challenger_score,
            PlayerRole::Opponent => self.opponent_score,
        }
    }

    pub fn add_score(&mut self, role: PlayerRole, points: u32) {
        match role {
            PlayerRole::Challenger => self.challenger_score += points,
            PlayerRole::Opponent => self.opponent_score += points,
        }
    }

    fn credited_mut(&mut self, role: PlayerRole) -> &mut u32 {
        match role {
            PlayerRole::Challenger => &mut self.challenger_credited,
            PlayerRole::Opponent => &mut self.opponent_credited,
        }
    }

    pub fn is_credited(&self, role: PlayerRole, round_index: u32) -> bool {
        let mask = match role {
            PlayerRole::Challenger => self.challenger_credited,
            PlayerRole::Opponent => self.opponent_credited,
        };
        round_index < u32::BITS && mask & (1 << round_index) != 0
    }

    /// Add `points` for `role`'s result in `round_index` unless that round was
    /// already credited. Returns whether anything changed.
    pub fn credit_round(&mut self, role: PlayerRole, round_index: u32, points: u32) -> bool {
        if round_index >= u32::BITS || self.is_credited(role, round_index) {
            return false;
        }
        *self.credited_mut(role) |= 1 << round_index;
        self.add_score(role, points);
        true
    }

    pub fn is_visible(&self) -> bool {
        !self.hidden && !self.deleted
    }
}
