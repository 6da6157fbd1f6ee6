use chrono::{DateTime, Utc};
use duel_types::{
    AssistKind, Battle, BattleId, BattleStatus, PlayerRole, RematchRequest, RematchStatus, Winner,
};

/// Something observable happened to a battle. Subscribers re-read the
/// snapshot; the payload is for logging and coarse client hints.
#[derive(Debug, Clone, PartialEq)]
pub enum BattleEvent {
    BattleCreated {
        battle_id: BattleId,
    },
    OpponentJoined {
        battle_id: BattleId,
    },
    PlayerReady {
        battle_id: BattleId,
        role: PlayerRole,
    },
    BattleStarted {
        battle_id: BattleId,
        started_at: DateTime<Utc>,
    },
    RoundAdvanced {
        battle_id: BattleId,
        round_index: u32,
    },
    BattleCompleted {
        battle_id: BattleId,
        winner: Winner,
        challenger_score: u32,
        opponent_score: u32,
    },
    AttemptRecorded {
        battle_id: BattleId,
        role: PlayerRole,
        round_index: u32,
        solved: bool,
    },
    AssistUsed {
        battle_id: BattleId,
        role: PlayerRole,
        round_index: u32,
        kind: AssistKind,
    },
    RematchUpdated {
        battle_id: BattleId,
        status: RematchStatus,
        new_battle_id: Option<BattleId>,
    },
    Moderated {
        battle_id: BattleId,
    },
}

impl BattleEvent {
    pub fn battle_id(&self) -> BattleId {
        match self {
            BattleEvent::BattleCreated { battle_id }
            | BattleEvent::OpponentJoined { battle_id }
            | BattleEvent::PlayerReady { battle_id, .. }
            | BattleEvent::BattleStarted { battle_id, .. }
            | BattleEvent::RoundAdvanced { battle_id, .. }
            | BattleEvent::BattleCompleted { battle_id, .. }
            | BattleEvent::AttemptRecorded { battle_id, .. }
            | BattleEvent::AssistUsed { battle_id, .. }
            | BattleEvent::RematchUpdated { battle_id, .. }
            | BattleEvent::Moderated { battle_id } => *battle_id,
        }
    }

    pub fn rematch(request: &RematchRequest) -> Self {
        BattleEvent::RematchUpdated {
            battle_id: request.battle_id,
            status: request.status,
            new_battle_id: request.new_challenge_id,
        }
    }
}

/// Events implied by moving a battle document from `before` to `after`.
pub fn transition_events(before: &Battle, after: &Battle) -> Vec<BattleEvent> {
    let battle_id = after.id;
    let mut events = Vec::new();

    if before.opponent.is_none() && after.opponent.is_some() {
        events.push(BattleEvent::OpponentJoined { battle_id });
    }

    for role in [PlayerRole::Challenger, PlayerRole::Opponent] {
        if !before.status.is_ready(role)
            && after.status.is_ready(role)
            && after.status != BattleStatus::InProgress
            && after.status != BattleStatus::Completed
        {
            events.push(BattleEvent::PlayerReady { battle_id, role });
        }
    }

    if before.started_at.is_none() {
        if let Some(started_at) = after.started_at {
            events.push(BattleEvent::BattleStarted {
                battle_id,
                started_at,
            });
        }
    }

    if after.current_word_index > before.current_word_index
        && after.current_word_index < after.max_words
    {
        events.push(BattleEvent::RoundAdvanced {
            battle_id,
            round_index: after.current_word_index,
        });
    }

    if after.status == BattleStatus::Completed
        && (before.status != BattleStatus::Completed || before.winner != after.winner)
    {
        if let Some(winner) = after.winner {
            events.push(BattleEvent::BattleCompleted {
                battle_id,
                winner,
                challenger_score: after.challenger_score,
                opponent_score: after.opponent_score,
            });
        }
    }

    if before.hidden != after.hidden || before.deleted != after.deleted {
        events.push(BattleEvent::Moderated { battle_id });
    }

    events
}
