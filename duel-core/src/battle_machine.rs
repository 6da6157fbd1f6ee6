//! Battle lifecycle transitions.
//!
//! Every function here is pure: it takes the battle as last persisted plus the
//! server's notion of "now" and returns the next document, leaving the write
//! (and the conditional-update race) to the caller. `Ok(None)` means the
//! requested transition has already been applied and there is nothing to write.

use chrono::{DateTime, TimeDelta, Utc};
use duel_types::{
    Battle, BattleError, BattleId, BattleStatus, PlayerIdentity, PlayerRole, RoundAttempt, Winner,
};

use crate::{AttemptLedger, ScoringPolicy};

pub const DEFAULT_MAX_WORDS: u32 = 3;
pub const MAX_WORDS_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct BattleRules {
    pub round_duration: TimeDelta,
    pub max_attempts: u32,
    pub default_max_words: u32,
    pub rematch_window: TimeDelta,
    pub scoring: ScoringPolicy,
}

impl Default for BattleRules {
    fn default() -> Self {
        Self {
            round_duration: TimeDelta::seconds(60),
            max_attempts: 6,
            default_max_words: DEFAULT_MAX_WORDS,
            rematch_window: TimeDelta::minutes(5),
            scoring: ScoringPolicy::default(),
        }
    }
}

impl BattleRules {
    pub fn ledger(&self) -> AttemptLedger {
        AttemptLedger::new(self.scoring, self.max_attempts)
    }

    pub fn round_deadline(&self, battle: &Battle) -> Option<DateTime<Utc>> {
        if battle.status != BattleStatus::InProgress {
            return None;
        }
        battle
            .current_round_start_time
            .map(|start| start + self.round_duration)
    }
}

pub fn create_battle(
    id: BattleId,
    challenger: PlayerIdentity,
    max_words: Option<u32>,
    rules: &BattleRules,
    now: DateTime<Utc>,
) -> Result<Battle, BattleError> {
    let max_words = max_words.unwrap_or(rules.default_max_words);
    if max_words == 0 || max_words > MAX_WORDS_LIMIT {
        return Err(BattleError::InvalidMaxWords {
            requested: max_words,
            max: MAX_WORDS_LIMIT,
        });
    }

    Ok(Battle {
        id,
        challenger,
        opponent: None,
        status: BattleStatus::WaitingForOpponent,
        current_word_index: 0,
        max_words,
        challenger_score: 0,
        opponent_score: 0,
        winner: None,
        created_at: now,
        started_at: None,
        completed_at: None,
        current_round_start_time: None,
        hidden: false,
        deleted: false,
        rematch_of: None,
        challenger_credited: 0,
        opponent_credited: 0,
        version: 0,
    })
}

/// Apply every round expiry that has lapsed by `now`.
///
/// An expired round is closed at its deadline and the next round starts at that
/// same instant, so a long-abandoned battle runs to completion here.
pub fn derive_effective_state(battle: &Battle, rules: &BattleRules, now: DateTime<Utc>) -> Battle {
    let mut effective = battle.clone();
    while let Some(deadline) = rules.round_deadline(&effective) {
        if now <= deadline {
            break;
        }
        advance_round(&mut effective, deadline);
    }
    effective
}

/// Move to the next round, or finish the battle after the last one.
pub fn advance_round(battle: &mut Battle, at: DateTime<Utc>) {
    battle.current_word_index = (battle.current_word_index + 1).min(battle.max_words);
    if battle.current_word_index >= battle.max_words {
        battle.status = BattleStatus::Completed;
        battle.winner = Some(decide_winner(battle));
        battle.completed_at = Some(at);
        battle.current_round_start_time = None;
    } else {
        battle.current_round_start_time = Some(at);
    }
}

pub fn decide_winner(battle: &Battle) -> Winner {
    match battle.challenger_score.cmp(&battle.opponent_score) {
        std::cmp::Ordering::Greater => Winner::Challenger,
        std::cmp::Ordering::Less => Winner::Opponent,
        std::cmp::Ordering::Equal => Winner::Tie,
    }
}

pub fn apply_join(battle: &Battle, opponent: &PlayerIdentity) -> Result<Option<Battle>, BattleError> {
    if opponent.id == battle.challenger.id {
        return Err(BattleError::CannotJoinOwnBattle);
    }

    match &battle.opponent {
        Some(existing) if existing.id == opponent.id => return Ok(None),
        Some(_) => return Err(BattleError::AlreadyJoined),
        None => {}
    }

    if battle.status != BattleStatus::WaitingForOpponent {
        return Err(BattleError::InvalidState {
            current_state: battle.status.to_string(),
        });
    }

    let mut next = battle.clone();
    next.opponent = Some(opponent.clone());
    next.status = BattleStatus::ReadyToStart;
    Ok(Some(next))
}

/// Record `role` as ready. When the other flag is already set this performs the
/// merge into `InProgress` and opens round 0.
pub fn apply_ready(
    battle: &Battle,
    role: PlayerRole,
    now: DateTime<Utc>,
) -> Result<Option<Battle>, BattleError> {
    if battle.status.is_ready(role) {
        return Ok(None);
    }

    let mut next = battle.clone();
    match battle.status {
        BattleStatus::ReadyToStart => {
            next.status = match role {
                PlayerRole::Challenger => BattleStatus::ChallengerReady,
                PlayerRole::Opponent => BattleStatus::OpponentReady,
            };
        }
        BattleStatus::ChallengerReady | BattleStatus::OpponentReady => {
            next.status = BattleStatus::InProgress;
            next.current_word_index = 0;
            next.started_at = Some(now);
            next.current_round_start_time = Some(now);
        }
        _ => {
            return Err(BattleError::InvalidState {
                current_state: battle.status.to_string(),
            });
        }
    }
    Ok(Some(next))
}

/// Check that `round_index` is the live round of an effective battle state.
/// `own_attempt` distinguishes "you already solved it" from "time ran out" for
/// rounds that are already closed.
pub fn check_round_open(
    battle: &Battle,
    round_index: u32,
    own_attempt: Option<&RoundAttempt>,
) -> Result<(), BattleError> {
    match battle.status {
        BattleStatus::InProgress | BattleStatus::Completed => {}
        status => {
            return Err(BattleError::InvalidState {
                current_state: status.to_string(),
            });
        }
    }

    if round_index >= battle.max_words || round_index > battle.current_word_index {
        return Err(BattleError::RoundMismatch {
            requested: round_index,
            current: battle.current_word_index,
        });
    }

    let closed = battle.status == BattleStatus::Completed || round_index < battle.current_word_index;
    if closed {
        return Err(match own_attempt {
            Some(attempt) if attempt.completed => BattleError::RoundAlreadyCompleted,
            _ => BattleError::RoundExpired,
        });
    }

    Ok(())
}

/// Fold finished attempts of `round_index` into the battle. Each entry is a
/// role whose attempt is settled and the points it earned; roles already
/// credited for the round are skipped. The round closes once both roles are
/// credited.
///
/// Safe to re-run against a fresher battle after a lost conditional write; if the
/// round has already been closed by someone else only the points are applied.
pub fn settle_round(
    battle: &Battle,
    round_index: u32,
    settled: &[(PlayerRole, u32)],
    now: DateTime<Utc>,
) -> Option<Battle> {
    let mut next = battle.clone();
    let mut changed = false;

    for &(role, points) in settled {
        changed |= next.credit_round(role, round_index, points);
    }
    if changed && next.status == BattleStatus::Completed {
        next.winner = Some(decide_winner(&next));
    }

    if next.status == BattleStatus::InProgress
        && next.current_word_index == round_index
        && next.is_credited(PlayerRole::Challenger, round_index)
        && next.is_credited(PlayerRole::Opponent, round_index)
    {
        advance_round(&mut next, now);
        changed = true;
    }

    changed.then_some(next)
}

/// Status must never move backwards, the round index never decreases and a
/// credited round stays credited.
pub fn is_forward_transition(before: &Battle, after: &Battle) -> bool {
    let keeps = |before: u32, after: u32| after & before == before;
    after.status.rank() >= before.status.rank()
        && after.current_word_index >= before.current_word_index
        && after.current_word_index <= after.max_words
        && after.challenger_score >= before.challenger_score
        && after.opponent_score >= before.opponent_score
        && keeps(before.challenger_credited, after.challenger_credited)
        && keeps(before.opponent_credited, after.opponent_credited)
}
