//! Read-side projections. Callers pass the *effective* battle state
//! (see [`crate::derive_effective_state`]); nothing here writes.

use chrono::{DateTime, Utc};
use duel_types::{
    Battle, BattleSnapshot, BattleStatus, PlayerId, PlayerRole, PlayerRoundView, RoundAttempt,
    RoundDetail, RoundProgress, RoundWord,
};

use crate::BattleRules;

fn round_closed(battle: &Battle, round_index: u32) -> bool {
    battle.status == BattleStatus::Completed || round_index < battle.current_word_index
}

fn player_view(
    battle: &Battle,
    role: PlayerRole,
    attempt: Option<&RoundAttempt>,
    closed: bool,
    viewer_role: Option<PlayerRole>,
    rules: &BattleRules,
) -> Option<PlayerRoundView> {
    let player = battle.player(role)?;

    let progress = match attempt {
        Some(a) if a.completed => RoundProgress::Solved,
        Some(a) if a.attempts_used >= rules.max_attempts => RoundProgress::Forfeited,
        _ if closed => RoundProgress::Forfeited,
        Some(_) => RoundProgress::Guessing,
        None => RoundProgress::NotStarted,
    };

    let is_viewer = viewer_role == Some(role);
    Some(PlayerRoundView {
        role,
        display_name: player.display_name.clone(),
        progress,
        attempts_used: attempt.map_or(0, |a| a.attempts_used),
        score: match progress {
            RoundProgress::Solved => attempt.and_then(|a| a.score),
            RoundProgress::Forfeited => Some(0),
            _ => None,
        },
        elapsed_ms: attempt.and_then(|a| a.elapsed_ms),
        hint_used: attempt.is_some_and(|a| a.hint_used),
        clue_used: attempt.is_some_and(|a| a.clue_used),
        invite_friend_used: attempt.is_some_and(|a| a.invite_friend_used),
        current_guess: if is_viewer {
            attempt.map(|a| a.current_guess.clone())
        } else {
            None
        },
    })
}

/// Detail for one round as `viewer` is allowed to see it.
///
/// The answer is revealed once the round is closed or the viewer solved it;
/// hint and clue text only once the viewer spent that assist.
pub fn round_detail(
    battle: &Battle,
    round_index: u32,
    attempts: &[RoundAttempt],
    round_word: Option<&RoundWord>,
    viewer: Option<PlayerId>,
    rules: &BattleRules,
) -> RoundDetail {
    let closed = round_closed(battle, round_index);
    let viewer_role = viewer.and_then(|id| battle.role_of(id));
    let attempt_for = |role: PlayerRole| {
        attempts
            .iter()
            .find(|a| a.round_index == round_index && a.role == role)
    };
    let viewer_attempt = viewer_role.and_then(attempt_for);

    let solved_by_viewer = viewer_attempt.is_some_and(|a| a.completed);
    let reveal = closed || solved_by_viewer;

    let challenger = player_view(
        battle,
        PlayerRole::Challenger,
        attempt_for(PlayerRole::Challenger),
        closed,
        viewer_role,
        rules,
    );
    let opponent = player_view(
        battle,
        PlayerRole::Opponent,
        attempt_for(PlayerRole::Opponent),
        closed,
        viewer_role,
        rules,
    );

    RoundDetail {
        battle_id: battle.id,
        round_index,
        word_length: round_word.map(|w| w.word.chars().count() as u32),
        word: round_word.filter(|_| reveal).map(|w| w.word.clone()),
        hint_text: round_word
            .filter(|_| viewer_attempt.is_some_and(|a| a.hint_used))
            .and_then(|w| w.hint_text.clone()),
        clue_text: round_word
            .filter(|_| viewer_attempt.is_some_and(|a| a.clue_used))
            .and_then(|w| w.clue_text.clone()),
        // The challenger slot is always bound
        challenger: challenger.unwrap_or_else(|| PlayerRoundView {
            role: PlayerRole::Challenger,
            display_name: battle.challenger.display_name.clone(),
            progress: RoundProgress::NotStarted,
            attempts_used: 0,
            score: None,
            elapsed_ms: None,
            hint_used: false,
            clue_used: false,
            invite_friend_used: false,
            current_guess: None,
        }),
        opponent,
    }
}

/// Full battle snapshot including the live round, if any.
pub fn battle_snapshot(
    battle: &Battle,
    current_attempts: &[RoundAttempt],
    current_word: Option<&RoundWord>,
    viewer: Option<PlayerId>,
    rules: &BattleRules,
    now: DateTime<Utc>,
) -> BattleSnapshot {
    let round_seconds_remaining = rules.round_deadline(battle).map(|deadline| {
        let remaining_ms = (deadline - now).num_milliseconds().max(0);
        // Round up so a client never sees 0 while the round is still open
        ((remaining_ms + 999) / 1000) as u32
    });

    let current_round = (battle.status == BattleStatus::InProgress).then(|| {
        round_detail(
            battle,
            battle.current_word_index,
            current_attempts,
            current_word,
            viewer,
            rules,
        )
    });

    BattleSnapshot {
        id: battle.id,
        status: battle.status,
        challenger: battle.challenger.clone(),
        opponent: battle.opponent.clone(),
        viewer_role: viewer.and_then(|id| battle.role_of(id)),
        current_word_index: battle.current_word_index,
        max_words: battle.max_words,
        challenger_score: battle.challenger_score,
        opponent_score: battle.opponent_score,
        winner: battle.winner,
        created_at: battle.created_at,
        started_at: battle.started_at,
        completed_at: battle.completed_at,
        current_round_start_time: battle.current_round_start_time,
        round_seconds_remaining,
        current_round,
        rematch_of: battle.rematch_of,
    }
}
