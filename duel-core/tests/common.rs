#![allow(dead_code)]

use chrono::{DateTime, Utc};
use duel_core::{apply_join, apply_ready, create_battle, BattleRules, WordListSource};
use duel_types::{Battle, BattleStatus, PlayerIdentity, PlayerRole, RoundAttempt};
use uuid::Uuid;

/// Word list with hints and clues for every entry
pub fn create_test_source() -> WordListSource {
    WordListSource::from_word_list(
        "ocean|Very large body of water|Pacific, for one\n\
         planet|Orbits a star|Earth, for one\n\
         garden|Where vegetables grow|Eden was one\n\
         bridge|Spans a river|Golden Gate, for one",
    )
}

pub fn create_test_player(name: &str) -> PlayerIdentity {
    PlayerIdentity::new(Uuid::new_v4(), name)
}

/// Alice challenges, Bob joins, both ready at `now`.
pub fn create_started_battle(rules: &BattleRules, now: DateTime<Utc>) -> Battle {
    let battle = create_battle(
        Uuid::new_v4(),
        create_test_player("Alice"),
        None,
        rules,
        now,
    )
    .unwrap();
    let battle = apply_join(&battle, &create_test_player("Bob")).unwrap().unwrap();
    let battle = apply_ready(&battle, PlayerRole::Challenger, now).unwrap().unwrap();
    apply_ready(&battle, PlayerRole::Opponent, now).unwrap().unwrap()
}

pub fn new_attempt(
    rules: &BattleRules,
    battle: &Battle,
    role: PlayerRole,
    now: DateTime<Utc>,
) -> RoundAttempt {
    let player = battle.player(role).unwrap();
    rules.ledger().new_attempt(
        battle.id,
        battle.current_word_index,
        Uuid::new_v4(),
        role,
        player.id,
        now,
    )
}

pub fn assert_battle_state(battle: &Battle, status: BattleStatus, round: u32) {
    assert_eq!(
        battle.status, status,
        "Expected status {:?}, got {:?}",
        status, battle.status
    );
    assert_eq!(
        battle.current_word_index, round,
        "Expected round {}, got {}",
        round, battle.current_word_index
    );
}
