
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use duel_core::BattleEvent;
use duel_persistence::{BattleStore, MemoryStore, SqlStore, StoreError, connect_to_memory_database};
use duel_types::{
    AssistKind, Battle, BattleError, BattleId, BattleStatus, ModerationUpdate, PlayerRole,
    RematchDecision, RematchRequest, RematchStatus, RoundAttempt, RoundProgress, RoundWord, Winner,
};
use migration::{Migrator, MigratorTrait};
use test_helpers::*;
use uuid::Uuid;

#[tokio::test]
async fn test_create_battle_validates_word_count() {
    let setup = TestBattleSetup::new();

    let snapshot = setup.service.create_battle(&setup.alice, None).await.unwrap();
    assert_eq!(snapshot.status, BattleStatus::WaitingForOpponent);
    assert_eq!(snapshot.max_words, 3);
    assert_eq!(snapshot.viewer_role, Some(PlayerRole::Challenger));

    for bad in [0, 11] {
        assert_eq!(
            setup.service.create_battle(&setup.alice, Some(bad)).await,
            Err(BattleError::InvalidMaxWords {
                requested: bad,
                max: 10
            })
        );
    }
}

#[tokio::test]
async fn test_join_rules() {
    let setup = TestBattleSetup::new();
    let created = setup.service.create_battle(&setup.alice, None).await.unwrap();

    assert_eq!(
        setup.service.join_battle(&setup.alice, created.id).await,
        Err(BattleError::CannotJoinOwnBattle)
    );

    let joined = setup.service.join_battle(&setup.bob, created.id).await.unwrap();
    assert_eq!(joined.status, BattleStatus::ReadyToStart);
    assert_eq!(joined.viewer_role, Some(PlayerRole::Opponent));

    // Same opponent retrying is a no-op
    let again = setup.service.join_battle(&setup.bob, created.id).await.unwrap();
    assert_eq!(again, joined);

    let carol = create_test_player("Carol");
    assert_eq!(
        setup.service.join_battle(&carol, created.id).await,
        Err(BattleError::AlreadyJoined)
    );

    let missing = Uuid::new_v4();
    assert_eq!(
        setup.service.join_battle(&carol, missing).await,
        Err(BattleError::not_found(missing))
    );
}

#[tokio::test]
async fn test_mark_ready_is_idempotent() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.joined_battle(3).await;

    let once = setup.service.mark_ready(&setup.alice, battle_id).await.unwrap();
    let twice = setup.service.mark_ready(&setup.alice, battle_id).await.unwrap();
    assert_eq!(once.status, BattleStatus::ChallengerReady);
    assert_eq!(once, twice);

    let outsider = create_test_player("Mallory");
    assert_eq!(
        setup.service.mark_ready(&outsider, battle_id).await,
        Err(BattleError::NotAParticipant)
    );

    let started = setup.service.mark_ready(&setup.bob, battle_id).await.unwrap();
    assert_eq!(started.status, BattleStatus::InProgress);
    assert_eq!(started.current_word_index, 0);
    assert!(started.started_at.is_some());
    assert_eq!(started.round_seconds_remaining, Some(60));

    // Readying again after the merge changes nothing
    let after = setup.service.mark_ready(&setup.bob, battle_id).await.unwrap();
    assert_eq!(after.started_at, started.started_at);
}

#[tokio::test]
async fn test_mark_ready_before_join_is_rejected() {
    let setup = TestBattleSetup::new();
    let created = setup.service.create_battle(&setup.alice, None).await.unwrap();

    assert_eq!(
        setup.service.mark_ready(&setup.alice, created.id).await,
        Err(BattleError::InvalidState {
            current_state: "waiting_for_opponent".to_string()
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ready_merges_exactly_once() {
    for _ in 0..25 {
        let setup = TestBattleSetup::new();
        let battle_id = setup.joined_battle(3).await;
        let mut events = setup.service.subscribe();

        let alice_task = {
            let service = setup.service.clone();
            let alice = setup.alice.clone();
            tokio::spawn(async move { service.mark_ready(&alice, battle_id).await })
        };
        let bob_task = {
            let service = setup.service.clone();
            let bob = setup.bob.clone();
            tokio::spawn(async move { service.mark_ready(&bob, battle_id).await })
        };
        alice_task.await.unwrap().unwrap();
        bob_task.await.unwrap().unwrap();

        let alice_view = setup
            .service
            .get_snapshot(Some(&setup.alice), battle_id)
            .await
            .unwrap();
        let bob_view = setup
            .service
            .get_snapshot(Some(&setup.bob), battle_id)
            .await
            .unwrap();
        assert_eq!(alice_view.status, BattleStatus::InProgress);
        assert_eq!(alice_view.started_at, bob_view.started_at);

        let mut started = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, BattleEvent::BattleStarted { .. }) {
                started += 1;
            }
        }
        assert_eq!(started, 1);
    }
}

#[tokio::test]
async fn test_three_round_battle_then_rematch() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(3).await;

    // Round 0: Alice first try, Bob on his third attempt
    let word = setup.current_word(battle_id).await;
    let outcome = setup
        .service
        .submit_guess(&setup.alice, battle_id, 0, &word.to_uppercase())
        .await
        .unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.round_score, Some(100));
    assert_eq!(outcome.snapshot.challenger_score, 100);
    assert_eq!(outcome.snapshot.current_word_index, 0);

    setup.solve_round(&setup.bob, battle_id, 0, 2).await;
    let snapshot = setup.snapshot(battle_id).await;
    assert_eq!(snapshot.opponent_score, 80);
    assert_eq!(snapshot.current_word_index, 1);

    setup.solve_round(&setup.alice, battle_id, 1, 0).await;
    setup.solve_round(&setup.bob, battle_id, 1, 2).await;
    setup.solve_round(&setup.alice, battle_id, 2, 3).await;
    setup.solve_round(&setup.bob, battle_id, 2, 2).await;

    let finished = setup.snapshot(battle_id).await;
    assert_eq!(finished.status, BattleStatus::Completed);
    assert_eq!(finished.challenger_score, 270);
    assert_eq!(finished.opponent_score, 240);
    assert_eq!(finished.winner, Some(Winner::Challenger));
    assert!(finished.completed_at.is_some());
    assert!(finished.current_round.is_none());

    // Bob asks for a rematch, Alice accepts
    let proposed = setup
        .service
        .propose_rematch(&setup.bob, battle_id)
        .await
        .unwrap();
    assert_eq!(proposed.status, RematchStatus::Pending);
    assert_eq!(proposed.requester_role, PlayerRole::Opponent);

    let accepted = setup
        .service
        .respond_rematch(&setup.alice, battle_id, RematchDecision::Accept)
        .await
        .unwrap();
    assert_eq!(accepted.status, RematchStatus::Accepted);
    let new_battle_id = accepted.new_challenge_id.expect("accepted rematch names a battle");

    let rematch = setup
        .service
        .get_snapshot(Some(&setup.bob), new_battle_id)
        .await
        .unwrap();
    assert_eq!(rematch.status, BattleStatus::ReadyToStart);
    assert_eq!(rematch.challenger, setup.bob);
    assert_eq!(rematch.opponent.as_ref(), Some(&setup.alice));
    assert_eq!(rematch.rematch_of, Some(battle_id));
    assert_eq!(rematch.max_words, 3);

    // Accepting again is a no-op that points at the same battle
    let again = setup
        .service
        .respond_rematch(&setup.alice, battle_id, RematchDecision::Accept)
        .await
        .unwrap();
    assert_eq!(again.new_challenge_id, Some(new_battle_id));
    assert_eq!(
        setup.service.propose_rematch(&setup.alice, battle_id).await,
        Err(BattleError::RematchAlreadyAccepted)
    );
}

#[tokio::test]
async fn test_answer_hidden_until_solved() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;
    let word = setup.current_word(battle_id).await;

    let before = setup.snapshot(battle_id).await.current_round.unwrap();
    assert_eq!(before.word, None);
    assert_eq!(before.word_length, Some(word.chars().count() as u32));

    setup.solve_round(&setup.alice, battle_id, 0, 0).await;

    let alice_view = setup.snapshot(battle_id).await.current_round.unwrap();
    assert_eq!(alice_view.word.as_deref(), Some(word.as_str()));
    assert_eq!(alice_view.challenger.progress, RoundProgress::Solved);

    let bob_view = setup
        .service
        .get_snapshot(Some(&setup.bob), battle_id)
        .await
        .unwrap()
        .current_round
        .unwrap();
    assert_eq!(bob_view.word, None);
    assert_eq!(bob_view.opponent.unwrap().progress, RoundProgress::NotStarted);

    let spectator = setup
        .service
        .get_snapshot(None, battle_id)
        .await
        .unwrap()
        .current_round
        .unwrap();
    assert_eq!(spectator.word, None);
}

#[tokio::test]
async fn test_guess_rules_within_a_round() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;

    assert_eq!(
        setup.service.submit_guess(&setup.alice, battle_id, 0, "   ").await.map(|_| ()),
        Err(BattleError::EmptyGuess)
    );
    assert_eq!(
        setup.service.submit_guess(&setup.alice, battle_id, 1, "ocean").await.map(|_| ()),
        Err(BattleError::RoundMismatch {
            requested: 1,
            current: 0
        })
    );
    let outsider = create_test_player("Mallory");
    assert_eq!(
        setup.service.submit_guess(&outsider, battle_id, 0, "ocean").await.map(|_| ()),
        Err(BattleError::NotAParticipant)
    );

    setup.solve_round(&setup.alice, battle_id, 0, 0).await;
    assert_eq!(
        setup.service.submit_guess(&setup.alice, battle_id, 0, "ocean").await.map(|_| ()),
        Err(BattleError::RoundAlreadyCompleted)
    );
}

#[tokio::test]
async fn test_attempts_exhausted_forfeits_round() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;

    for used in 1..=6 {
        let outcome = setup
            .service
            .submit_guess(&setup.alice, battle_id, 0, TestBattleSetup::wrong_guess())
            .await
            .unwrap();
        assert!(!outcome.correct);
        assert_eq!(outcome.attempts_used, used);
        assert_eq!(outcome.attempts_remaining, 6 - used);
    }
    assert_eq!(
        setup
            .service
            .submit_guess(&setup.alice, battle_id, 0, TestBattleSetup::wrong_guess())
            .await
            .map(|_| ()),
        Err(BattleError::AttemptsExhausted)
    );

    // Nothing left to spend a hint on
    assert_eq!(
        setup.service.request_hint(&setup.alice, battle_id, 0).await,
        Err(BattleError::AttemptsExhausted)
    );

    let round = setup.snapshot(battle_id).await.current_round.unwrap();
    assert_eq!(round.challenger.progress, RoundProgress::Forfeited);
    assert_eq!(round.challenger.score, Some(0));
    assert!(!round.challenger.hint_used);

    // Bob solving closes the round since Alice has nothing left to do
    setup.solve_round(&setup.bob, battle_id, 0, 0).await;
    let snapshot = setup.snapshot(battle_id).await;
    assert_eq!(snapshot.current_word_index, 1);
    assert_eq!(snapshot.challenger_score, 0);
    assert_eq!(snapshot.opponent_score, 100);
}

#[tokio::test]
async fn test_round_expiry_is_server_timed() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;

    // Exactly at the limit the round is still open
    setup.advance(60);
    let outcome = setup
        .service
        .submit_guess(&setup.alice, battle_id, 0, TestBattleSetup::wrong_guess())
        .await
        .unwrap();
    assert_eq!(outcome.snapshot.round_seconds_remaining, Some(0));

    setup.advance(1);
    assert_eq!(
        setup
            .service
            .submit_guess(&setup.bob, battle_id, 0, "ocean")
            .await
            .map(|_| ()),
        Err(BattleError::RoundExpired)
    );

    // The expiry was applied and persisted: round 1 started at the deadline
    let snapshot = setup.snapshot(battle_id).await;
    assert_eq!(snapshot.current_word_index, 1);
    assert_eq!(snapshot.round_seconds_remaining, Some(59));
}

#[tokio::test]
async fn test_stalled_opponent_does_not_block_progress() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(3).await;

    setup.solve_round(&setup.alice, battle_id, 0, 0).await;
    setup.solve_round(&setup.bob, battle_id, 0, 0).await;

    // Bob walks away during round 1
    setup.solve_round(&setup.alice, battle_id, 1, 0).await;
    setup.advance(61);

    // Alice's next action discovers the expiry and plays on in round 2
    let word = setup.current_word(battle_id).await;
    let outcome = setup
        .service
        .submit_guess(&setup.alice, battle_id, 2, &word)
        .await
        .unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.snapshot.current_word_index, 2);

    let round_one = setup
        .service
        .get_round_detail(Some(&setup.alice), battle_id, 1)
        .await
        .unwrap();
    assert_eq!(round_one.opponent.as_ref().unwrap().progress, RoundProgress::Forfeited);
    assert_eq!(round_one.opponent.unwrap().score, Some(0));

    assert_eq!(
        setup.service.submit_guess(&setup.bob, battle_id, 1, "ocean").await.map(|_| ()),
        Err(BattleError::RoundExpired)
    );

    // And round 2 lapses too: the battle completes without Bob
    setup.advance(61);
    let finished = setup.snapshot(battle_id).await;
    assert_eq!(finished.status, BattleStatus::Completed);
    assert_eq!(finished.opponent_score, 100);
    assert_eq!(finished.winner, Some(Winner::Challenger));
}

#[tokio::test]
async fn test_abandoned_battle_completes_on_next_read() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(3).await;

    setup.advance(600);
    let snapshot = setup.snapshot(battle_id).await;
    assert_eq!(snapshot.status, BattleStatus::Completed);
    assert_eq!(snapshot.winner, Some(Winner::Tie));
    assert_eq!(snapshot.current_word_index, 3);

    let stored = setup.store.get_battle(battle_id).await.unwrap().unwrap();
    assert_eq!(stored.status, BattleStatus::Completed);
    assert_eq!(
        stored.completed_at,
        stored.started_at.map(|s| s + TimeDelta::seconds(180))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_solves_merge_round() {
    for _ in 0..25 {
        let setup = TestBattleSetup::new();
        let battle_id = setup.started_battle(2).await;
        let word = setup.current_word(battle_id).await;

        let mut tasks = Vec::new();
        for player in [setup.alice.clone(), setup.bob.clone()] {
            let service = setup.service.clone();
            let word = word.clone();
            tasks.push(tokio::spawn(async move {
                service.submit_guess(&player, battle_id, 0, &word).await
            }));
        }
        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().unwrap().correct);
        }

        let snapshot = setup.snapshot(battle_id).await;
        assert_eq!(snapshot.challenger_score, 100);
        assert_eq!(snapshot.opponent_score, 100);
        assert_eq!(snapshot.current_word_index, 1);
    }
}

#[tokio::test]
async fn test_hint_is_one_shot() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;

    let hint = setup
        .service
        .request_hint(&setup.alice, battle_id, 0)
        .await
        .unwrap();
    assert_eq!(hint.kind, AssistKind::Hint);
    let stored = setup.store.get_round_word(battle_id, 0).await.unwrap().unwrap();
    assert_eq!(Some(hint.text.clone()), stored.hint_text);

    for _ in 0..3 {
        assert_eq!(
            setup.service.request_hint(&setup.alice, battle_id, 0).await,
            Err(BattleError::AssistAlreadyUsed {
                kind: AssistKind::Hint
            })
        );
    }

    // Other kinds and the other player are unaffected
    setup.service.request_clue(&setup.alice, battle_id, 0).await.unwrap();
    setup.service.request_hint(&setup.bob, battle_id, 0).await.unwrap();

    // Still spent after the round closes
    setup.advance(61);
    assert_eq!(
        setup.service.request_hint(&setup.alice, battle_id, 0).await,
        Err(BattleError::AssistAlreadyUsed {
            kind: AssistKind::Hint
        })
    );
}

#[tokio::test]
async fn test_assist_text_only_shown_to_its_user() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;

    let clue = setup
        .service
        .request_clue(&setup.alice, battle_id, 0)
        .await
        .unwrap();

    let alice_round = setup.snapshot(battle_id).await.current_round.unwrap();
    assert_eq!(alice_round.clue_text.as_deref(), Some(clue.text.as_str()));
    assert_eq!(alice_round.hint_text, None);
    assert!(alice_round.challenger.clue_used);

    let bob_round = setup
        .service
        .get_snapshot(Some(&setup.bob), battle_id)
        .await
        .unwrap()
        .current_round
        .unwrap();
    assert_eq!(bob_round.clue_text, None);
}

#[tokio::test]
async fn test_assists_reduce_score() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;

    setup.service.request_hint(&setup.alice, battle_id, 0).await.unwrap();
    let invite = setup
        .service
        .use_invite_friend(&setup.alice, battle_id, 0)
        .await
        .unwrap();
    assert_eq!(invite.text, format!("{battle_id}:0:challenger"));

    let word = setup.current_word(battle_id).await;
    let outcome = setup
        .service
        .submit_guess(&setup.alice, battle_id, 0, &word)
        .await
        .unwrap();
    assert_eq!(outcome.round_score, Some(70));

    assert_eq!(
        setup.service.request_clue(&setup.alice, battle_id, 0).await,
        Err(BattleError::RoundAlreadyCompleted)
    );
}

#[tokio::test]
async fn test_draft_guess_is_private_and_free() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;

    setup
        .service
        .update_draft_guess(&setup.alice, battle_id, 0, "oce")
        .await
        .unwrap();

    let alice_round = setup.snapshot(battle_id).await.current_round.unwrap();
    assert_eq!(alice_round.challenger.current_guess.as_deref(), Some("oce"));
    assert_eq!(alice_round.challenger.attempts_used, 0);

    let bob_round = setup
        .service
        .get_snapshot(Some(&setup.bob), battle_id)
        .await
        .unwrap()
        .current_round
        .unwrap();
    assert_eq!(bob_round.challenger.current_guess, None);

    setup.advance(61);
    assert_eq!(
        setup
            .service
            .update_draft_guess(&setup.alice, battle_id, 0, "ocea")
            .await,
        Err(BattleError::RoundExpired)
    );
}

#[tokio::test]
async fn test_round_detail_history() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;
    let word = setup.current_word(battle_id).await;

    setup.solve_round(&setup.alice, battle_id, 0, 1).await;
    setup.solve_round(&setup.bob, battle_id, 0, 0).await;

    // Round 0 is closed, so its word is public
    let detail = setup
        .service
        .get_round_detail(None, battle_id, 0)
        .await
        .unwrap();
    assert_eq!(detail.word.as_deref(), Some(word.as_str()));
    assert_eq!(detail.challenger.attempts_used, 2);
    assert_eq!(detail.challenger.score, Some(90));
    assert_eq!(detail.opponent.unwrap().score, Some(100));

    // Not reached yet
    assert!(matches!(
        setup.service.get_round_detail(None, battle_id, 2).await,
        Err(BattleError::RoundMismatch { .. })
    ));
}

async fn completed_battle(setup: &TestBattleSetup) -> uuid::Uuid {
    let battle_id = setup.started_battle(1).await;
    setup.advance(61);
    assert_eq!(setup.snapshot(battle_id).await.status, BattleStatus::Completed);
    battle_id
}

#[tokio::test]
async fn test_rematch_preconditions() {
    let setup = TestBattleSetup::new();

    let live = setup.started_battle(1).await;
    assert!(matches!(
        setup.service.propose_rematch(&setup.alice, live).await,
        Err(BattleError::InvalidState { .. })
    ));

    let battle_id = completed_battle(&setup).await;
    assert_eq!(
        setup
            .service
            .respond_rematch(&setup.bob, battle_id, RematchDecision::Accept)
            .await,
        Err(BattleError::RematchNotFound)
    );

    setup.service.propose_rematch(&setup.alice, battle_id).await.unwrap();
    assert_eq!(
        setup.service.propose_rematch(&setup.bob, battle_id).await,
        Err(BattleError::RematchAlreadyPending)
    );
    assert_eq!(
        setup
            .service
            .respond_rematch(&setup.alice, battle_id, RematchDecision::Accept)
            .await,
        Err(BattleError::NotRematchRecipient)
    );
    let outsider = create_test_player("Mallory");
    assert_eq!(
        setup.service.propose_rematch(&outsider, battle_id).await,
        Err(BattleError::NotAParticipant)
    );
}

#[tokio::test]
async fn test_declined_rematch_can_be_proposed_again() {
    let setup = TestBattleSetup::new();
    let battle_id = completed_battle(&setup).await;

    setup.service.propose_rematch(&setup.alice, battle_id).await.unwrap();
    let declined = setup
        .service
        .respond_rematch(&setup.bob, battle_id, RematchDecision::Decline)
        .await
        .unwrap();
    assert_eq!(declined.status, RematchStatus::Declined);
    assert_eq!(declined.new_challenge_id, None);

    assert_eq!(
        setup
            .service
            .respond_rematch(&setup.bob, battle_id, RematchDecision::Accept)
            .await,
        Err(BattleError::RematchNotPending)
    );

    let second = setup.service.propose_rematch(&setup.bob, battle_id).await.unwrap();
    assert_eq!(second.status, RematchStatus::Pending);
    let latest = setup.service.get_rematch_status(battle_id).await.unwrap();
    assert_eq!(latest.map(|r| r.id), Some(second.id));
}

#[tokio::test]
async fn test_rematch_expires_lazily() {
    let setup = TestBattleSetup::new();
    let battle_id = completed_battle(&setup).await;

    let proposed = setup.service.propose_rematch(&setup.alice, battle_id).await.unwrap();
    setup.advance(301);

    assert_eq!(
        setup
            .service
            .respond_rematch(&setup.bob, battle_id, RematchDecision::Accept)
            .await,
        Err(BattleError::RematchExpired)
    );

    let status = setup
        .service
        .get_rematch_status(battle_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.id, proposed.id);
    assert_eq!(status.status, RematchStatus::Expired);

    // Expired requests do not block a fresh proposal
    setup.service.propose_rematch(&setup.bob, battle_id).await.unwrap();
}

#[tokio::test]
async fn test_completed_listing_and_moderation() {
    let setup = TestBattleSetup::new();
    let first = completed_battle(&setup).await;
    let second = completed_battle(&setup).await;
    let _live = setup.started_battle(1).await;

    let listed = setup.service.list_completed_battles(None, None).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![first, second]);
    assert_eq!(listed[0].winner, Some(Winner::Tie));

    let limited = setup
        .service
        .list_completed_battles(None, Some(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    let hide = ModerationUpdate {
        hidden: Some(true),
        deleted: None,
    };
    assert_eq!(
        setup.service.moderate_battle(None, first, &hide).await,
        Err(BattleError::Unauthorized)
    );
    assert_eq!(
        setup
            .service
            .moderate_battle(Some("wrong"), first, &hide)
            .await,
        Err(BattleError::Unauthorized)
    );

    let hidden = setup
        .service
        .moderate_battle(Some(ADMIN_TOKEN), first, &hide)
        .await
        .unwrap();
    assert!(hidden.hidden);
    let listed = setup.service.list_completed_battles(None, None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, second);

    // Hidden battles are still reachable directly
    setup.snapshot(first).await;

    let delete = ModerationUpdate {
        hidden: None,
        deleted: Some(true),
    };
    setup
        .service
        .moderate_battle(Some(ADMIN_TOKEN), second, &delete)
        .await
        .unwrap();
    assert_eq!(
        setup.service.get_snapshot(None, second).await,
        Err(BattleError::not_found(second))
    );
    assert!(setup
        .service
        .list_completed_battles(None, None)
        .await
        .unwrap()
        .is_empty());

    // Deletion is reversible by an admin
    let restored = setup
        .service
        .moderate_battle(
            Some(ADMIN_TOKEN),
            second,
            &ModerationUpdate {
                hidden: None,
                deleted: Some(false),
            },
        )
        .await
        .unwrap();
    assert!(!restored.deleted);
}

#[tokio::test]
async fn test_lifecycle_events_published() {
    let setup = TestBattleSetup::new();
    let mut events = setup.service.subscribe();

    let battle_id = setup.started_battle(1).await;
    setup.solve_round(&setup.alice, battle_id, 0, 0).await;
    setup.solve_round(&setup.bob, battle_id, 0, 0).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.battle_id(), battle_id);
        seen.push(event);
    }

    assert!(matches!(seen[0], BattleEvent::BattleCreated { .. }));
    assert!(seen.iter().any(|e| matches!(e, BattleEvent::OpponentJoined { .. })));
    assert!(seen.iter().any(|e| matches!(
        e,
        BattleEvent::PlayerReady {
            role: PlayerRole::Challenger,
            ..
        }
    )));
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, BattleEvent::BattleStarted { .. }))
            .count(),
        1
    );
    assert!(matches!(
        seen.last(),
        Some(BattleEvent::BattleCompleted {
            winner: Winner::Tie,
            challenger_score: 100,
            opponent_score: 100,
            ..
        })
    ));
}

#[tokio::test]
async fn test_full_battle_on_sql_store() {
    let db = connect_to_memory_database().await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let setup = TestBattleSetup::with_store(Arc::new(SqlStore::new(db)));

    let battle_id = setup.started_battle(2).await;
    setup.solve_round(&setup.alice, battle_id, 0, 0).await;
    setup.solve_round(&setup.bob, battle_id, 0, 1).await;
    setup.service.request_hint(&setup.bob, battle_id, 1).await.unwrap();
    setup.solve_round(&setup.bob, battle_id, 1, 0).await;
    setup.advance(61);

    let finished = setup.snapshot(battle_id).await;
    assert_eq!(finished.status, BattleStatus::Completed);
    assert_eq!(finished.challenger_score, 100);
    assert_eq!(finished.opponent_score, 90 + 85);
    assert_eq!(finished.winner, Some(Winner::Opponent));

    let listed = setup.service.list_completed_battles(None, None).await.unwrap();
    assert_eq!(listed.len(), 1);
}

/// Memory store whose battle writes can be made to lose their race a set
/// number of times.
#[derive(Default)]
struct ContendedBattleStore {
    inner: MemoryStore,
    battle_write_failures: AtomicUsize,
}

impl ContendedBattleStore {
    fn fail_battle_writes(&self, times: usize) {
        self.battle_write_failures.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl BattleStore for ContendedBattleStore {
    async fn insert_battle(&self, battle: &Battle) -> Result<Battle, StoreError> {
        self.inner.insert_battle(battle).await
    }

    async fn get_battle(&self, id: BattleId) -> Result<Option<Battle>, StoreError> {
        self.inner.get_battle(id).await
    }

    async fn update_battle(&self, battle: &Battle) -> Result<Battle, StoreError> {
        let failed = self
            .battle_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Conflict);
        }
        self.inner.update_battle(battle).await
    }

    async fn list_completed_battles(
        &self,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Battle>, StoreError> {
        self.inner.list_completed_battles(since, limit).await
    }

    async fn insert_attempt(&self, attempt: &RoundAttempt) -> Result<RoundAttempt, StoreError> {
        self.inner.insert_attempt(attempt).await
    }

    async fn get_attempt(
        &self,
        battle_id: BattleId,
        round_index: u32,
        role: PlayerRole,
    ) -> Result<Option<RoundAttempt>, StoreError> {
        self.inner.get_attempt(battle_id, round_index, role).await
    }

    async fn update_attempt(&self, attempt: &RoundAttempt) -> Result<RoundAttempt, StoreError> {
        self.inner.update_attempt(attempt).await
    }

    async fn list_round_attempts(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<Vec<RoundAttempt>, StoreError> {
        self.inner.list_round_attempts(battle_id, round_index).await
    }

    async fn insert_round_word(&self, word: &RoundWord) -> Result<RoundWord, StoreError> {
        self.inner.insert_round_word(word).await
    }

    async fn get_round_word(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<Option<RoundWord>, StoreError> {
        self.inner.get_round_word(battle_id, round_index).await
    }

    async fn set_assist_text(
        &self,
        battle_id: BattleId,
        round_index: u32,
        kind: AssistKind,
        text: &str,
    ) -> Result<RoundWord, StoreError> {
        self.inner
            .set_assist_text(battle_id, round_index, kind, text)
            .await
    }

    async fn insert_rematch(&self, request: &RematchRequest) -> Result<RematchRequest, StoreError> {
        self.inner.insert_rematch(request).await
    }

    async fn update_rematch(&self, request: &RematchRequest) -> Result<RematchRequest, StoreError> {
        self.inner.update_rematch(request).await
    }

    async fn list_rematches(&self, battle_id: BattleId) -> Result<Vec<RematchRequest>, StoreError> {
        self.inner.list_rematches(battle_id).await
    }
}

/// A started two-word battle on a store that will reject the next eight
/// battle writes, enough to exhaust one operation's retries.
async fn battle_with_failing_settle() -> (TestBattleSetup, BattleId, String) {
    let store = Arc::new(ContendedBattleStore::default());
    let setup = TestBattleSetup::with_store(store.clone());
    let battle_id = setup.started_battle(2).await;
    let word = setup.current_word(battle_id).await;
    store.fail_battle_writes(8);

    assert_eq!(
        setup
            .service
            .submit_guess(&setup.alice, battle_id, 0, &word)
            .await
            .map(|_| ()),
        Err(BattleError::Conflict)
    );
    // The solve is recorded but the battle has not been credited
    let attempt = setup
        .store
        .get_attempt(battle_id, 0, PlayerRole::Challenger)
        .await
        .unwrap()
        .unwrap();
    assert!(attempt.completed);
    assert_eq!(setup.snapshot(battle_id).await.challenger_score, 0);

    (setup, battle_id, word)
}

#[tokio::test]
async fn test_retry_after_failed_settle_credits_solve_once() {
    let (setup, battle_id, word) = battle_with_failing_settle().await;

    let outcome = setup
        .service
        .submit_guess(&setup.alice, battle_id, 0, &word)
        .await
        .unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.round_score, Some(100));
    assert_eq!(outcome.attempts_used, 1);
    assert_eq!(outcome.snapshot.challenger_score, 100);
    assert_eq!(outcome.snapshot.current_word_index, 0);

    // Once credited, a further retry is an ordinary repeat
    assert_eq!(
        setup
            .service
            .submit_guess(&setup.alice, battle_id, 0, &word)
            .await
            .map(|_| ()),
        Err(BattleError::RoundAlreadyCompleted)
    );

    setup.solve_round(&setup.bob, battle_id, 0, 0).await;
    let snapshot = setup.snapshot(battle_id).await;
    assert_eq!(snapshot.current_word_index, 1);
    assert_eq!(snapshot.challenger_score, 100);
    assert_eq!(snapshot.opponent_score, 100);
}

#[tokio::test]
async fn test_other_players_settle_credits_missed_solve() {
    let (setup, battle_id, _) = battle_with_failing_settle().await;

    // Alice never retries; Bob finishing the round carries her result
    setup.solve_round(&setup.bob, battle_id, 0, 1).await;
    let snapshot = setup.snapshot(battle_id).await;
    assert_eq!(snapshot.current_word_index, 1);
    assert_eq!(snapshot.challenger_score, 100);
    assert_eq!(snapshot.opponent_score, 90);

    // Alice's late retry finds nothing left to credit
    assert_eq!(
        setup
            .service
            .submit_guess(&setup.alice, battle_id, 0, "ocean")
            .await
            .map(|_| ()),
        Err(BattleError::RoundAlreadyCompleted)
    );
    assert_eq!(setup.snapshot(battle_id).await.challenger_score, 100);
}

#[tokio::test]
async fn test_battle_view_reads_without_writing() {
    let setup = TestBattleSetup::new();
    let battle_id = setup.started_battle(2).await;
    setup.advance(61);

    let view = setup.service.battle_view(battle_id).await.unwrap();
    assert_eq!(view.battle().current_word_index, 1);
    let for_alice = view.snapshot_for(Some(&setup.alice));
    let for_spectator = view.snapshot_for(None);
    assert_eq!(for_alice.viewer_role, Some(PlayerRole::Challenger));
    assert_eq!(for_spectator.viewer_role, None);
    assert_eq!(for_alice.current_round.and_then(|r| r.word_length), None);

    // The expiry stays derived and round 1 has no word yet
    let stored = setup.store.get_battle(battle_id).await.unwrap().unwrap();
    assert_eq!(stored.current_word_index, 0);
    assert!(setup.store.get_round_word(battle_id, 1).await.unwrap().is_none());

    // An ordinary read persists both
    setup.snapshot(battle_id).await;
    let stored = setup.store.get_battle(battle_id).await.unwrap().unwrap();
    assert_eq!(stored.current_word_index, 1);
    assert!(setup.store.get_round_word(battle_id, 1).await.unwrap().is_some());
}
