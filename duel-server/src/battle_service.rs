use std::sync::Arc;

use chrono::{DateTime, Utc};
use duel_core::{
    battle_machine, battle_snapshot, check_round_open, derive_effective_state,
    effective_rematch, fallback_assist_text, fallback_round_word, is_forward_transition,
    normalize_word, rematch, round_detail, settle_round, transition_events, BattleEvent,
    BattleRules, Clock, WordSource,
};
use duel_persistence::{BattleStore, StoreError};
use duel_types::{
    AssistKind, AssistOutcome, Battle, BattleError, BattleId, BattleSnapshot, BattleStatus,
    CompletedBattleSummary, GuessOutcome, ModerationUpdate, PlayerId, PlayerIdentity, PlayerRole,
    RematchDecision, RematchRequest, RematchStatus, RoundAttempt, RoundDetail, RoundWord,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_MAX_RETRIES: usize = 8;
const EVENT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_COMPLETED_LIMIT: u64 = 20;
pub const MAX_COMPLETED_LIMIT: u64 = 100;

fn store_err(err: StoreError) -> BattleError {
    if !matches!(err, StoreError::Conflict) {
        error!("Storage failure: {}", err);
    }
    err.into()
}

fn participant(battle: &Battle, player: &PlayerIdentity) -> Result<PlayerRole, BattleError> {
    battle.role_of(player.id).ok_or(BattleError::NotAParticipant)
}

/// One read of a battle, projected for any number of viewers.
pub struct BattleView {
    battle: Battle,
    attempts: Vec<RoundAttempt>,
    word: Option<RoundWord>,
    rules: BattleRules,
    now: DateTime<Utc>,
}

impl BattleView {
    pub fn battle(&self) -> &Battle {
        &self.battle
    }

    pub fn snapshot_for(&self, viewer: Option<&PlayerIdentity>) -> BattleSnapshot {
        battle_snapshot(
            &self.battle,
            &self.attempts,
            self.word.as_ref(),
            viewer.map(|v| v.id),
            &self.rules,
            self.now,
        )
    }
}

/// Orchestrates battle operations over a [`BattleStore`].
///
/// Holds no per-battle state of its own: every operation reads the persisted
/// documents, applies a pure transition from `duel-core` as of one clock
/// reading, and writes back conditionally, re-reading on a lost race.
pub struct BattleService {
    store: Arc<dyn BattleStore>,
    words: Arc<dyn WordSource>,
    clock: Arc<dyn Clock>,
    rules: BattleRules,
    events: broadcast::Sender<BattleEvent>,
    admin_token: Option<String>,
    max_retries: usize,
}

impl BattleService {
    pub fn new(
        store: Arc<dyn BattleStore>,
        words: Arc<dyn WordSource>,
        clock: Arc<dyn Clock>,
        rules: BattleRules,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            words,
            clock,
            rules,
            events,
            admin_token: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_admin_token(mut self, admin_token: Option<String>) -> Self {
        self.admin_token = admin_token;
        self
    }

    pub fn rules(&self) -> &BattleRules {
        &self.rules
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BattleEvent> {
        self.events.subscribe()
    }

    fn publish(&self, events: impl IntoIterator<Item = BattleEvent>) {
        for event in events {
            debug!("Publishing {:?}", event);
            // Nobody listening is fine
            let _ = self.events.send(event);
        }
    }

    fn announce(&self, before: &Battle, after: &Battle) {
        let events = transition_events(before, after);
        for event in &events {
            match event {
                BattleEvent::OpponentJoined { .. } => {
                    if let Some(opponent) = &after.opponent {
                        info!("{} joined battle {}", opponent.display_name, after.id);
                    }
                }
                BattleEvent::BattleStarted { .. } => info!("Battle {} started", after.id),
                BattleEvent::RoundAdvanced { round_index, .. } => {
                    info!("Battle {} advanced to round {}", after.id, round_index)
                }
                BattleEvent::BattleCompleted {
                    winner,
                    challenger_score,
                    opponent_score,
                    ..
                } => info!(
                    "Battle {} completed, winner {} ({} - {})",
                    after.id,
                    winner.as_str(),
                    challenger_score,
                    opponent_score
                ),
                _ => {}
            }
        }
        self.publish(events);
    }

    async fn load_battle(&self, battle_id: BattleId) -> Result<Battle, BattleError> {
        match self.store.get_battle(battle_id).await.map_err(store_err)? {
            Some(battle) if !battle.deleted => Ok(battle),
            _ => Err(BattleError::not_found(battle_id)),
        }
    }

    /// Read-apply-write loop for the battle document. `apply` sees the
    /// effective state (lapsed rounds already closed) and returns `None` when
    /// there is nothing to change; pending expiries are still persisted.
    async fn transition<F>(
        &self,
        battle_id: BattleId,
        now: DateTime<Utc>,
        mut apply: F,
    ) -> Result<Battle, BattleError>
    where
        F: FnMut(&Battle) -> Result<Option<Battle>, BattleError>,
    {
        for retry in 0..self.max_retries {
            let stored = self.load_battle(battle_id).await?;
            let effective = derive_effective_state(&stored, &self.rules, now);
            let next = match apply(&effective)? {
                Some(next) => next,
                None if effective != stored => effective,
                None => return Ok(stored),
            };

            if !is_forward_transition(&stored, &next) {
                error!("Refusing backwards transition of battle {}", battle_id);
                return Err(BattleError::InvalidState {
                    current_state: stored.status.to_string(),
                });
            }

            match self.store.update_battle(&next).await {
                Ok(saved) => {
                    self.announce(&stored, &saved);
                    return Ok(saved);
                }
                Err(StoreError::Conflict) => {
                    debug!("Battle {} write conflict, retry {}", battle_id, retry + 1);
                }
                Err(err) => return Err(store_err(err)),
            }
        }
        warn!("Battle {} still contended after {} retries", battle_id, self.max_retries);
        Err(BattleError::Conflict)
    }

    /// Current effective state, persisting any expiry it implies.
    async fn observe(&self, battle_id: BattleId, now: DateTime<Utc>) -> Result<Battle, BattleError> {
        self.transition(battle_id, now, |_| Ok(None)).await
    }

    /// The word for a round, generated and stored on first use. Both players
    /// always get the stored record.
    async fn round_word(&self, battle_id: BattleId, round_index: u32) -> Result<RoundWord, BattleError> {
        if let Some(word) = self
            .store
            .get_round_word(battle_id, round_index)
            .await
            .map_err(store_err)?
        {
            return Ok(word);
        }

        let generated = match self.words.round_word(battle_id, round_index).await {
            Ok(generated) if !normalize_word(&generated.word).is_empty() => generated,
            Ok(_) => {
                warn!("Word source returned an empty word for battle {} round {}", battle_id, round_index);
                fallback_round_word(battle_id, round_index)
            }
            Err(err) => {
                warn!(
                    "Word source failed for battle {} round {}: {}; using fallback",
                    battle_id, round_index, err
                );
                fallback_round_word(battle_id, round_index)
            }
        };

        let record = RoundWord {
            id: Uuid::new_v4(),
            battle_id,
            round_index,
            word: normalize_word(&generated.word),
            hint_text: generated.hint_text,
            clue_text: generated.clue_text,
            created_at: self.clock.now(),
        };

        match self.store.insert_round_word(&record).await {
            Ok(saved) => Ok(saved),
            // Lost the race; use the winner's word
            Err(StoreError::Conflict) => self
                .store
                .get_round_word(battle_id, round_index)
                .await
                .map_err(store_err)?
                .ok_or(BattleError::Conflict),
            Err(err) => Err(store_err(err)),
        }
    }

    async fn assist_text(&self, word: &RoundWord, kind: AssistKind) -> Result<String, BattleError> {
        let stored = match kind {
            AssistKind::Hint => word.hint_text.clone(),
            AssistKind::Clue => word.clue_text.clone(),
            AssistKind::InviteFriend => None,
        };
        if let Some(text) = stored {
            return Ok(text);
        }

        let text = match self.words.assist_text(&word.word, kind).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback_assist_text(kind),
            Err(err) => {
                warn!("Word source could not produce a {}: {}; using fallback", kind, err);
                fallback_assist_text(kind)
            }
        };

        let saved = self
            .store
            .set_assist_text(word.battle_id, word.round_index, kind, &text)
            .await
            .map_err(store_err)?;
        let stored = match kind {
            AssistKind::Hint => saved.hint_text,
            AssistKind::Clue => saved.clue_text,
            AssistKind::InviteFriend => None,
        };
        Ok(stored.unwrap_or(text))
    }

    /// Read-apply-write loop for the caller's own attempt record, creating it
    /// on first use.
    async fn update_attempt_with<T, F>(
        &self,
        battle: &Battle,
        role: PlayerRole,
        round_index: u32,
        word: &RoundWord,
        now: DateTime<Utc>,
        mut apply: F,
    ) -> Result<(RoundAttempt, T), BattleError>
    where
        F: FnMut(&RoundAttempt) -> Result<(RoundAttempt, T), BattleError>,
    {
        let ledger = self.rules.ledger();
        let player_id = battle
            .player(role)
            .map(|p| p.id)
            .ok_or(BattleError::NotAParticipant)?;

        for retry in 0..self.max_retries {
            let current = match self
                .store
                .get_attempt(battle.id, round_index, role)
                .await
                .map_err(store_err)?
            {
                Some(existing) => existing,
                None => {
                    let fresh =
                        ledger.new_attempt(battle.id, round_index, word.id, role, player_id, now);
                    match self.store.insert_attempt(&fresh).await {
                        Ok(saved) => saved,
                        Err(StoreError::Conflict) => continue,
                        Err(err) => return Err(store_err(err)),
                    }
                }
            };

            let (next, output) = apply(&current)?;
            match self.store.update_attempt(&next).await {
                Ok(saved) => return Ok((saved, output)),
                Err(StoreError::Conflict) => {
                    debug!(
                        "Attempt {} write conflict, retry {}",
                        current.id,
                        retry + 1
                    );
                }
                Err(err) => return Err(store_err(err)),
            }
        }
        Err(BattleError::Conflict)
    }

    /// Fold a settled attempt into the battle, together with the other
    /// player's result for the round when that is settled too. Each result is
    /// credited at most once, so this may be re-run after a failed write.
    async fn credit_round(
        &self,
        battle_id: BattleId,
        attempt: &RoundAttempt,
        now: DateTime<Utc>,
    ) -> Result<Battle, BattleError> {
        let ledger = self.rules.ledger();
        let round_index = attempt.round_index;
        // Our attempt is already stored, so if the other player settles
        // concurrently at least one of us sees both settled.
        let other = self
            .store
            .get_attempt(battle_id, round_index, attempt.role.other())
            .await
            .map_err(store_err)?;
        let settled: Vec<(PlayerRole, u32)> = std::iter::once(attempt)
            .chain(other.as_ref())
            .filter_map(|a| ledger.settlement(a))
            .collect();

        self.transition(battle_id, now, |current| {
            Ok(settle_round(current, round_index, &settled, now))
        })
        .await
    }

    async fn snapshot_of(
        &self,
        battle: &Battle,
        viewer: Option<PlayerId>,
        now: DateTime<Utc>,
    ) -> Result<BattleSnapshot, BattleError> {
        if battle.status != BattleStatus::InProgress {
            return Ok(battle_snapshot(battle, &[], None, viewer, &self.rules, now));
        }

        let round = battle.current_word_index;
        let word = self.round_word(battle.id, round).await?;
        let attempts = self
            .store
            .list_round_attempts(battle.id, round)
            .await
            .map_err(store_err)?;
        Ok(battle_snapshot(battle, &attempts, Some(&word), viewer, &self.rules, now))
    }

    pub async fn create_battle(
        &self,
        challenger: &PlayerIdentity,
        max_words: Option<u32>,
    ) -> Result<BattleSnapshot, BattleError> {
        let now = self.clock.now();
        let battle =
            battle_machine::create_battle(Uuid::new_v4(), challenger.clone(), max_words, &self.rules, now)?;
        let saved = self.store.insert_battle(&battle).await.map_err(store_err)?;

        info!(
            "{} created battle {} with {} words",
            challenger.display_name, saved.id, saved.max_words
        );
        self.publish([BattleEvent::BattleCreated { battle_id: saved.id }]);
        self.snapshot_of(&saved, Some(challenger.id), now).await
    }

    pub async fn join_battle(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
    ) -> Result<BattleSnapshot, BattleError> {
        let now = self.clock.now();
        let battle = self
            .transition(battle_id, now, |current| battle_machine::apply_join(current, player))
            .await?;
        self.snapshot_of(&battle, Some(player.id), now).await
    }

    pub async fn mark_ready(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
    ) -> Result<BattleSnapshot, BattleError> {
        let now = self.clock.now();
        let battle = self
            .transition(battle_id, now, |current| {
                let role = participant(current, player)?;
                battle_machine::apply_ready(current, role, now)
            })
            .await?;
        self.snapshot_of(&battle, Some(player.id), now).await
    }

    pub async fn submit_guess(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
        round_index: u32,
        guess: &str,
    ) -> Result<GuessOutcome, BattleError> {
        let now = self.clock.now();
        let ledger = self.rules.ledger();
        let battle = self.observe(battle_id, now).await?;
        let role = participant(&battle, player)?;

        let existing = self
            .store
            .get_attempt(battle_id, round_index, role)
            .await
            .map_err(store_err)?;
        if let Some(attempt) = existing
            .as_ref()
            .filter(|a| ledger.is_settled(a) && !battle.is_credited(role, round_index))
        {
            // Recorded by an earlier call whose battle write never landed
            warn!(
                "Crediting {}'s unsettled result for round {} of battle {}",
                player.display_name, round_index, battle_id
            );
            let battle = self.credit_round(battle_id, attempt, now).await?;
            let snapshot = self.snapshot_of(&battle, Some(player.id), now).await?;
            return Ok(GuessOutcome {
                correct: attempt.completed,
                round_index,
                attempts_used: attempt.attempts_used,
                attempts_remaining: ledger.attempts_remaining(attempt),
                round_score: attempt.score,
                snapshot,
            });
        }
        check_round_open(&battle, round_index, existing.as_ref())?;
        if let Some(attempt) = &existing {
            ledger.check_can_guess(attempt)?;
        }
        if normalize_word(guess).is_empty() {
            return Err(BattleError::EmptyGuess);
        }
        let round_started = battle
            .current_round_start_time
            .ok_or_else(|| BattleError::InvalidState {
                current_state: battle.status.to_string(),
            })?;

        let word = self.round_word(battle_id, round_index).await?;
        let (attempt, evaluation) = self
            .update_attempt_with(&battle, role, round_index, &word, now, |current| {
                ledger.record_guess(current, guess, &word.word, round_started, now)
            })
            .await?;

        self.publish([BattleEvent::AttemptRecorded {
            battle_id,
            role,
            round_index,
            solved: attempt.completed,
        }]);

        let battle = if ledger.is_settled(&attempt) {
            let points = attempt.score.unwrap_or(0);
            if attempt.completed {
                info!(
                    "{} solved round {} of battle {} for {} points",
                    player.display_name, round_index, battle_id, points
                );
            } else {
                info!(
                    "{} ran out of attempts in round {} of battle {}",
                    player.display_name, round_index, battle_id
                );
            }

            self.credit_round(battle_id, &attempt, now).await?
        } else {
            battle
        };

        let snapshot = self.snapshot_of(&battle, Some(player.id), now).await?;
        Ok(GuessOutcome {
            correct: evaluation.correct,
            round_index,
            attempts_used: attempt.attempts_used,
            attempts_remaining: ledger.attempts_remaining(&attempt),
            round_score: attempt.score,
            snapshot,
        })
    }

    /// Save in-progress guess text without spending an attempt.
    pub async fn update_draft_guess(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
        round_index: u32,
        text: &str,
    ) -> Result<(), BattleError> {
        let now = self.clock.now();
        let ledger = self.rules.ledger();
        let battle = self.observe(battle_id, now).await?;
        let role = participant(&battle, player)?;

        let existing = self
            .store
            .get_attempt(battle_id, round_index, role)
            .await
            .map_err(store_err)?;
        check_round_open(&battle, round_index, existing.as_ref())?;

        let word = self.round_word(battle_id, round_index).await?;
        self.update_attempt_with(&battle, role, round_index, &word, now, |current| {
            ledger.record_draft(current, text, now).map(|next| (next, ()))
        })
        .await?;
        Ok(())
    }

    pub async fn request_hint(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<AssistOutcome, BattleError> {
        self.request_assist(player, battle_id, round_index, AssistKind::Hint)
            .await
    }

    pub async fn request_clue(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<AssistOutcome, BattleError> {
        self.request_assist(player, battle_id, round_index, AssistKind::Clue)
            .await
    }

    /// Spend the invite-friend assist. The returned text is the invite code
    /// the external invite flow hands out.
    pub async fn use_invite_friend(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<AssistOutcome, BattleError> {
        self.request_assist(player, battle_id, round_index, AssistKind::InviteFriend)
            .await
    }

    async fn request_assist(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
        round_index: u32,
        kind: AssistKind,
    ) -> Result<AssistOutcome, BattleError> {
        let now = self.clock.now();
        let ledger = self.rules.ledger();
        let battle = self.observe(battle_id, now).await?;
        let role = participant(&battle, player)?;

        let existing = self
            .store
            .get_attempt(battle_id, round_index, role)
            .await
            .map_err(store_err)?;
        // A spent assist stays spent, whatever else happened to the round since
        if existing.as_ref().is_some_and(|a| a.assist_used(kind)) {
            return Err(BattleError::AssistAlreadyUsed { kind });
        }
        check_round_open(&battle, round_index, existing.as_ref())?;
        if let Some(attempt) = &existing {
            ledger.check_can_guess(attempt)?;
        }

        let word = self.round_word(battle_id, round_index).await?;
        self.update_attempt_with(&battle, role, round_index, &word, now, |current| {
            ledger.record_assist(current, kind, now).map(|next| (next, ()))
        })
        .await?;

        let text = match kind {
            AssistKind::InviteFriend => format!("{}:{}:{}", battle_id, round_index, role.as_str()),
            AssistKind::Hint | AssistKind::Clue => self.assist_text(&word, kind).await?,
        };

        info!(
            "{} used {} in round {} of battle {}",
            player.display_name, kind, round_index, battle_id
        );
        self.publish([BattleEvent::AssistUsed {
            battle_id,
            role,
            round_index,
            kind,
        }]);

        Ok(AssistOutcome {
            kind,
            round_index,
            text,
        })
    }

    pub async fn get_snapshot(
        &self,
        viewer: Option<&PlayerIdentity>,
        battle_id: BattleId,
    ) -> Result<BattleSnapshot, BattleError> {
        let now = self.clock.now();
        let battle = self.observe(battle_id, now).await?;
        self.snapshot_of(&battle, viewer.map(|v| v.id), now).await
    }

    /// Effective battle state plus the stored documents of its live round,
    /// read without persisting an expiry or generating a word.
    pub async fn battle_view(&self, battle_id: BattleId) -> Result<BattleView, BattleError> {
        let now = self.clock.now();
        let battle = derive_effective_state(&self.load_battle(battle_id).await?, &self.rules, now);

        let (attempts, word) = if battle.status == BattleStatus::InProgress {
            let round = battle.current_word_index;
            let word = self
                .store
                .get_round_word(battle_id, round)
                .await
                .map_err(store_err)?;
            let attempts = self
                .store
                .list_round_attempts(battle_id, round)
                .await
                .map_err(store_err)?;
            (attempts, word)
        } else {
            (Vec::new(), None)
        };

        Ok(BattleView {
            battle,
            attempts,
            word,
            rules: self.rules.clone(),
            now,
        })
    }

    pub async fn get_round_detail(
        &self,
        viewer: Option<&PlayerIdentity>,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<RoundDetail, BattleError> {
        let now = self.clock.now();
        let battle = self.observe(battle_id, now).await?;

        let reached = match battle.status {
            BattleStatus::Completed => true,
            BattleStatus::InProgress => round_index <= battle.current_word_index,
            _ => false,
        };
        if round_index >= battle.max_words || !reached {
            return Err(BattleError::RoundMismatch {
                requested: round_index,
                current: battle.current_word_index,
            });
        }

        let attempts = self
            .store
            .list_round_attempts(battle_id, round_index)
            .await
            .map_err(store_err)?;
        let word = self
            .store
            .get_round_word(battle_id, round_index)
            .await
            .map_err(store_err)?;
        Ok(round_detail(
            &battle,
            round_index,
            &attempts,
            word.as_ref(),
            viewer.map(|v| v.id),
            &self.rules,
        ))
    }

    /// Rematch requests for a battle with lapsed ones expired (and persisted).
    async fn current_rematches(
        &self,
        battle_id: BattleId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RematchRequest>, BattleError> {
        'retry: for _ in 0..self.max_retries {
            let stored = self
                .store
                .list_rematches(battle_id)
                .await
                .map_err(store_err)?;
            let mut current = Vec::with_capacity(stored.len());
            for request in stored {
                let effective = effective_rematch(&request, self.rules.rematch_window, now);
                if effective.status == request.status {
                    current.push(request);
                    continue;
                }
                match self.store.update_rematch(&effective).await {
                    Ok(saved) => {
                        info!("Rematch request {} for battle {} expired", saved.id, battle_id);
                        self.publish([BattleEvent::rematch(&saved)]);
                        current.push(saved);
                    }
                    Err(StoreError::Conflict) => continue 'retry,
                    Err(err) => return Err(store_err(err)),
                }
            }
            return Ok(current);
        }
        Err(BattleError::Conflict)
    }

    pub async fn propose_rematch(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
    ) -> Result<RematchRequest, BattleError> {
        let now = self.clock.now();
        let battle = self.observe(battle_id, now).await?;

        for retry in 0..self.max_retries {
            let requests = self.current_rematches(battle_id, now).await?;
            let request = rematch::propose_rematch(&battle, &requests, player.id, now)?;
            match self.store.insert_rematch(&request).await {
                Ok(saved) => {
                    info!("{} proposed a rematch of battle {}", player.display_name, battle_id);
                    self.publish([BattleEvent::rematch(&saved)]);
                    return Ok(saved);
                }
                Err(StoreError::Conflict) => {
                    debug!("Rematch proposal for {} conflicted, retry {}", battle_id, retry + 1);
                }
                Err(err) => return Err(store_err(err)),
            }
        }
        Err(BattleError::Conflict)
    }

    pub async fn respond_rematch(
        &self,
        player: &PlayerIdentity,
        battle_id: BattleId,
        decision: RematchDecision,
    ) -> Result<RematchRequest, BattleError> {
        let now = self.clock.now();
        let battle = self.observe(battle_id, now).await?;

        for retry in 0..self.max_retries {
            let requests = self.current_rematches(battle_id, now).await?;
            let latest = requests.last().ok_or(BattleError::RematchNotFound)?;

            let new_battle_id = Uuid::new_v4();
            let next = match rematch::respond_rematch(
                &battle,
                latest,
                player.id,
                decision,
                new_battle_id,
                now,
            )? {
                Some(next) => next,
                None => {
                    self.ensure_rematch_battle(&battle, latest, now).await?;
                    return Ok(latest.clone());
                }
            };

            match self.store.update_rematch(&next).await {
                Ok(saved) => {
                    self.ensure_rematch_battle(&battle, &saved, now).await?;
                    info!(
                        "{} {} the rematch of battle {}",
                        player.display_name,
                        saved.status.as_str(),
                        battle_id
                    );
                    self.publish([BattleEvent::rematch(&saved)]);
                    return Ok(saved);
                }
                Err(StoreError::Conflict) => {
                    debug!("Rematch response for {} conflicted, retry {}", battle_id, retry + 1);
                }
                Err(err) => return Err(store_err(err)),
            }
        }
        Err(BattleError::Conflict)
    }

    /// Create the battle an accepted request points at, if it does not exist
    /// yet. Safe to repeat.
    async fn ensure_rematch_battle(
        &self,
        original: &Battle,
        request: &RematchRequest,
        now: DateTime<Utc>,
    ) -> Result<(), BattleError> {
        let Some(new_battle_id) = request.new_challenge_id else {
            return Ok(());
        };
        if request.status != RematchStatus::Accepted
            || self
                .store
                .get_battle(new_battle_id)
                .await
                .map_err(store_err)?
                .is_some()
        {
            return Ok(());
        }

        let battle = rematch::rematch_battle(original, request, new_battle_id, now)?;
        match self.store.insert_battle(&battle).await {
            Ok(saved) => {
                info!("Rematch battle {} created from {}", saved.id, original.id);
                self.publish([BattleEvent::BattleCreated { battle_id: saved.id }]);
                Ok(())
            }
            Err(StoreError::Conflict) => Ok(()),
            Err(err) => Err(store_err(err)),
        }
    }

    /// Latest rematch request for a battle, if any.
    pub async fn get_rematch_status(
        &self,
        battle_id: BattleId,
    ) -> Result<Option<RematchRequest>, BattleError> {
        let now = self.clock.now();
        self.load_battle(battle_id).await?;
        Ok(self.current_rematches(battle_id, now).await?.pop())
    }

    pub async fn list_completed_battles(
        &self,
        since: Option<DateTime<Utc>>,
        limit: Option<u64>,
    ) -> Result<Vec<CompletedBattleSummary>, BattleError> {
        let limit = limit
            .unwrap_or(DEFAULT_COMPLETED_LIMIT)
            .clamp(1, MAX_COMPLETED_LIMIT);
        let battles = self
            .store
            .list_completed_battles(since.unwrap_or_default(), limit)
            .await
            .map_err(store_err)?;

        Ok(battles
            .into_iter()
            .map(|battle| CompletedBattleSummary {
                id: battle.id,
                challenger: battle.challenger,
                opponent: battle.opponent,
                challenger_score: battle.challenger_score,
                opponent_score: battle.opponent_score,
                winner: battle.winner,
                completed_at: battle.completed_at,
            })
            .collect())
    }

    /// Admin-only visibility flags. Works on deleted battles too so they can be restored.
    pub async fn moderate_battle(
        &self,
        admin_token: Option<&str>,
        battle_id: BattleId,
        update: &ModerationUpdate,
    ) -> Result<Battle, BattleError> {
        let authorized = matches!(
            (self.admin_token.as_deref(), admin_token),
            (Some(expected), Some(given)) if expected == given
        );
        if !authorized {
            warn!("Rejected moderation of battle {} without a valid admin token", battle_id);
            return Err(BattleError::Unauthorized);
        }

        for retry in 0..self.max_retries {
            let stored = self
                .store
                .get_battle(battle_id)
                .await
                .map_err(store_err)?
                .ok_or_else(|| BattleError::not_found(battle_id))?;

            let mut next = stored.clone();
            if let Some(hidden) = update.hidden {
                next.hidden = hidden;
            }
            if let Some(deleted) = update.deleted {
                next.deleted = deleted;
            }
            if next == stored {
                return Ok(stored);
            }

            match self.store.update_battle(&next).await {
                Ok(saved) => {
                    info!(
                        "Battle {} moderated: hidden={} deleted={}",
                        battle_id, saved.hidden, saved.deleted
                    );
                    self.announce(&stored, &saved);
                    return Ok(saved);
                }
                Err(StoreError::Conflict) => {
                    debug!("Moderation of {} conflicted, retry {}", battle_id, retry + 1);
                }
                Err(err) => return Err(store_err(err)),
            }
        }
        Err(BattleError::Conflict)
    }
}
