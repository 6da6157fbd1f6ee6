use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use duel_types::{
    AssistKind, Battle, BattleId, BattleStatus, PlayerRole, RematchRequest, RematchStatus,
    RoundAttempt, RoundWord,
};

use crate::store::{BattleStore, StoreError};

type AttemptKey = (BattleId, u32, PlayerRole);

/// In-process store. Each document lives behind its own map shard lock, so a
/// conditional update is an atomic compare-and-swap on that one entry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    battles: DashMap<BattleId, Battle>,
    attempts: DashMap<AttemptKey, RoundAttempt>,
    round_words: DashMap<(BattleId, u32), RoundWord>,
    rematches: DashMap<BattleId, Vec<RematchRequest>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BattleStore for MemoryStore {
    async fn insert_battle(&self, battle: &Battle) -> Result<Battle, StoreError> {
        match self.battles.entry(battle.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                let stored = Battle {
                    version: 0,
                    ..battle.clone()
                };
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn get_battle(&self, id: BattleId) -> Result<Option<Battle>, StoreError> {
        Ok(self.battles.get(&id).map(|b| b.clone()))
    }

    async fn update_battle(&self, battle: &Battle) -> Result<Battle, StoreError> {
        let mut current = self
            .battles
            .get_mut(&battle.id)
            .ok_or(StoreError::Conflict)?;
        if current.version != battle.version {
            return Err(StoreError::Conflict);
        }
        let stored = Battle {
            version: battle.version + 1,
            ..battle.clone()
        };
        *current = stored.clone();
        Ok(stored)
    }

    async fn list_completed_battles(
        &self,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Battle>, StoreError> {
        let mut completed: Vec<Battle> = self
            .battles
            .iter()
            .filter(|b| {
                b.status == BattleStatus::Completed
                    && b.is_visible()
                    && b.completed_at.is_some_and(|at| at >= since)
            })
            .map(|b| b.clone())
            .collect();
        completed.sort_by_key(|b| b.completed_at);
        completed.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(completed)
    }

    async fn insert_attempt(&self, attempt: &RoundAttempt) -> Result<RoundAttempt, StoreError> {
        let key = (attempt.battle_id, attempt.round_index, attempt.role);
        match self.attempts.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                let stored = RoundAttempt {
                    version: 0,
                    ..attempt.clone()
                };
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn get_attempt(
        &self,
        battle_id: BattleId,
        round_index: u32,
        role: PlayerRole,
    ) -> Result<Option<RoundAttempt>, StoreError> {
        Ok(self
            .attempts
            .get(&(battle_id, round_index, role))
            .map(|a| a.clone()))
    }

    async fn update_attempt(&self, attempt: &RoundAttempt) -> Result<RoundAttempt, StoreError> {
        let key = (attempt.battle_id, attempt.round_index, attempt.role);
        let mut current = self.attempts.get_mut(&key).ok_or(StoreError::Conflict)?;
        if current.version != attempt.version || current.id != attempt.id {
            return Err(StoreError::Conflict);
        }
        let stored = RoundAttempt {
            version: attempt.version + 1,
            ..attempt.clone()
        };
        *current = stored.clone();
        Ok(stored)
    }

    async fn list_round_attempts(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<Vec<RoundAttempt>, StoreError> {
        let mut attempts = Vec::new();
        for role in [PlayerRole::Challenger, PlayerRole::Opponent] {
            if let Some(attempt) = self.attempts.get(&(battle_id, round_index, role)) {
                attempts.push(attempt.clone());
            }
        }
        Ok(attempts)
    }

    async fn insert_round_word(&self, word: &RoundWord) -> Result<RoundWord, StoreError> {
        match self.round_words.entry((word.battle_id, word.round_index)) {
            Entry::Occupied(_) => Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(word.clone());
                Ok(word.clone())
            }
        }
    }

    async fn get_round_word(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<Option<RoundWord>, StoreError> {
        Ok(self
            .round_words
            .get(&(battle_id, round_index))
            .map(|w| w.clone()))
    }

    async fn set_assist_text(
        &self,
        battle_id: BattleId,
        round_index: u32,
        kind: AssistKind,
        text: &str,
    ) -> Result<RoundWord, StoreError> {
        let mut word = self
            .round_words
            .get_mut(&(battle_id, round_index))
            .ok_or_else(|| StoreError::Corrupt(format!("no word for {battle_id} round {round_index}")))?;
        let slot = match kind {
            AssistKind::Hint => &mut word.hint_text,
            AssistKind::Clue => &mut word.clue_text,
            AssistKind::InviteFriend => return Ok(word.clone()),
        };
        if slot.is_none() {
            *slot = Some(text.to_string());
        }
        Ok(word.clone())
    }

    async fn insert_rematch(&self, request: &RematchRequest) -> Result<RematchRequest, StoreError> {
        let mut requests = self.rematches.entry(request.battle_id).or_default();
        let blocked = requests.iter().any(|r| {
            r.id == request.id
                || (request.status == RematchStatus::Pending && r.status == RematchStatus::Pending)
        });
        if blocked {
            return Err(StoreError::Conflict);
        }
        let stored = RematchRequest {
            version: 0,
            ..request.clone()
        };
        requests.push(stored.clone());
        Ok(stored)
    }

    async fn update_rematch(&self, request: &RematchRequest) -> Result<RematchRequest, StoreError> {
        let mut requests = self
            .rematches
            .get_mut(&request.battle_id)
            .ok_or(StoreError::Conflict)?;

        if request.status == RematchStatus::Pending
            && requests
                .iter()
                .any(|r| r.id != request.id && r.status == RematchStatus::Pending)
        {
            return Err(StoreError::Conflict);
        }

        let current = requests
            .iter_mut()
            .find(|r| r.id == request.id)
            .ok_or(StoreError::Conflict)?;
        if current.version != request.version {
            return Err(StoreError::Conflict);
        }
        let stored = RematchRequest {
            version: request.version + 1,
            ..request.clone()
        };
        *current = stored.clone();
        Ok(stored)
    }

    async fn list_rematches(&self, battle_id: BattleId) -> Result<Vec<RematchRequest>, StoreError> {
        Ok(self
            .rematches
            .get(&battle_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }
}
