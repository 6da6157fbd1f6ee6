use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duel_types::{
    AssistKind, Battle, BattleError, BattleId, PlayerRole, RematchRequest, RoundAttempt, RoundWord,
};
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The document changed since it was read, or the unique key is taken.
    #[error("conditional write conflict")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for BattleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => BattleError::Conflict,
            other => BattleError::Storage {
                message: other.to_string(),
            },
        }
    }
}

/// Document store for battles and everything hanging off them.
///
/// Updates are conditional: the caller passes the document as it read it, and
/// the write lands only if the stored `version` still matches. The stored copy
/// (with the bumped version) is returned.
#[async_trait]
pub trait BattleStore: Send + Sync {
    async fn insert_battle(&self, battle: &Battle) -> Result<Battle, StoreError>;
    async fn get_battle(&self, id: BattleId) -> Result<Option<Battle>, StoreError>;
    async fn update_battle(&self, battle: &Battle) -> Result<Battle, StoreError>;
    /// Visible battles completed at or after `since`, oldest first.
    async fn list_completed_battles(
        &self,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Battle>, StoreError>;

    async fn insert_attempt(&self, attempt: &RoundAttempt) -> Result<RoundAttempt, StoreError>;
    async fn get_attempt(
        &self,
        battle_id: BattleId,
        round_index: u32,
        role: PlayerRole,
    ) -> Result<Option<RoundAttempt>, StoreError>;
    async fn update_attempt(&self, attempt: &RoundAttempt) -> Result<RoundAttempt, StoreError>;
    async fn list_round_attempts(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<Vec<RoundAttempt>, StoreError>;

    /// Fails with `Conflict` if the round already has a word.
    async fn insert_round_word(&self, word: &RoundWord) -> Result<RoundWord, StoreError>;
    async fn get_round_word(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<Option<RoundWord>, StoreError>;
    /// Fill in assist text if it is still missing and return the stored record.
    /// Text that is already present is never replaced.
    async fn set_assist_text(
        &self,
        battle_id: BattleId,
        round_index: u32,
        kind: AssistKind,
        text: &str,
    ) -> Result<RoundWord, StoreError>;

    /// Fails with `Conflict` while another request for the battle is pending.
    async fn insert_rematch(&self, request: &RematchRequest) -> Result<RematchRequest, StoreError>;
    async fn update_rematch(&self, request: &RematchRequest) -> Result<RematchRequest, StoreError>;
    /// Every request for a battle, oldest first.
    async fn list_rematches(&self, battle_id: BattleId) -> Result<Vec<RematchRequest>, StoreError>;
}
