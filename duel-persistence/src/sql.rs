use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duel_types::{
    AssistKind, Battle, BattleId, BattleStatus, PlayerIdentity, PlayerRole, RematchRequest,
    RematchStatus, RoundAttempt, RoundWord, Winner,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, SqlErr,
};

use crate::entities::{battles, prelude::*, rematch_requests, round_attempts, round_words};
use crate::store::{BattleStore, StoreError};

/// sea-orm backed store. Conditional updates are a single
/// `UPDATE ... WHERE id = ? AND version = ?`; losing writers see zero rows.
#[derive(Debug, Clone)]
pub struct SqlStore {
    db: DatabaseConnection,
}

fn write_err(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Conflict,
        _ => StoreError::Database(err),
    }
}

fn to_u32(value: i32, field: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} is negative: {value}")))
}

fn to_i32(value: u32, field: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {value}")))
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("version out of range: {value}")))
}

fn to_u64(value: i64, field: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} is negative: {value}")))
}

fn parse_role(value: &str) -> Result<PlayerRole, StoreError> {
    PlayerRole::parse(value).ok_or_else(|| StoreError::Corrupt(format!("unknown role {value}")))
}

impl SqlStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_battle(model: battles::Model) -> Result<Battle, StoreError> {
        let opponent = match (model.opponent_id, model.opponent_name) {
            (Some(id), Some(name)) => Some(PlayerIdentity::new(id, name)),
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "battle {} has a partial opponent",
                    model.id
                )));
            }
        };
        let status = BattleStatus::parse(&model.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status {}", model.status)))?;
        let winner = model
            .winner
            .as_deref()
            .map(|w| Winner::parse(w).ok_or_else(|| StoreError::Corrupt(format!("unknown winner {w}"))))
            .transpose()?;

        Ok(Battle {
            id: model.id,
            challenger: PlayerIdentity::new(model.challenger_id, model.challenger_name),
            opponent,
            status,
            current_word_index: to_u32(model.current_word_index, "current_word_index")?,
            max_words: to_u32(model.max_words, "max_words")?,
            challenger_score: to_u32(model.challenger_score, "challenger_score")?,
            opponent_score: to_u32(model.opponent_score, "opponent_score")?,
            winner,
            created_at: model.created_at,
            started_at: model.started_at,
            completed_at: model.completed_at,
            current_round_start_time: model.current_round_start_time,
            hidden: model.hidden,
            deleted: model.deleted,
            rematch_of: model.rematch_of,
            challenger_credited: to_u32(model.challenger_credited, "challenger_credited")?,
            opponent_credited: to_u32(model.opponent_credited, "opponent_credited")?,
            version: to_u64(model.version, "version")?,
        })
    }

    fn battle_to_active(battle: &Battle, version: u64) -> Result<battles::ActiveModel, StoreError> {
        Ok(battles::ActiveModel {
            id: ActiveValue::Set(battle.id),
            challenger_id: ActiveValue::Set(battle.challenger.id),
            challenger_name: ActiveValue::Set(battle.challenger.display_name.clone()),
            opponent_id: ActiveValue::Set(battle.opponent.as_ref().map(|o| o.id)),
            opponent_name: ActiveValue::Set(battle.opponent.as_ref().map(|o| o.display_name.clone())),
            status: ActiveValue::Set(battle.status.as_str().to_string()),
            current_word_index: ActiveValue::Set(to_i32(battle.current_word_index, "current_word_index")?),
            max_words: ActiveValue::Set(to_i32(battle.max_words, "max_words")?),
            challenger_score: ActiveValue::Set(to_i32(battle.challenger_score, "challenger_score")?),
            opponent_score: ActiveValue::Set(to_i32(battle.opponent_score, "opponent_score")?),
            winner: ActiveValue::Set(battle.winner.map(|w| w.as_str().to_string())),
            created_at: ActiveValue::Set(battle.created_at),
            started_at: ActiveValue::Set(battle.started_at),
            completed_at: ActiveValue::Set(battle.completed_at),
            current_round_start_time: ActiveValue::Set(battle.current_round_start_time),
            hidden: ActiveValue::Set(battle.hidden),
            deleted: ActiveValue::Set(battle.deleted),
            rematch_of: ActiveValue::Set(battle.rematch_of),
            challenger_credited: ActiveValue::Set(to_i32(battle.challenger_credited, "challenger_credited")?),
            opponent_credited: ActiveValue::Set(to_i32(battle.opponent_credited, "opponent_credited")?),
            version: ActiveValue::Set(to_i64(version)?),
        })
    }

    fn model_to_attempt(model: round_attempts::Model) -> Result<RoundAttempt, StoreError> {
        Ok(RoundAttempt {
            id: model.id,
            battle_id: model.battle_id,
            round_index: to_u32(model.round_index, "round_index")?,
            word_id: model.word_id,
            role: parse_role(&model.role)?,
            player_id: model.player_id,
            attempts_used: to_u32(model.attempts_used, "attempts_used")?,
            completed: model.completed,
            completed_at: model.completed_at,
            current_guess: model.current_guess,
            score: model.score.map(|s| to_u32(s, "score")).transpose()?,
            elapsed_ms: model.elapsed_ms.map(|ms| to_u64(ms, "elapsed_ms")).transpose()?,
            hint_used: model.hint_used,
            clue_used: model.clue_used,
            invite_friend_used: model.invite_friend_used,
            created_at: model.created_at,
            updated_at: model.updated_at,
            version: to_u64(model.version, "version")?,
        })
    }

    fn attempt_to_active(
        attempt: &RoundAttempt,
        version: u64,
    ) -> Result<round_attempts::ActiveModel, StoreError> {
        Ok(round_attempts::ActiveModel {
            id: ActiveValue::Set(attempt.id),
            battle_id: ActiveValue::Set(attempt.battle_id),
            round_index: ActiveValue::Set(to_i32(attempt.round_index, "round_index")?),
            word_id: ActiveValue::Set(attempt.word_id),
            role: ActiveValue::Set(attempt.role.as_str().to_string()),
            player_id: ActiveValue::Set(attempt.player_id),
            attempts_used: ActiveValue::Set(to_i32(attempt.attempts_used, "attempts_used")?),
            completed: ActiveValue::Set(attempt.completed),
            completed_at: ActiveValue::Set(attempt.completed_at),
            current_guess: ActiveValue::Set(attempt.current_guess.clone()),
            score: ActiveValue::Set(attempt.score.map(|s| to_i32(s, "score")).transpose()?),
            elapsed_ms: ActiveValue::Set(attempt.elapsed_ms.map(to_i64).transpose()?),
            hint_used: ActiveValue::Set(attempt.hint_used),
            clue_used: ActiveValue::Set(attempt.clue_used),
            invite_friend_used: ActiveValue::Set(attempt.invite_friend_used),
            created_at: ActiveValue::Set(attempt.created_at),
            updated_at: ActiveValue::Set(attempt.updated_at),
            version: ActiveValue::Set(to_i64(version)?),
        })
    }

    fn model_to_round_word(model: round_words::Model) -> Result<RoundWord, StoreError> {
        Ok(RoundWord {
            id: model.id,
            battle_id: model.battle_id,
            round_index: to_u32(model.round_index, "round_index")?,
            word: model.word,
            hint_text: model.hint_text,
            clue_text: model.clue_text,
            created_at: model.created_at,
        })
    }

    fn model_to_rematch(model: rematch_requests::Model) -> Result<RematchRequest, StoreError> {
        Ok(RematchRequest {
            id: model.id,
            battle_id: model.battle_id,
            requester_role: parse_role(&model.requester_role)?,
            requested_by: model.requested_by,
            status: RematchStatus::parse(&model.status)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown rematch status {}", model.status)))?,
            requested_at: model.requested_at,
            responded_at: model.responded_at,
            new_challenge_id: model.new_challenge_id,
            version: to_u64(model.version, "version")?,
        })
    }

    fn rematch_to_active(
        request: &RematchRequest,
        version: u64,
    ) -> Result<rematch_requests::ActiveModel, StoreError> {
        let pending_key = (request.status == RematchStatus::Pending).then_some(request.battle_id);
        Ok(rematch_requests::ActiveModel {
            id: ActiveValue::Set(request.id),
            battle_id: ActiveValue::Set(request.battle_id),
            requester_role: ActiveValue::Set(request.requester_role.as_str().to_string()),
            requested_by: ActiveValue::Set(request.requested_by),
            status: ActiveValue::Set(request.status.as_str().to_string()),
            requested_at: ActiveValue::Set(request.requested_at),
            responded_at: ActiveValue::Set(request.responded_at),
            new_challenge_id: ActiveValue::Set(request.new_challenge_id),
            pending_key: ActiveValue::Set(pending_key),
            version: ActiveValue::Set(to_i64(version)?),
        })
    }
}

#[async_trait]
impl BattleStore for SqlStore {
    async fn insert_battle(&self, battle: &Battle) -> Result<Battle, StoreError> {
        let model = Self::battle_to_active(battle, 0)?;
        Battles::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(write_err)?;
        Ok(Battle {
            version: 0,
            ..battle.clone()
        })
    }

    async fn get_battle(&self, id: BattleId) -> Result<Option<Battle>, StoreError> {
        Battles::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Self::model_to_battle)
            .transpose()
    }

    async fn update_battle(&self, battle: &Battle) -> Result<Battle, StoreError> {
        let next_version = battle.version + 1;
        let result = Battles::update_many()
            .set(Self::battle_to_active(battle, next_version)?)
            .filter(battles::Column::Id.eq(battle.id))
            .filter(battles::Column::Version.eq(to_i64(battle.version)?))
            .exec(&self.db)
            .await
            .map_err(write_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(Battle {
            version: next_version,
            ..battle.clone()
        })
    }

    async fn list_completed_battles(
        &self,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Battle>, StoreError> {
        Battles::find()
            .filter(battles::Column::Status.eq(BattleStatus::Completed.as_str()))
            .filter(battles::Column::Hidden.eq(false))
            .filter(battles::Column::Deleted.eq(false))
            .filter(battles::Column::CompletedAt.gte(since))
            .order_by_asc(battles::Column::CompletedAt)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Self::model_to_battle)
            .collect()
    }

    async fn insert_attempt(&self, attempt: &RoundAttempt) -> Result<RoundAttempt, StoreError> {
        let model = Self::attempt_to_active(attempt, 0)?;
        RoundAttempts::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(write_err)?;
        Ok(RoundAttempt {
            version: 0,
            ..attempt.clone()
        })
    }

    async fn get_attempt(
        &self,
        battle_id: BattleId,
        round_index: u32,
        role: PlayerRole,
    ) -> Result<Option<RoundAttempt>, StoreError> {
        RoundAttempts::find()
            .filter(round_attempts::Column::BattleId.eq(battle_id))
            .filter(round_attempts::Column::RoundIndex.eq(to_i32(round_index, "round_index")?))
            .filter(round_attempts::Column::Role.eq(role.as_str()))
            .one(&self.db)
            .await?
            .map(Self::model_to_attempt)
            .transpose()
    }

    async fn update_attempt(&self, attempt: &RoundAttempt) -> Result<RoundAttempt, StoreError> {
        let next_version = attempt.version + 1;
        let result = RoundAttempts::update_many()
            .set(Self::attempt_to_active(attempt, next_version)?)
            .filter(round_attempts::Column::Id.eq(attempt.id))
            .filter(round_attempts::Column::Version.eq(to_i64(attempt.version)?))
            .exec(&self.db)
            .await
            .map_err(write_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(RoundAttempt {
            version: next_version,
            ..attempt.clone()
        })
    }

    async fn list_round_attempts(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<Vec<RoundAttempt>, StoreError> {
        RoundAttempts::find()
            .filter(round_attempts::Column::BattleId.eq(battle_id))
            .filter(round_attempts::Column::RoundIndex.eq(to_i32(round_index, "round_index")?))
            .order_by_asc(round_attempts::Column::Role)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Self::model_to_attempt)
            .collect()
    }

    async fn insert_round_word(&self, word: &RoundWord) -> Result<RoundWord, StoreError> {
        let model = round_words::ActiveModel {
            id: ActiveValue::Set(word.id),
            battle_id: ActiveValue::Set(word.battle_id),
            round_index: ActiveValue::Set(to_i32(word.round_index, "round_index")?),
            word: ActiveValue::Set(word.word.clone()),
            hint_text: ActiveValue::Set(word.hint_text.clone()),
            clue_text: ActiveValue::Set(word.clue_text.clone()),
            created_at: ActiveValue::Set(word.created_at),
        };
        RoundWords::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(write_err)?;
        Ok(word.clone())
    }

    async fn get_round_word(
        &self,
        battle_id: BattleId,
        round_index: u32,
    ) -> Result<Option<RoundWord>, StoreError> {
        RoundWords::find()
            .filter(round_words::Column::BattleId.eq(battle_id))
            .filter(round_words::Column::RoundIndex.eq(to_i32(round_index, "round_index")?))
            .one(&self.db)
            .await?
            .map(Self::model_to_round_word)
            .transpose()
    }

    async fn set_assist_text(
        &self,
        battle_id: BattleId,
        round_index: u32,
        kind: AssistKind,
        text: &str,
    ) -> Result<RoundWord, StoreError> {
        let column = match kind {
            AssistKind::Hint => Some(round_words::Column::HintText),
            AssistKind::Clue => Some(round_words::Column::ClueText),
            AssistKind::InviteFriend => None,
        };

        if let Some(column) = column {
            RoundWords::update_many()
                .col_expr(column, Expr::value(text.to_string()))
                .filter(round_words::Column::BattleId.eq(battle_id))
                .filter(round_words::Column::RoundIndex.eq(to_i32(round_index, "round_index")?))
                .filter(column.is_null())
                .exec(&self.db)
                .await?;
        }

        self.get_round_word(battle_id, round_index)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("no word for {battle_id} round {round_index}")))
    }

    async fn insert_rematch(&self, request: &RematchRequest) -> Result<RematchRequest, StoreError> {
        let model = Self::rematch_to_active(request, 0)?;
        RematchRequests::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(write_err)?;
        Ok(RematchRequest {
            version: 0,
            ..request.clone()
        })
    }

    async fn update_rematch(&self, request: &RematchRequest) -> Result<RematchRequest, StoreError> {
        let next_version = request.version + 1;
        let result = RematchRequests::update_many()
            .set(Self::rematch_to_active(request, next_version)?)
            .filter(rematch_requests::Column::Id.eq(request.id))
            .filter(rematch_requests::Column::Version.eq(to_i64(request.version)?))
            .exec(&self.db)
            .await
            .map_err(write_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(RematchRequest {
            version: next_version,
            ..request.clone()
        })
    }

    async fn list_rematches(&self, battle_id: BattleId) -> Result<Vec<RematchRequest>, StoreError> {
        RematchRequests::find()
            .filter(rematch_requests::Column::BattleId.eq(battle_id))
            .order_by_asc(rematch_requests::Column::RequestedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Self::model_to_rematch)
            .collect()
    }
}
