use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "battles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub challenger_id: Uuid,
    pub challenger_name: String,
    pub opponent_id: Option<Uuid>,
    pub opponent_name: Option<String>,
    pub status: String,
    pub current_word_index: i32,
    pub max_words: i32,
    pub challenger_score: i32,
    pub opponent_score: i32,
    pub winner: Option<String>,
    pub created_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub current_round_start_time: Option<DateTimeUtc>,
    pub hidden: bool,
    pub deleted: bool,
    pub rematch_of: Option<Uuid>,
    pub challenger_credited: i32,
    pub opponent_credited: i32,
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::round_attempts::Entity")]
    RoundAttempts,
    #[sea_orm(has_many = "super::round_words::Entity")]
    RoundWords,
    #[sea_orm(has_many = "super::rematch_requests::Entity")]
    RematchRequests,
}

impl Related<super::round_attempts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RoundAttempts.def()
    }
}

impl Related<super::round_words::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RoundWords.def()
    }
}

impl Related<super::rematch_requests::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RematchRequests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
