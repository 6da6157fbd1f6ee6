use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "round_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub battle_id: Uuid,
    pub round_index: i32,
    pub word_id: Uuid,
    pub role: String,
    pub player_id: Uuid,
    pub attempts_used: i32,
    pub completed: bool,
    pub completed_at: Option<DateTimeUtc>,
    pub current_guess: String,
    pub score: Option<i32>,
    pub elapsed_ms: Option<i64>,
    pub hint_used: bool,
    pub clue_used: bool,
    pub invite_friend_used: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::battles::Entity",
        from = "Column::BattleId",
        to = "super::battles::Column::Id"
    )]
    Battle,
}

impl Related<super::battles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Battle.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
