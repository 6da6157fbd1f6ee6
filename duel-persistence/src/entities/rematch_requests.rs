use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rematch_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub battle_id: Uuid,
    pub requester_role: String,
    pub requested_by: Uuid,
    pub status: String,
    pub requested_at: DateTimeUtc,
    pub responded_at: Option<DateTimeUtc>,
    pub new_challenge_id: Option<Uuid>,
    /// Set to `battle_id` while pending; the unique index allows one live request per battle.
    #[sea_orm(unique)]
    pub pending_key: Option<Uuid>,
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
