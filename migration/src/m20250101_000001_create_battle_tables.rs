use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Battles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Battles::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Battles::ChallengerId).uuid().not_null())
                    .col(ColumnDef::new(Battles::ChallengerName).string().not_null())
                    .col(ColumnDef::new(Battles::OpponentId).uuid().null())
                    .col(ColumnDef::new(Battles::OpponentName).string().null())
                    .col(ColumnDef::new(Battles::Status).string().not_null())
                    .col(
                        ColumnDef::new(Battles::CurrentWordIndex)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Battles::MaxWords).integer().not_null())
                    .col(
                        ColumnDef::new(Battles::ChallengerScore)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Battles::OpponentScore)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Battles::Winner).string().null())
                    .col(
                        ColumnDef::new(Battles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Battles::StartedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Battles::CompletedAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(Battles::CurrentRoundStartTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Battles::Hidden)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Battles::Deleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Battles::RematchOf).uuid().null())
                    .col(
                        ColumnDef::new(Battles::ChallengerCredited)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Battles::OpponentCredited)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Battles::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // Completed-battle listing for leaderboard aggregation
        manager
            .create_index(
                Index::create()
                    .name("idx_battles_completed_at")
                    .table(Battles::Table)
                    .col(Battles::CompletedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RoundAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoundAttempts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RoundAttempts::BattleId).uuid().not_null())
                    .col(ColumnDef::new(RoundAttempts::RoundIndex).integer().not_null())
                    .col(ColumnDef::new(RoundAttempts::WordId).uuid().not_null())
                    .col(ColumnDef::new(RoundAttempts::Role).string().not_null())
                    .col(ColumnDef::new(RoundAttempts::PlayerId).uuid().not_null())
                    .col(
                        ColumnDef::new(RoundAttempts::AttemptsUsed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoundAttempts::Completed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RoundAttempts::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RoundAttempts::CurrentGuess)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(RoundAttempts::Score).integer().null())
                    .col(ColumnDef::new(RoundAttempts::ElapsedMs).big_integer().null())
                    .col(
                        ColumnDef::new(RoundAttempts::HintUsed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RoundAttempts::ClueUsed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RoundAttempts::InviteFriendUsed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RoundAttempts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RoundAttempts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RoundAttempts::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_round_attempts_battle")
                            .from(RoundAttempts::Table, RoundAttempts::BattleId)
                            .to(Battles::Table, Battles::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // One attempt record per (battle, round, player)
        manager
            .create_index(
                Index::create()
                    .name("idx_round_attempts_battle_round_role")
                    .table(RoundAttempts::Table)
                    .col(RoundAttempts::BattleId)
                    .col(RoundAttempts::RoundIndex)
                    .col(RoundAttempts::Role)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RoundWords::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RoundWords::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(RoundWords::BattleId).uuid().not_null())
                    .col(ColumnDef::new(RoundWords::RoundIndex).integer().not_null())
                    .col(ColumnDef::new(RoundWords::Word).string().not_null())
                    .col(ColumnDef::new(RoundWords::HintText).string().null())
                    .col(ColumnDef::new(RoundWords::ClueText).string().null())
                    .col(
                        ColumnDef::new(RoundWords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_round_words_battle")
                            .from(RoundWords::Table, RoundWords::BattleId)
                            .to(Battles::Table, Battles::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_round_words_battle_round")
                    .table(RoundWords::Table)
                    .col(RoundWords::BattleId)
                    .col(RoundWords::RoundIndex)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RematchRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RematchRequests::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RematchRequests::BattleId).uuid().not_null())
                    .col(ColumnDef::new(RematchRequests::RequesterRole).string().not_null())
                    .col(ColumnDef::new(RematchRequests::RequestedBy).uuid().not_null())
                    .col(ColumnDef::new(RematchRequests::Status).string().not_null())
                    .col(
                        ColumnDef::new(RematchRequests::RequestedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RematchRequests::RespondedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(RematchRequests::NewChallengeId).uuid().null())
                    // Equals battle_id while pending, NULL afterwards
                    .col(
                        ColumnDef::new(RematchRequests::PendingKey)
                            .uuid()
                            .null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(RematchRequests::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rematch_requests_battle")
                            .from(RematchRequests::Table, RematchRequests::BattleId)
                            .to(Battles::Table, Battles::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rematch_requests_battle")
                    .table(RematchRequests::Table)
                    .col(RematchRequests::BattleId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RematchRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RoundWords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RoundAttempts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Battles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Battles {
    Table,
    Id,
    ChallengerId,
    ChallengerName,
    OpponentId,
    OpponentName,
    Status,
    CurrentWordIndex,
    MaxWords,
    ChallengerScore,
    OpponentScore,
    Winner,
    CreatedAt,
    StartedAt,
    CompletedAt,
    CurrentRoundStartTime,
    Hidden,
    Deleted,
    RematchOf,
    ChallengerCredited,
    OpponentCredited,
    Version,
}

#[derive(DeriveIden)]
enum RoundAttempts {
    Table,
    Id,
    BattleId,
    RoundIndex,
    WordId,
    Role,
    PlayerId,
    AttemptsUsed,
    Completed,
    CompletedAt,
    CurrentGuess,
    Score,
    ElapsedMs,
    HintUsed,
    ClueUsed,
    InviteFriendUsed,
    CreatedAt,
    UpdatedAt,
    Version,
}

#[derive(DeriveIden)]
enum RoundWords {
    Table,
    Id,
    BattleId,
    RoundIndex,
    Word,
    HintText,
    ClueText,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RematchRequests {
    Table,
    Id,
    BattleId,
    RequesterRole,
    RequestedBy,
    Status,
    RequestedAt,
    RespondedAt,
    NewChallengeId,
    PendingKey,
    Version,
}
