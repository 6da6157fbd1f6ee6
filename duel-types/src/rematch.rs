use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{BattleId, PlayerId, PlayerRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RematchStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl RematchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RematchStatus::Pending => "pending",
            RematchStatus::Accepted => "accepted",
            RematchStatus::Declined => "declined",
            RematchStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RematchStatus::Pending),
            "accepted" => Some(RematchStatus::Accepted),
            "declined" => Some(RematchStatus::Declined),
            "expired" => Some(RematchStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RematchDecision {
    Accept,
    Decline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RematchRequest {
    pub id: Uuid,
    pub battle_id: BattleId,
    pub requester_role: PlayerRole,
    pub requested_by: PlayerId,
    pub status: RematchStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    /// Set exactly when `status` is `Accepted`.
    pub new_challenge_id: Option<BattleId>,
    pub version: u64,
}
