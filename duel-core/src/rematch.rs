use chrono::{DateTime, TimeDelta, Utc};
use duel_types::{
    Battle, BattleError, BattleId, BattleStatus, PlayerId, RematchDecision, RematchRequest,
    RematchStatus,
};
use uuid::Uuid;

/// Lazily expire a pending request whose response window has lapsed.
pub fn effective_rematch(
    request: &RematchRequest,
    window: TimeDelta,
    now: DateTime<Utc>,
) -> RematchRequest {
    let deadline = request.requested_at + window;
    if request.status == RematchStatus::Pending && now > deadline {
        let mut expired = request.clone();
        expired.status = RematchStatus::Expired;
        expired.responded_at = Some(deadline);
        expired
    } else {
        request.clone()
    }
}

/// Create a proposal from one participant of a completed battle.
/// `existing` must already be lazily expired.
pub fn propose_rematch(
    battle: &Battle,
    existing: &[RematchRequest],
    proposer: PlayerId,
    now: DateTime<Utc>,
) -> Result<RematchRequest, BattleError> {
    if battle.status != BattleStatus::Completed {
        return Err(BattleError::InvalidState {
            current_state: battle.status.to_string(),
        });
    }
    let requester_role = battle.role_of(proposer).ok_or(BattleError::NotAParticipant)?;

    for request in existing {
        match request.status {
            RematchStatus::Pending => return Err(BattleError::RematchAlreadyPending),
            RematchStatus::Accepted => return Err(BattleError::RematchAlreadyAccepted),
            RematchStatus::Declined | RematchStatus::Expired => {}
        }
    }

    Ok(RematchRequest {
        id: Uuid::new_v4(),
        battle_id: battle.id,
        requester_role,
        requested_by: proposer,
        status: RematchStatus::Pending,
        requested_at: now,
        responded_at: None,
        new_challenge_id: None,
        version: 0,
    })
}

/// Resolve a proposal. Repeating an already-applied decision is a no-op.
pub fn respond_rematch(
    battle: &Battle,
    request: &RematchRequest,
    responder: PlayerId,
    decision: RematchDecision,
    new_battle_id: BattleId,
    now: DateTime<Utc>,
) -> Result<Option<RematchRequest>, BattleError> {
    let responder_role = battle.role_of(responder).ok_or(BattleError::NotAParticipant)?;
    if responder_role == request.requester_role {
        return Err(BattleError::NotRematchRecipient);
    }

    match (request.status, decision) {
        (RematchStatus::Pending, _) => {
            let mut next = request.clone();
            next.responded_at = Some(now);
            match decision {
                RematchDecision::Accept => {
                    next.status = RematchStatus::Accepted;
                    next.new_challenge_id = Some(new_battle_id);
                }
                RematchDecision::Decline => next.status = RematchStatus::Declined,
            }
            Ok(Some(next))
        }
        (RematchStatus::Accepted, RematchDecision::Accept)
        | (RematchStatus::Declined, RematchDecision::Decline) => Ok(None),
        (RematchStatus::Expired, _) => Err(BattleError::RematchExpired),
        _ => Err(BattleError::RematchNotPending),
    }
}

/// The fresh battle spawned by an accepted rematch. The requester challenges;
/// both identities are known so it starts at `ReadyToStart`.
pub fn rematch_battle(
    original: &Battle,
    request: &RematchRequest,
    new_battle_id: BattleId,
    now: DateTime<Utc>,
) -> Result<Battle, BattleError> {
    let requester = original
        .player(request.requester_role)
        .cloned()
        .ok_or(BattleError::NotAParticipant)?;
    let responder = original
        .player(request.requester_role.other())
        .cloned()
        .ok_or(BattleError::NotAParticipant)?;

    Ok(Battle {
        id: new_battle_id,
        challenger: requester,
        opponent: Some(responder),
        status: BattleStatus::ReadyToStart,
        current_word_index: 0,
        max_words: original.max_words,
        challenger_score: 0,
        opponent_score: 0,
        winner: None,
        created_at: now,
        started_at: None,
        completed_at: None,
        current_round_start_time: None,
        hidden: false,
        deleted: false,
        rematch_of: Some(original.id),
        challenger_credited: 0,
        opponent_credited: 0,
        version: 0,
    })
}
