use chrono::{DateTime, TimeDelta, Utc};
use duel_types::{AssistKind, BattleError, BattleId, PlayerId, PlayerRole, RoundAttempt};
use uuid::Uuid;

/// Lowercases and collapses all whitespace runs to single spaces.
pub fn normalize_word(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Round score policy. A solved round never scores below `min_score`;
/// an unsolved one scores nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringPolicy {
    pub max_score: u32,
    pub attempt_penalty: u32,
    pub assist_penalty: u32,
    pub seconds_per_point: u32,
    pub min_score: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            max_score: 100,
            attempt_penalty: 10,
            assist_penalty: 15,
            seconds_per_point: 6,
            min_score: 10,
        }
    }
}

impl ScoringPolicy {
    pub fn round_score(&self, attempts_used: u32, assists_used: u32, elapsed: TimeDelta) -> u32 {
        let extra_attempts = attempts_used.saturating_sub(1);
        let elapsed_secs = u32::try_from(elapsed.num_seconds().max(0)).unwrap_or(u32::MAX);
        let time_penalty = if self.seconds_per_point == 0 {
            0
        } else {
            elapsed_secs / self.seconds_per_point
        };

        let deductions = extra_attempts
            .saturating_mul(self.attempt_penalty)
            .saturating_add(assists_used.saturating_mul(self.assist_penalty))
            .saturating_add(time_penalty);

        self.max_score
            .saturating_sub(deductions)
            .max(self.min_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessEvaluation {
    pub correct: bool,
    pub attempts_used: u32,
    pub score_if_correct: u32,
}

/// Validation and arithmetic over RoundAttempts. Produces new values only;
/// persisting them is the caller's job.
#[derive(Debug, Clone)]
pub struct AttemptLedger {
    policy: ScoringPolicy,
    max_attempts: u32,
}

impl AttemptLedger {
    pub fn new(policy: ScoringPolicy, max_attempts: u32) -> Self {
        Self {
            policy,
            max_attempts,
        }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn new_attempt(
        &self,
        battle_id: BattleId,
        round_index: u32,
        word_id: Uuid,
        role: PlayerRole,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> RoundAttempt {
        RoundAttempt {
            id: Uuid::new_v4(),
            battle_id,
            round_index,
            word_id,
            role,
            player_id,
            attempts_used: 0,
            completed: false,
            completed_at: None,
            current_guess: String::new(),
            score: None,
            elapsed_ms: None,
            hint_used: false,
            clue_used: false,
            invite_friend_used: false,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Solved, or out of attempts. Either way the player has nothing left to do this round.
    pub fn is_settled(&self, attempt: &RoundAttempt) -> bool {
        attempt.completed || attempt.attempts_used >= self.max_attempts
    }

    /// The role and points this attempt contributes once settled. A forfeit earns zero.
    pub fn settlement(&self, attempt: &RoundAttempt) -> Option<(PlayerRole, u32)> {
        self.is_settled(attempt)
            .then(|| (attempt.role, attempt.score.unwrap_or(0)))
    }

    pub fn attempts_remaining(&self, attempt: &RoundAttempt) -> u32 {
        self.max_attempts.saturating_sub(attempt.attempts_used)
    }

    pub fn check_can_guess(&self, attempt: &RoundAttempt) -> Result<(), BattleError> {
        if attempt.completed {
            return Err(BattleError::RoundAlreadyCompleted);
        }
        if attempt.attempts_used >= self.max_attempts {
            return Err(BattleError::AttemptsExhausted);
        }
        Ok(())
    }

    /// Judge `guess` against `target` given the attempts already spent.
    pub fn evaluate(
        &self,
        guess: &str,
        target: &str,
        attempts_used: u32,
        assists_used: u32,
        elapsed: TimeDelta,
    ) -> Result<GuessEvaluation, BattleError> {
        let guess = normalize_word(guess);
        if guess.is_empty() {
            return Err(BattleError::EmptyGuess);
        }
        if attempts_used >= self.max_attempts {
            return Err(BattleError::AttemptsExhausted);
        }

        let attempts_used = attempts_used + 1;
        Ok(GuessEvaluation {
            correct: guess == normalize_word(target),
            attempts_used,
            score_if_correct: self.policy.round_score(attempts_used, assists_used, elapsed),
        })
    }

    /// Apply a guess to the player's attempt record.
    pub fn record_guess(
        &self,
        attempt: &RoundAttempt,
        guess: &str,
        target: &str,
        round_started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(RoundAttempt, GuessEvaluation), BattleError> {
        self.check_can_guess(attempt)?;

        let elapsed = now - round_started_at;
        let evaluation = self.evaluate(
            guess,
            target,
            attempt.attempts_used,
            attempt.assists_used(),
            elapsed,
        )?;

        let mut updated = attempt.clone();
        updated.attempts_used = evaluation.attempts_used;
        updated.current_guess = guess.trim().to_string();
        updated.updated_at = now;

        if evaluation.correct {
            updated.completed = true;
            updated.completed_at = Some(now);
            updated.score = Some(evaluation.score_if_correct);
            updated.elapsed_ms = Some(elapsed.num_milliseconds().max(0) as u64);
        }

        Ok((updated, evaluation))
    }

    /// Store in-progress text without spending an attempt.
    pub fn record_draft(
        &self,
        attempt: &RoundAttempt,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<RoundAttempt, BattleError> {
        self.check_can_guess(attempt)?;

        let mut updated = attempt.clone();
        updated.current_guess = text.to_string();
        updated.updated_at = now;
        Ok(updated)
    }

    /// Flip a one-shot assist flag. Flags never go back to false.
    pub fn record_assist(
        &self,
        attempt: &RoundAttempt,
        kind: AssistKind,
        now: DateTime<Utc>,
    ) -> Result<RoundAttempt, BattleError> {
        if attempt.assist_used(kind) {
            return Err(BattleError::AssistAlreadyUsed { kind });
        }
        self.check_can_guess(attempt)?;

        let mut updated = attempt.clone();
        match kind {
            AssistKind::Hint => updated.hint_used = true,
            AssistKind::Clue => updated.clue_used = true,
            AssistKind::InviteFriend => updated.invite_friend_used = true,
        }
        updated.updated_at = now;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> AttemptLedger {
        AttemptLedger::new(ScoringPolicy::default(), 6)
    }

    fn fresh_attempt(now: DateTime<Utc>) -> RoundAttempt {
        ledger().new_attempt(
            Uuid::new_v4(),
            0,
            Uuid::new_v4(),
            PlayerRole::Challenger,
            Uuid::new_v4(),
            now,
        )
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_word("  Ocean "), "ocean");
        assert_eq!(normalize_word("ICE\t  Cream"), "ice cream");
        assert_eq!(normalize_word("   "), "");
    }

    #[test]
    fn test_first_attempt_instant_scores_maximum() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.round_score(1, 0, TimeDelta::zero()), 100);
    }

    #[test]
    fn test_deductions() {
        let policy = ScoringPolicy::default();
        // Third attempt: two extra attempts
        assert_eq!(policy.round_score(3, 0, TimeDelta::zero()), 80);
        // One assist
        assert_eq!(policy.round_score(1, 1, TimeDelta::zero()), 85);
        // 30 seconds elapsed -> 5 points
        assert_eq!(policy.round_score(1, 0, TimeDelta::seconds(30)), 95);
        // Everything at once still floors at the minimum
        assert_eq!(policy.round_score(6, 3, TimeDelta::seconds(60)), 10);
    }

    #[test]
    fn test_negative_elapsed_is_not_a_bonus() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.round_score(1, 0, TimeDelta::seconds(-30)), 100);
    }

    #[test]
    fn test_evaluate_is_case_and_whitespace_insensitive() {
        let result = ledger()
            .evaluate("  OCEAN ", "ocean", 0, 0, TimeDelta::zero())
            .unwrap();
        assert!(result.correct);
        assert_eq!(result.attempts_used, 1);
        assert_eq!(result.score_if_correct, 100);

        let wrong = ledger()
            .evaluate("oceans", "ocean", 1, 0, TimeDelta::zero())
            .unwrap();
        assert!(!wrong.correct);
        assert_eq!(wrong.attempts_used, 2);
    }

    #[test]
    fn test_evaluate_rejects_empty_and_exhausted() {
        assert_eq!(
            ledger().evaluate("  ", "ocean", 0, 0, TimeDelta::zero()),
            Err(BattleError::EmptyGuess)
        );
        assert_eq!(
            ledger().evaluate("ocean", "ocean", 6, 0, TimeDelta::zero()),
            Err(BattleError::AttemptsExhausted)
        );
    }

    #[test]
    fn test_record_correct_guess_completes_attempt() {
        let start = Utc::now();
        let attempt = fresh_attempt(start);
        let now = start + TimeDelta::seconds(12);

        let (updated, evaluation) = ledger()
            .record_guess(&attempt, "Ocean", "ocean", start, now)
            .unwrap();

        assert!(evaluation.correct);
        assert!(updated.completed);
        assert_eq!(updated.completed_at, Some(now));
        assert_eq!(updated.score, Some(98));
        assert_eq!(updated.elapsed_ms, Some(12_000));
        assert_eq!(updated.current_guess, "Ocean");

        let again = ledger().record_guess(&updated, "ocean", "ocean", start, now);
        assert_eq!(again.unwrap_err(), BattleError::RoundAlreadyCompleted);
    }

    #[test]
    fn test_wrong_guesses_until_settled() {
        let start = Utc::now();
        let ledger = ledger();
        let mut attempt = fresh_attempt(start);

        for _ in 0..6 {
            let (next, evaluation) = ledger
                .record_guess(&attempt, "river", "ocean", start, start)
                .unwrap();
            assert!(!evaluation.correct);
            attempt = next;
        }

        assert!(ledger.is_settled(&attempt));
        assert_eq!(ledger.attempts_remaining(&attempt), 0);
        assert!(attempt.score.is_none());
        assert_eq!(
            ledger.record_guess(&attempt, "ocean", "ocean", start, start).unwrap_err(),
            BattleError::AttemptsExhausted
        );
    }

    #[test]
    fn test_assists_are_one_shot_and_penalised() {
        let start = Utc::now();
        let ledger = ledger();
        let attempt = fresh_attempt(start);

        let with_hint = ledger.record_assist(&attempt, AssistKind::Hint, start).unwrap();
        assert!(with_hint.hint_used);
        assert_eq!(
            ledger.record_assist(&with_hint, AssistKind::Hint, start),
            Err(BattleError::AssistAlreadyUsed {
                kind: AssistKind::Hint
            })
        );

        let with_clue = ledger.record_assist(&with_hint, AssistKind::Clue, start).unwrap();
        assert_eq!(with_clue.assists_used(), 2);

        let (solved, _) = ledger
            .record_guess(&with_clue, "ocean", "ocean", start, start)
            .unwrap();
        assert_eq!(solved.score, Some(70));
    }

    #[test]
    fn test_no_assists_once_out_of_attempts() {
        let start = Utc::now();
        let ledger = ledger();
        let mut attempt = fresh_attempt(start);
        for _ in 0..6 {
            attempt = ledger
                .record_guess(&attempt, "river", "ocean", start, start)
                .unwrap()
                .0;
        }

        assert_eq!(
            ledger.record_assist(&attempt, AssistKind::Hint, start),
            Err(BattleError::AttemptsExhausted)
        );
        assert_eq!(ledger.settlement(&attempt), Some((attempt.role, 0)));
    }

    #[test]
    fn test_draft_does_not_spend_attempts() {
        let start = Utc::now();
        let attempt = fresh_attempt(start);
        let drafted = ledger().record_draft(&attempt, "oce", start).unwrap();
        assert_eq!(drafted.current_guess, "oce");
        assert_eq!(drafted.attempts_used, 0);
    }
}
