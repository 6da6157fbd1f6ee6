use std::time::{Duration, Instant};

/// Token bucket guarding a single connection's inbound message rate.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tokens: u32,
    max_tokens: u32,
    refill_interval: Duration,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        // Draft updates are sent per keystroke
        Self::new_with_limits(60, Duration::from_millis(500))
    }

    pub fn new_with_limits(max_tokens: u32, refill_interval: Duration) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_interval,
            last_refill: Instant::now(),
        }
    }

    pub fn check_rate_limit(&mut self) -> bool {
        self.refill_tokens();

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill_tokens(&mut self) {
        let elapsed = self.last_refill.elapsed();
        if self.refill_interval.is_zero() {
            self.tokens = self.max_tokens;
            return;
        }

        let earned = elapsed.as_millis() / self.refill_interval.as_millis().max(1);
        if earned > 0 {
            let earned = u32::try_from(earned).unwrap_or(u32::MAX);
            self.tokens = self.tokens.saturating_add(earned).min(self.max_tokens);
            self.last_refill += self.refill_interval * earned.min(self.max_tokens);
            if self.tokens == self.max_tokens {
                self.last_refill = Instant::now();
            }
        }
    }

    pub fn remaining_tokens(&mut self) -> u32 {
        self.refill_tokens();
        self.tokens
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
