pub use super::battles::Entity as Battles;
pub use super::rematch_requests::Entity as RematchRequests;
pub use super::round_attempts::Entity as RoundAttempts;
pub use super::round_words::Entity as RoundWords;
