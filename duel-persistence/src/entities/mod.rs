pub mod prelude;

pub mod battles;
pub mod rematch_requests;
pub mod round_attempts;
pub mod round_words;
