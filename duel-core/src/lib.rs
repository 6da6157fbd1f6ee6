pub mod attempt_ledger;
pub mod battle_events;
pub mod battle_machine;
pub mod clock;
pub mod projection;
pub mod rematch;
pub mod word_source;

// Re-export main components
pub use attempt_ledger::*;
pub use battle_events::*;
pub use battle_machine::*;
pub use clock::*;
pub use projection::*;
pub use rematch::*;
pub use word_source::*;
