pub mod attempt;
pub mod battle;
pub mod errors;
pub mod messages;
pub mod rematch;
pub mod view;

// Re-export all types
pub use attempt::*;
pub use battle::*;
pub use errors::*;
pub use messages::*;
pub use rematch::*;
pub use view::*;
