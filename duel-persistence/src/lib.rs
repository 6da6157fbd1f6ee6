pub mod connection;
pub mod entities;
pub mod memory;
pub mod sql;
pub mod store;

pub use connection::*;
pub use memory::MemoryStore;
pub use sql::SqlStore;
pub use store::{BattleStore, StoreError};
