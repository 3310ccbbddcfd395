//! Transactional conversation state: chats and per-chat message histories.
//!
//! All cross-turn coordination goes through [`StateStore::read`] /
//! [`StateStore::write`]. Writes are all-or-nothing: an `Err` returned from
//! the transaction closure discards every change made inside it.

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{StateStore, StoreState};
