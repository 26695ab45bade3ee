//! SQLite persistence for chat history, daily notes and registered apps.
//!
//! # Example
//!
//! ```rust,ignore
//! use lefte_portal::storage::{ChatStore, Role};
//!
//! let store = ChatStore::in_memory().await?;
//! store.save_message(Role::User, "おはよう", None, None).await?;
//! let today = store.today_history().await?;
//! assert_eq!(today.len(), 1);
//! ```

mod chat_store;

pub use chat_store::{ChatStore, NoteStatus, RegisteredApp, Role, StoredMessage};
