//! Real-time relay between browser tabs and the assistant.
//!
//! # Events
//!
//! | direction | event | delivered to |
//! |-----------|-------|--------------|
//! | client → server | `chat_request` | |
//! | server → client | `ai_thinking` | everyone |
//! | server → client | `chat_update` | everyone |
//! | server → client | `sys_status` | everyone |
//! | server → client | `error_message` | requesting connection |

pub mod chat;
pub mod events;
pub mod form;
pub mod hub;
pub mod socket;

pub use chat::ChatService;
pub use events::{ChatRequest, ChatUpdate, ClientEvent, ServerEvent};
pub use hub::RelayHub;
