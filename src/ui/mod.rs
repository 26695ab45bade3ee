//! Server-rendered portal page and the chat transcript model.
//!
//! - [`page`]: the HTML shell at `/` and the `/history` endpoint
//! - [`transcript`]: chat bubbles and how relay events change them
//! - [`composer`]: the input box submit rule

pub mod composer;
pub mod page;
pub mod transcript;

pub use composer::{Attachment, Composer};
pub use transcript::{Bubble, BubbleRole, Transcript};
