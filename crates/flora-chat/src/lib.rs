//! Chat on top of plant identifications
//!
//! [`Handoff`] decides, once per identification, whether a result carries
//! what is needed to open a chat ([`ChatTarget`]). [`ConversationSession`]
//! then drives a single conversation through a [`ChatBackend`], normally the
//! shared [`flora_store::FloraStore`].

mod handoff;
mod session;

pub use handoff::{ChatTarget, Handoff, SecretLookup, SecretSource};
pub use session::{ChatBackend, ConversationSession, HistoryPager, SessionState};
