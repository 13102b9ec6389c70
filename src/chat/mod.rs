//! Chat messages, mode context and shared chat state.

mod context;
mod message;
mod state;

pub use context::{
    ActiveFile, AvatarPersona, KnowledgeSelection, ModeContext, Section, SwarmLimits,
};
pub use message::{Identity, Message, MessageStatus, Reaction};
pub use state::ChatState;
