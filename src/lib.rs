//! Chorus: response-mode orchestration for chat assistants.
//!
//! A user message arrives with a [`chat::ModeContext`]; the
//! [`agent::ResponseOrchestrator`] picks Ask, Query or Agent mode from its
//! section, streams or delegates the response, and walks every proposed
//! tool call through approval, execution and summarization.

pub mod agent;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod store;
pub mod task;
pub mod testing;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};
