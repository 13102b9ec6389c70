//! Response orchestration.
//!
//! - [`Mode`] picks Ask, Query or Agent from the section a message came from
//! - [`ResponseOrchestrator`] runs the chosen strategy and drives tool calls
//! - [`ResultSummarizer`] turns finished tool results into a follow-up message

mod ask;
mod delegate;
mod mode;
mod orchestrator;
mod summarizer;
mod transcript;

pub use ask::{ASK_FAILURE_TEXT, EMPTY_QUERY_TEXT, STOPPED_MARKER};
pub use delegate::TASK_FAILED_TEXT;
pub use mode::Mode;
pub use orchestrator::{OrchestratorDeps, RespondRequest, ResponseOrchestrator, ResponseOutcome};
pub use summarizer::{ResultSummarizer, SUMMARY_FAILED_TEXT, is_ready as summary_ready};
pub use transcript::build_transcript;
