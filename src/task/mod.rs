//! Delegation to the multi-agent task orchestrator and human-in-the-loop state.

mod interaction;
mod orchestrator;

pub use interaction::{
    CleanupReason, HumanLoopRegistry, InMemoryHumanLoopRegistry, InteractionTracker,
};
pub use orchestrator::{TaskOptions, TaskOrchestrator, TaskOutcome, TaskRequest};
