//! Error types for the response orchestrator.

use thiserror::Error;
use uuid::Uuid;

use crate::tools::ToolCallStatus;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Tool call error: {0}")]
    ToolCall(#[from] ToolCallError),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration problems. These fail fast before any message state is written.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting {key}: {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No model selected")]
    NoModelSelected,

    #[error("No provider selected for model '{model}'")]
    NoProviderSelected { model: String },

    #[error("Agent mode requires a task orchestrator, none is configured")]
    NoTaskOrchestrator,
}

/// Failures talking to the completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned an invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} rate limited the request")]
    RateLimited { provider: String },
}

/// Failures resolving or invoking a tool-execution server.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool server '{server_id}' is not connected")]
    ServerNotFound { server_id: String },

    #[error("Listing tools on server '{server_id}' failed: {reason}")]
    ListingFailed { server_id: String, reason: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' failed: {reason}")]
    ExecutionFailed { name: String, reason: String },
}

/// Failures talking to the task orchestrator.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task delegation failed: {reason}")]
    DelegationFailed { reason: String },

    #[error("Forwarding decision for approval {approval_id} failed: {reason}")]
    ApprovalForwardFailed { approval_id: String, reason: String },

    #[error("Aborting task {task_id} failed: {reason}")]
    AbortFailed { task_id: String, reason: String },
}

/// Failures writing to the message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Writing message {message_id} failed: {reason}")]
    WriteFailed { message_id: Uuid, reason: String },
}

/// Tool-call lifecycle violations.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("Message {message_id} not found")]
    MessageNotFound { message_id: Uuid },

    #[error("Tool call {id} not found on message {message_id}")]
    NotFound { message_id: Uuid, id: String },

    #[error("Tool call {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ToolCallStatus,
        to: ToolCallStatus,
    },

    #[error("Tool call {id} is already executing")]
    AlreadyExecuting { id: String },

    #[error("Tool call {id} already has a decision in flight")]
    DecisionInFlight { id: String },

    #[error("Tool call {id} is not delegated")]
    NotDelegated { id: String },

    #[error("Tool call {id} is delegated and executes remotely")]
    ExecutesRemotely { id: String },

    #[error("Tool call id {id} is already used on message {message_id}")]
    IdCollision { message_id: Uuid, id: String },
}
