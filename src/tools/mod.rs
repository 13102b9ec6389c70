//! Tool servers, descriptors and the tool-call lifecycle.
//!
//! Tools live on external tool-execution servers. The model proposes calls,
//! the user (or an auto-approve policy) decides, and approved calls run
//! against the server pool.

pub mod executor;
pub mod lifecycle;
pub mod log;
pub mod registry;
pub mod state;

mod tool;

pub use executor::{ExecutionReport, execute_tool_call};
pub use lifecycle::{RemoteToolCallUpdate, ToolCallLifecycle};
pub use log::{InMemoryToolLog, ToolLogSink};
pub use registry::{ToolCatalog, ToolRegistryResolver, ToolServerPool};
pub use state::{ApprovalPolicy, ToolCall, ToolCallOrigin, ToolCallStatus};
pub use tool::{ToolDescriptor, ToolServer, interpret_envelope, validate_tool_schema};
