//! Tool server pool and registry resolution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ToolError;
use crate::tools::tool::{ToolDescriptor, ToolServer, validate_tool_schema};

/// Source of tool declarations per server.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Whether the server is enabled. Unknown servers are not.
    fn is_enabled(&self, server_id: &str) -> bool;

    /// Raw declarations for a server.
    async fn declared_tools(&self, server_id: &str) -> Result<Vec<serde_json::Value>, ToolError>;
}

struct PoolEntry {
    server: Arc<dyn ToolServer>,
    enabled: bool,
}

/// Connected tool servers, keyed by id. Read-only once built.
#[derive(Default)]
pub struct ToolServerPool {
    servers: HashMap<String, PoolEntry>,
}

impl ToolServerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an enabled server.
    pub fn with_server(self, server: Arc<dyn ToolServer>) -> Self {
        self.with_server_enabled(server, true)
    }

    pub fn with_server_enabled(mut self, server: Arc<dyn ToolServer>, enabled: bool) -> Self {
        self.servers
            .insert(server.id().to_string(), PoolEntry { server, enabled });
        self
    }

    pub fn get(&self, server_id: &str) -> Option<Arc<dyn ToolServer>> {
        self.servers.get(server_id).map(|e| Arc::clone(&e.server))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[async_trait]
impl ToolCatalog for ToolServerPool {
    fn is_enabled(&self, server_id: &str) -> bool {
        self.servers.get(server_id).is_some_and(|e| e.enabled)
    }

    async fn declared_tools(&self, server_id: &str) -> Result<Vec<serde_json::Value>, ToolError> {
        let entry = self
            .servers
            .get(server_id)
            .ok_or_else(|| ToolError::ServerNotFound {
                server_id: server_id.to_string(),
            })?;
        entry.server.list_tools().await
    }
}

/// Turns a selection of server ids into de-duplicated tool descriptors.
pub struct ToolRegistryResolver {
    catalog: Arc<dyn ToolCatalog>,
}

impl ToolRegistryResolver {
    pub fn new(catalog: Arc<dyn ToolCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolve the selected servers' tools.
    ///
    /// Disabled servers, failed listings and malformed entries are skipped.
    /// Names are unique across the result; the first server listing a name
    /// keeps it.
    pub async fn resolve(&self, server_ids: &[String]) -> Vec<ToolDescriptor> {
        let mut seen = HashSet::new();
        let mut tools = Vec::new();

        for server_id in server_ids {
            if !self.catalog.is_enabled(server_id) {
                tracing::debug!(server_id = %server_id, "Skipping disabled tool server");
                continue;
            }

            let entries = match self.catalog.declared_tools(server_id).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(server_id = %server_id, error = %e, "Tool listing failed, skipping server");
                    continue;
                }
            };

            for entry in &entries {
                let Some(descriptor) = ToolDescriptor::from_declaration(server_id, entry) else {
                    tracing::warn!(server_id = %server_id, "Skipping malformed tool declaration");
                    continue;
                };

                if !seen.insert(descriptor.name.clone()) {
                    tracing::debug!(
                        server_id = %server_id,
                        tool = %descriptor.name,
                        "Duplicate tool name, keeping first"
                    );
                    continue;
                }

                let errors =
                    validate_tool_schema(&descriptor.parameters, &descriptor.name);
                if !errors.is_empty() {
                    tracing::warn!(
                        tool = %descriptor.name,
                        errors = ?errors,
                        "Tool parameter schema has structural problems"
                    );
                }

                tools.push(descriptor);
            }
        }

        tracing::debug!(count = tools.len(), "Resolved tools");
        tools
    }
}
