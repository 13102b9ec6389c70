//! Per-invocation mode context.

use serde::{Deserialize, Serialize};

/// The application section a message was sent from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Chat,
    Avatar,
    FileEdit,
    Knowledge,
    Agents,
}

impl std::str::FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "chat" => Ok(Self::Chat),
            "avatar" => Ok(Self::Avatar),
            "file_edit" => Ok(Self::FileEdit),
            "knowledge" => Ok(Self::Knowledge),
            "agents" => Ok(Self::Agents),
            other => Err(format!("unknown section '{other}'")),
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Chat => "chat",
            Self::Avatar => "avatar",
            Self::FileEdit => "file_edit",
            Self::Knowledge => "knowledge",
            Self::Agents => "agents",
        };
        write!(f, "{}", s)
    }
}

/// Selected knowledge bases and the retrieval stack behind them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSelection {
    pub kb_ids: Vec<String>,
    pub query_engine: Option<String>,
    pub embedding_model: Option<String>,
}

impl KnowledgeSelection {
    pub fn is_empty(&self) -> bool {
        self.kb_ids.is_empty()
    }
}

/// Limits passed to the task orchestrator in Agent mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmLimits {
    pub max_agents: u32,
    pub max_iterations: u32,
    pub timeout_secs: u64,
}

impl Default for SwarmLimits {
    fn default() -> Self {
        Self {
            max_agents: 5,
            max_iterations: 20,
            timeout_secs: 600,
        }
    }
}

/// Persona the assistant speaks as in the avatar section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarPersona {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The file open in the editor, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFile {
    pub name: String,
    /// Lowercase extension without the dot.
    pub extension: String,
    pub content: String,
}

impl ActiveFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            name,
            extension,
            content: content.into(),
        }
    }
}

/// Everything about where and how a message was sent. Supplied fresh per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeContext {
    pub section: Section,
    pub workspace_id: Option<String>,
    pub knowledge: KnowledgeSelection,
    pub tool_server_ids: Vec<String>,
    pub limits: SwarmLimits,
    pub avatar: Option<AvatarPersona>,
    pub active_file: Option<ActiveFile>,
}

impl ModeContext {
    pub fn new(section: Section) -> Self {
        Self {
            section,
            workspace_id: None,
            knowledge: KnowledgeSelection::default(),
            tool_server_ids: Vec::new(),
            limits: SwarmLimits::default(),
            avatar: None,
            active_file: None,
        }
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeSelection) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_tool_servers(mut self, server_ids: Vec<String>) -> Self {
        self.tool_server_ids = server_ids;
        self
    }

    pub fn with_limits(mut self, limits: SwarmLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_avatar(mut self, avatar: AvatarPersona) -> Self {
        self.avatar = Some(avatar);
        self
    }

    pub fn with_active_file(mut self, file: ActiveFile) -> Self {
        self.active_file = Some(file);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_parsing() {
        assert_eq!("file-edit".parse::<Section>().unwrap(), Section::FileEdit);
        assert_eq!("Knowledge".parse::<Section>().unwrap(), Section::Knowledge);
        assert!("nowhere".parse::<Section>().is_err());
        assert_eq!(Section::FileEdit.to_string(), "file_edit");
    }

    #[test]
    fn test_active_file_extension() {
        assert_eq!(ActiveFile::new("Report.DOCX", "").extension, "docx");
        assert_eq!(ActiveFile::new("Makefile", "").extension, "");
    }
}
