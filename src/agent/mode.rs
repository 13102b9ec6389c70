//! Response mode selection.

use serde::{Deserialize, Serialize};

use crate::chat::Section;

/// How a user message is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Direct conversational answer.
    Ask,
    /// Knowledge-base-augmented answer.
    Query,
    /// Delegated multi-agent task.
    Agent,
}

impl Mode {
    /// Pick the mode for the section a message was sent from.
    pub fn for_section(section: Section) -> Self {
        match section {
            Section::Chat | Section::Avatar | Section::FileEdit => Self::Ask,
            Section::Knowledge => Self::Query,
            Section::Agents => Self::Agent,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ask => "ask",
            Self::Query => "query",
            Self::Agent => "agent",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_to_mode() {
        assert_eq!(Mode::for_section(Section::Chat), Mode::Ask);
        assert_eq!(Mode::for_section(Section::Avatar), Mode::Ask);
        assert_eq!(Mode::for_section(Section::FileEdit), Mode::Ask);
        assert_eq!(Mode::for_section(Section::Knowledge), Mode::Query);
        assert_eq!(Mode::for_section(Section::Agents), Mode::Agent);
    }
}
