//! System prompt assembly for each response mode.

mod assembler;
mod rules;
mod templates;

pub use assembler::{PromptInput, PromptTemplates, SystemPromptAssembler};
pub use rules::{NoRules, RulesProvider, StaticRules};
pub use templates::{RICH_DOCUMENT_EXTENSIONS, is_rich_document};
