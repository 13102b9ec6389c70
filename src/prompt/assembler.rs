//! System prompt assembly.

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Mode;
use crate::chat::{Identity, ModeContext};
use crate::prompt::rules::RulesProvider;
use crate::prompt::templates;

/// Operator-supplied templates, one per mode.
#[derive(Debug, Clone, Default)]
pub struct PromptTemplates {
    custom: HashMap<Mode, String>,
}

impl PromptTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, mode: Mode, template: impl Into<String>) -> Self {
        self.custom.insert(mode, template.into());
        self
    }

    pub fn get(&self, mode: Mode) -> Option<&str> {
        self.custom
            .get(&mode)
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
    }
}

/// Who is talking, in which mode, with which extras.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub user: &'a Identity,
    pub assistant: &'a Identity,
    pub mode: Mode,
    pub context: &'a ModeContext,
}

/// Builds the system instruction for one completion.
pub struct SystemPromptAssembler {
    templates: PromptTemplates,
    rules: Arc<dyn RulesProvider>,
}

impl SystemPromptAssembler {
    pub fn new(templates: PromptTemplates, rules: Arc<dyn RulesProvider>) -> Self {
        Self { templates, rules }
    }

    /// Assemble the prompt: template (custom or default), placeholder
    /// substitution, then the mode's rules.
    pub fn assemble(&self, input: PromptInput<'_>) -> String {
        let template = self
            .templates
            .get(input.mode)
            .unwrap_or_else(|| default_template(&input));
        let prompt = substitute(template, &input);
        self.rules.apply_rules(input.mode, prompt)
    }
}

fn default_template(input: &PromptInput<'_>) -> &'static str {
    match input.mode {
        Mode::Ask => match &input.context.active_file {
            Some(file) if templates::is_rich_document(&file.extension) => {
                templates::ASK_RICH_DOCUMENT
            }
            Some(_) => templates::ASK_CODE_FILE,
            None if input.context.avatar.is_some() => templates::ASK_AVATAR,
            None => templates::ASK,
        },
        Mode::Query => templates::QUERY,
        Mode::Agent => templates::AGENT,
    }
}

/// Fill placeholders in one left-to-right pass. Substituted values are never
/// scanned again, so a username or file that contains `{kb.ids}` stays as is.
fn substitute(template: &str, input: &PromptInput<'_>) -> String {
    let ctx = input.context;
    let file = ctx.active_file.as_ref();
    let kb_ids = if ctx.knowledge.kb_ids.is_empty() {
        "none".to_string()
    } else {
        ctx.knowledge.kb_ids.join(", ")
    };
    let avatar_name = ctx
        .avatar
        .as_ref()
        .map(|a| a.name.as_str())
        .unwrap_or(input.assistant.display_name.as_str());

    let replacements: [(&str, &str); 9] = [
        ("{agent.username}", input.assistant.username.as_str()),
        ("{user.username}", input.user.username.as_str()),
        ("{avatar.name}", avatar_name),
        ("{file.name}", file.map(|f| f.name.as_str()).unwrap_or("")),
        (
            "{file.extension}",
            file.map(|f| f.extension.as_str()).unwrap_or(""),
        ),
        ("{kb.ids}", kb_ids.as_str()),
        (
            "{query.engine}",
            ctx.knowledge.query_engine.as_deref().unwrap_or("default"),
        ),
        (
            "{embedding.model}",
            ctx.knowledge.embedding_model.as_deref().unwrap_or("default"),
        ),
        ("{file.content}", file.map(|f| f.content.as_str()).unwrap_or("")),
    ];

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match replacements.iter().find(|(p, _)| tail.starts_with(p)) {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
