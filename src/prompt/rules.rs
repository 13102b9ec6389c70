//! Mode-scoped rules appended to every system prompt.

use std::collections::HashMap;

use crate::agent::Mode;

/// Source of operator rules. Must be a pure string transformation.
pub trait RulesProvider: Send + Sync {
    fn apply_rules(&self, mode: Mode, prompt: String) -> String;
}

/// Leaves prompts unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRules;

impl RulesProvider for NoRules {
    fn apply_rules(&self, _mode: Mode, prompt: String) -> String {
        prompt
    }
}

/// Fixed rule lists per mode, appended as a bulleted section.
#[derive(Debug, Default, Clone)]
pub struct StaticRules {
    rules: HashMap<Mode, Vec<String>>,
}

impl StaticRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, mode: Mode, rule: impl Into<String>) -> Self {
        self.rules.entry(mode).or_default().push(rule.into());
        self
    }
}

impl RulesProvider for StaticRules {
    fn apply_rules(&self, mode: Mode, mut prompt: String) -> String {
        let Some(rules) = self.rules.get(&mode).filter(|r| !r.is_empty()) else {
            return prompt;
        };
        prompt.push_str("\n\n## Rules\n");
        for rule in rules {
            prompt.push_str("- ");
            prompt.push_str(rule);
            prompt.push('\n');
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_rules_are_mode_scoped() {
        let rules = StaticRules::new()
            .with_rule(Mode::Ask, "Be brief.")
            .with_rule(Mode::Ask, "No emojis.");

        let ask = rules.apply_rules(Mode::Ask, "base".into());
        assert_eq!(ask, "base\n\n## Rules\n- Be brief.\n- No emojis.\n");
        assert_eq!(rules.apply_rules(Mode::Query, "base".into()), "base");
        assert_eq!(NoRules.apply_rules(Mode::Agent, "x".into()), "x");
    }
}
