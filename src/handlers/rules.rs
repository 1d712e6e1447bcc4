//! Configurable regex reply rules

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::Result;
use crate::context::ContextStore;

use super::Handler;

/// Reply rule configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyRule {
    /// Regex pattern to match against the transcript
    pub pattern: String,
    /// Reply text; `{{input}}` expands to the transcript
    pub reply: String,
    /// Case insensitive matching
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
}

const fn default_true() -> bool {
    true
}

/// Compiled reply rule
struct CompiledRule {
    pattern: Regex,
    reply: String,
}

impl CompiledRule {
    fn compile(rule: &ReplyRule) -> std::result::Result<Self, regex::Error> {
        let pattern = if rule.case_insensitive {
            Regex::new(&format!("(?i){}", rule.pattern))?
        } else {
            Regex::new(&rule.pattern)?
        };

        Ok(Self {
            pattern,
            reply: rule.reply.clone(),
        })
    }

    fn expand_reply(&self, input: &str) -> String {
        self.reply.replace("{{input}}", input)
    }
}

/// Answers inputs matching a configured pattern with a fixed reply
pub struct RulesHandler {
    rules: Vec<CompiledRule>,
}

impl RulesHandler {
    /// Compile the rules
    ///
    /// Invalid rules are logged and skipped
    #[must_use]
    pub fn new(rules: &[ReplyRule]) -> Self {
        let compiled: Vec<_> = rules
            .iter()
            .filter_map(|r| match CompiledRule::compile(r) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    tracing::warn!(
                        pattern = %r.pattern,
                        error = %e,
                        "invalid reply rule pattern, skipping"
                    );
                    None
                }
            })
            .collect();

        tracing::debug!(count = compiled.len(), "loaded reply rules");

        Self { rules: compiled }
    }

    /// Check if handler has any rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn matching(&self, input: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.pattern.is_match(input))
    }
}

#[async_trait]
impl Handler for RulesHandler {
    fn name(&self) -> &str {
        "rules"
    }

    fn description(&self) -> &str {
        "配置的固定回复规则"
    }

    fn accepts(&self, input: &str, _context: &ContextStore) -> Result<bool> {
        Ok(self.matching(input).is_some())
    }

    async fn respond(&self, input: &str, _context: &mut ContextStore) -> Result<Option<String>> {
        Ok(self.matching(input).map(|rule| {
            tracing::debug!(pattern = %rule.pattern, "reply rule matched");
            rule.expand_reply(input)
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn rule(pattern: &str, reply: &str) -> ReplyRule {
        ReplyRule {
            pattern: pattern.to_string(),
            reply: reply.to_string(),
            case_insensitive: true,
        }
    }

    fn context() -> ContextStore {
        ContextStore::with_limits(Duration::from_secs(120), 10)
    }

    #[tokio::test]
    async fn test_simple_match() {
        let handler = RulesHandler::new(&[rule("^ping$", "pong")]);
        let mut ctx = context();

        assert!(handler.accepts("PING", &ctx).unwrap());
        assert_eq!(
            handler.respond("PING", &mut ctx).await.unwrap().as_deref(),
            Some("pong")
        );
        assert!(!handler.accepts("ping pong", &ctx).unwrap());
    }

    #[tokio::test]
    async fn test_template_expansion() {
        let handler = RulesHandler::new(&[rule("^重复", "你说的是：{{input}}")]);
        let reply = handler.respond("重复这句话", &mut context()).await.unwrap();
        assert_eq!(reply.as_deref(), Some("你说的是：重复这句话"));
    }

    #[test]
    fn test_case_sensitive_rule() {
        let handler = RulesHandler::new(&[ReplyRule {
            case_insensitive: false,
            ..rule("Help", "Need help?")
        }]);
        let ctx = context();
        assert!(handler.accepts("Help me", &ctx).unwrap());
        assert!(!handler.accepts("help me", &ctx).unwrap());
    }

    #[test]
    fn test_invalid_pattern_skipped() {
        let handler = RulesHandler::new(&[rule("([unclosed", "never"), rule("ok", "fine")]);
        assert!(!handler.is_empty());
        assert_eq!(handler.rules.len(), 1);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let handler = RulesHandler::new(&[rule("天气", "first"), rule("天气", "second")]);
        assert_eq!(handler.matching("今天天气").map(|r| r.reply.as_str()), Some("first"));
    }
}
