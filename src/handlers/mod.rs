//! Response handlers
//!
//! A handler inspects transcribed text and may produce a spoken response.
//! Handlers are ordered into a [`HandlerChain`] and tried in turn until one
//! answers.
//!
//! # Example
//!
//! ```rust,ignore
//! use doudou::handlers::{Dispatch, build_chain};
//!
//! let chain = build_chain(&config)?;
//! match chain.dispatch("现在几点", &mut context).await {
//!     Dispatch::Handled { handler, response } => println!("{handler}: {response}"),
//!     Dispatch::Unhandled => println!("nobody answered"),
//! }
//! ```

mod chain;
mod greeting;
mod llm;
mod rules;
mod time;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::context::ContextStore;
use crate::llm::OllamaClient;
use crate::{Error, Result};

pub use chain::{HandlerChain, Registration};
pub use greeting::GreetingHandler;
pub use llm::LlmHandler;
pub use rules::{ReplyRule, RulesHandler};
pub use time::TimeHandler;

/// Something that can answer user input
#[async_trait]
pub trait Handler: Send + Sync {
    /// Unique name, as used in the enabled list
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Priority the handler asks for; configuration may override it
    fn priority(&self) -> i32 {
        0
    }

    /// Whether the handler wants to try this input
    ///
    /// # Errors
    ///
    /// An error is treated as "does not accept"
    fn accepts(&self, input: &str, context: &ContextStore) -> Result<bool>;

    /// Produce a response, or `None` to pass to the next handler
    ///
    /// The chain's caller records the turn; handlers only read `context`
    /// unless they need to change it.
    ///
    /// # Errors
    ///
    /// An error is treated as "no response"
    async fn respond(&self, input: &str, context: &mut ContextStore) -> Result<Option<String>>;
}

/// Outcome of dispatching one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler answered
    Handled {
        /// Name of the handler that answered
        handler: String,
        /// Its response, never blank
        response: String,
    },
    /// No handler produced a response
    Unhandled,
}

impl Dispatch {
    /// The response text, if any
    #[must_use]
    pub fn response(&self) -> Option<&str> {
        match self {
            Self::Handled { response, .. } => Some(response),
            Self::Unhandled => None,
        }
    }
}

/// Information about a registered handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerInfo {
    /// Handler name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Effective priority
    pub priority: i32,
}

/// Build the handler chain named by the configuration
///
/// Names are resolved in the order they are enabled, which is also the
/// tie-break order. Unknown and duplicate names are logged and skipped.
///
/// # Errors
///
/// Returns [`Error::Config`] if no enabled name resolves to a handler, or if
/// a handler cannot be constructed
pub fn build_chain(config: &Config) -> Result<HandlerChain> {
    let mut registrations: Vec<Registration> = Vec::new();

    for name in &config.handlers.enabled {
        let name = name.trim();
        if registrations.iter().any(|r| r.handler.name() == name) {
            tracing::warn!(handler = %name, "handler enabled twice, ignoring repeat");
            continue;
        }

        let handler: Box<dyn Handler> = match name {
            "time" => Box::new(TimeHandler::new()),
            "greeting" => Box::new(GreetingHandler::new()),
            "rules" => Box::new(RulesHandler::new(&config.handlers.rules)),
            "llm" => Box::new(LlmHandler::new(OllamaClient::from_config(&config.llm)?)),
            other => {
                tracing::warn!(handler = %other, "unknown handler, skipping");
                continue;
            }
        };

        let priority = config.handlers.priority_of(name, handler.priority());
        registrations.push(Registration::new(handler, priority));
    }

    if registrations.is_empty() {
        return Err(Error::Config(format!(
            "no known handler in enabled list {:?}",
            config.handlers.enabled
        )));
    }

    Ok(HandlerChain::new(registrations))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(enabled: &[&str]) -> Config {
        let mut config = Config::default();
        config.handlers.enabled = enabled.iter().map(ToString::to_string).collect();
        config
    }

    #[test]
    fn test_build_default_chain() {
        let chain = build_chain(&Config::default()).unwrap();
        let names: Vec<String> = chain.handlers().into_iter().map(|h| h.name).collect();
        assert_eq!(names, ["rules", "time", "greeting", "llm"]);
    }

    #[test]
    fn test_unknown_names_skipped() {
        let chain = build_chain(&config_with(&["weather", "time", "time"])).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_only_unknown_names_is_error() {
        let result = build_chain(&config_with(&["weather", "music"]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_configured_priority_reorders() {
        let mut config = config_with(&["time", "greeting"]);
        config.handlers.priorities.insert("greeting".to_string(), 5);

        let chain = build_chain(&config).unwrap();
        let infos = chain.handlers();
        assert_eq!(infos[0].name, "greeting");
        assert_eq!(infos[0].priority, 5);
        assert_eq!(infos[1].name, "time");
        assert_eq!(infos[1].priority, 0);
    }
}
