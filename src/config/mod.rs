//! Agent configuration
//!
//! The core consumes a fully-resolved [`AgentConfig`]: manifest loading,
//! environment expansion and tool discovery happen upstream. Everything here
//! is plain data with serde defaults and a `validate()` pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CortexError, Result};
use crate::protocol::ContextFeed;

fn default_iteration_cap() -> usize {
    10
}

fn default_history_char_limit() -> usize {
    100_000
}

/// Fully-resolved configuration for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent name, rendered in the `<agent_identity>` block.
    pub name: String,
    /// Agent description.
    pub description: String,
    /// The system prompt body.
    pub system_prompt: String,
    /// Optional response schema shown to the model.
    pub response_schema: String,
    /// Optional worked response example shown to the model.
    pub response_example: String,
    /// Maximum model iterations per user prompt.
    pub iteration_cap: usize,
    /// Per-record character cap for conversation history entries.
    pub history_char_limit: usize,
    /// Environment variables injected into the prompt, in key order.
    pub environment: BTreeMap<String, String>,
    /// Online sub-agents, rendered in `<sub_agents_online>`.
    pub sub_agents: Vec<SubAgentInfo>,
    /// Available actions, rendered in `<available_actions_reference>`.
    pub actions: Vec<ActionSpec>,
    /// Extra instruction fragments, rendered in `<additional_guidance>`.
    pub guidance: Vec<String>,
    /// Pre-configured context feeds, seeded into the feed manager.
    pub context_feeds: Vec<ContextFeed>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            system_prompt: String::new(),
            response_schema: String::new(),
            response_example: String::new(),
            iteration_cap: default_iteration_cap(),
            history_char_limit: default_history_char_limit(),
            environment: BTreeMap::new(),
            sub_agents: Vec::new(),
            actions: Vec::new(),
            guidance: Vec::new(),
            context_feeds: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Create a config with the given name and defaults for everything else.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `CortexError::Config` when the name is empty, the iteration
    /// cap is zero, or a context feed is missing its id.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CortexError::Config("agent name must not be empty".into()));
        }
        if self.iteration_cap == 0 {
            return Err(CortexError::Config(
                "iteration_cap must be at least 1".into(),
            ));
        }
        for feed in &self.context_feeds {
            if feed.id.trim().is_empty() {
                return Err(CortexError::Config(
                    "context feed is missing an id".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Identity of an online sub-agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubAgentInfo {
    /// Sub-agent name, the dispatch target for `type = agent` actions.
    pub name: String,
    /// What the sub-agent does.
    pub description: String,
}

/// A dispatchable action shown in the prompt's action reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSpec {
    /// Action name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
}
