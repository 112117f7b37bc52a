//! Augmented prompt construction
//!
//! Every iteration sends the model a deterministic sequence of XML-ish
//! blocks: identity, system prompt, the streaming-protocol preamble, schema
//! and example, live metadata, context feeds, environment variables,
//! sub-agents, the action reference, extra guidance and the conversation
//! history. Empty blocks are omitted. A short protocol reminder is appended
//! at the very end of each iteration's prompt.

use chrono::{SecondsFormat, Utc};

use crate::config::AgentConfig;

use super::history::HistoryRecord;

/// Instructional preamble teaching the model the streaming protocol.
const PROTOCOL_PREAMBLE: &str = r#"You MUST respond using only the following XML structure, with no markdown
code fences and no text outside the tags.

<thought>
Your reasoning. Multiple <thought> blocks are encouraged.
</thought>

<action type="tool" mode="async" id="unique_id">
{
  "name": "tool_name",
  "parameters": { "key": "value" },
  "output_key": "variable_name"
}
</action>

<response final="true">
Your answer in Markdown. Reference action results with $variable_name.
</response>

Action types: tool, agent, relic, workflow, llm, internal.
Execution modes: sync (wait), async (run in background), fire_and_forget.
Use "depends_on": ["other_id"] to order actions. The JSON inside <action>
must be complete and valid. Use <response final="false"> to show progress
and keep working; only <response final="true"> ends your turn. Prefer
several small actions over one large one."#;

/// Concise per-iteration reminder of the mandatory output format.
const PROTOCOL_REMINDER: &str = r#"<protocol_reminder>
Respond only with <thought>, <action>, and <response> tags. Start with
<thought>. End with <response final="true"> when the task is complete, or
<response final="false"> to continue working in another iteration. Never
wrap the output in markdown fences.
</protocol_reminder>"#;

/// Builder for the augmented prompt of one iteration.
pub struct PromptBuilder<'a> {
    config: &'a AgentConfig,
    feeds_block: Option<String>,
    history: &'a [HistoryRecord],
}

impl<'a> PromptBuilder<'a> {
    /// Start a builder for the given configuration.
    pub fn new(config: &'a AgentConfig) -> Self {
        Self {
            config,
            feeds_block: None,
            history: &[],
        }
    }

    /// Attach the rendered `<context_feeds>` block, if any.
    pub fn feeds_block(mut self, block: Option<String>) -> Self {
        self.feeds_block = block;
        self
    }

    /// Attach the conversation history.
    pub fn history(mut self, records: &'a [HistoryRecord]) -> Self {
        self.history = records;
        self
    }

    /// Render the full augmented prompt.
    pub fn build(self) -> String {
        let cfg = self.config;
        let mut out = String::new();

        out.push_str("<agent_identity>\n");
        out.push_str(&format!("\t<name>{}</name>\n", cfg.name));
        if !cfg.description.is_empty() {
            out.push_str(&format!(
                "\t<description>{}</description>\n",
                cfg.description
            ));
        }
        out.push_str("</agent_identity>\n\n");

        if !cfg.system_prompt.is_empty() {
            out.push_str(&format!(
                "<system_prompt>\n{}\n</system_prompt>\n\n",
                cfg.system_prompt
            ));
        }

        out.push_str(&format!(
            "<cortex_streaming_protocol>\n{}\n</cortex_streaming_protocol>\n\n",
            PROTOCOL_PREAMBLE
        ));

        if !cfg.response_schema.is_empty() {
            out.push_str(&format!(
                "<response_schema_definition>\n{}\n</response_schema_definition>\n\n",
                cfg.response_schema
            ));
        }
        if !cfg.response_example.is_empty() {
            out.push_str(&format!(
                "<response_example>\n{}\n</response_example>\n\n",
                cfg.response_example
            ));
        }

        out.push_str("<live_metadata>\n");
        out.push_str(&format!(
            "\t<current_datetime>{}</current_datetime>\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        out.push_str("</live_metadata>\n\n");

        if let Some(feeds) = &self.feeds_block {
            out.push_str(feeds);
            out.push('\n');
        }

        if !cfg.environment.is_empty() {
            out.push_str("<environment_variables>\n");
            for (key, value) in &cfg.environment {
                out.push_str(&format!(
                    "\t<variable name=\"{}\">{}</variable>\n",
                    key, value
                ));
            }
            out.push_str("</environment_variables>\n\n");
        }

        if !cfg.sub_agents.is_empty() {
            out.push_str("<sub_agents_online>\n");
            for sub in &cfg.sub_agents {
                out.push_str(&format!("\t<sub_agent name=\"{}\">", sub.name));
                out.push_str(&sub.description);
                out.push_str("</sub_agent>\n");
            }
            out.push_str("</sub_agents_online>\n\n");
        }

        if !cfg.actions.is_empty() {
            out.push_str("<available_actions_reference>\n");
            for action in &cfg.actions {
                out.push_str(&format!(
                    "\t<action_definition name=\"{}\">\n\t\t<description_text>{}</description_text>\n\t</action_definition>\n",
                    action.name, action.description
                ));
            }
            out.push_str("</available_actions_reference>\n\n");
        }

        if !cfg.guidance.is_empty() {
            out.push_str("<additional_guidance>\n");
            for instruction in &cfg.guidance {
                out.push_str(&format!("\t<instruction>{}</instruction>\n", instruction));
            }
            out.push_str("</additional_guidance>\n\n");
        }

        if !self.history.is_empty() {
            out.push_str("<conversation_history>\n");
            for record in self.history {
                out.push_str("\t<past_conversation_item>\n");
                out.push_str(&format!("\t\t<role>{}</role>\n", record.role));
                out.push_str(&format!("\t\t<content>{}</content>\n", record.content));
                out.push_str("\t</past_conversation_item>\n");
            }
            out.push_str("</conversation_history>\n\n");
        }

        out.push_str(PROTOCOL_REMINDER);
        out.push('\n');
        out
    }
}
