//! Request and response bodies exchanged with the gateway.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Behavioral profile selected for the agent.
///
/// The tag is passed to the agent capability unchanged. Adding a profile is
/// a change to this enum plus agent-side behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Produces plans; never edits code.
    Architect,
    #[default]
    Coder,
    Debugger,
    Ask,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Architect, Mode::Coder, Mode::Debugger, Mode::Ask];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Architect => "architect",
            Mode::Coder => "coder",
            Mode::Debugger => "debugger",
            Mode::Ask => "ask",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProtocolError::UnknownMode(s.to_string()))
    }
}

/// Body of `POST /plan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    #[serde(alias = "history")]
    pub messages: Vec<ChatMessage>,
}

/// Ordered steps proposed by the planner, plus an optional summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(alias = "plan")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// User-supplied rules appended to the agent's instructions.
///
/// Forwarded as received: unknown keys are kept, and a field that was sent
/// as `null` is sent on as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomRules {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub global: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub project: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomRules {
    pub fn global(&self) -> Option<&str> {
        self.global.as_ref()?.as_deref()
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_ref()?.as_deref()
    }
}

/// Project the user is working in. Unknown keys are kept and forwarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub path: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectContext {
    pub fn path(&self) -> Option<&str> {
        self.path.as_ref()?.as_deref()
    }
}

/// Outer `Some` when the key was present, so an explicit `null` survives.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Body of `POST /execute` and `POST /chat/stream`.
///
/// Built once per call from the request body and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(
        default,
        alias = "custom_rules",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_rules: Option<CustomRules>,
    #[serde(
        default,
        alias = "project_context",
        alias = "context",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_context: Option<ProjectContext>,
}

impl ExecutionRequest {
    /// Execute a confirmed plan.
    pub fn from_plan(mode: Mode, steps: Vec<String>) -> Self {
        Self {
            mode,
            plan: Some(steps),
            ..Default::default()
        }
    }

    /// Stream a reply to raw chat history.
    pub fn from_messages(mode: Mode, messages: Vec<ChatMessage>) -> Self {
        Self {
            mode,
            messages: Some(messages),
            ..Default::default()
        }
    }

    pub fn with_custom_rules(mut self, rules: CustomRules) -> Self {
        self.custom_rules = Some(rules);
        self
    }

    pub fn with_project_context(mut self, context: ProjectContext) -> Self {
        self.project_context = Some(context);
        self
    }

    /// True when neither a plan nor chat messages carry any content.
    pub fn is_missing_primary_input(&self) -> bool {
        let has_plan = self.plan.as_ref().is_some_and(|steps| !steps.is_empty());
        let has_messages = self.messages.as_ref().is_some_and(|msgs| !msgs.is_empty());
        !has_plan && !has_messages
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(
        default,
        alias = "project_context",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_context: Option<ProjectContext>,
}

/// Response of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub meta: ChatMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMeta {
    pub mode: Mode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_defaults_to_coder() {
        let req: ExecutionRequest = serde_json::from_value(json!({"plan": ["a"]})).unwrap();
        assert_eq!(req.mode, Mode::Coder);
    }

    #[test]
    fn mode_round_trips_lowercase() {
        for mode in Mode::ALL {
            let encoded = serde_json::to_value(mode).unwrap();
            assert_eq!(encoded, json!(mode.as_str()));
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!("orchestrator".parse::<Mode>().is_err());
        let parsed: Result<ExecutionRequest, _> =
            serde_json::from_value(json!({"mode": "orchestrator", "plan": ["a"]}));
        assert!(parsed.is_err());
    }

    #[test]
    fn execution_request_accepts_snake_case_and_context_alias() {
        let req: ExecutionRequest = serde_json::from_value(json!({
            "mode": "debugger",
            "messages": [{"role": "user", "content": "why"}],
            "custom_rules": {"global": "be terse"},
            "context": {"path": "/srv/app", "branch": "main"}
        }))
        .unwrap();

        assert_eq!(req.mode, Mode::Debugger);
        assert_eq!(req.custom_rules.unwrap().global(), Some("be terse"));
        let ctx = req.project_context.unwrap();
        assert_eq!(ctx.path(), Some("/srv/app"));
        assert_eq!(ctx.extra["branch"], "main");
    }

    #[test]
    fn execution_request_serializes_camel_case() {
        let req = ExecutionRequest::from_plan(Mode::Coder, vec!["step".into()]).with_custom_rules(
            CustomRules {
                project: Some(Some("no unsafe".into())),
                ..Default::default()
            },
        );
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"mode": "coder", "plan": ["step"], "customRules": {"project": "no unsafe"}})
        );
    }

    #[test]
    fn custom_rules_keep_unknown_keys_and_nulls() {
        let sent = json!({
            "mode": "coder",
            "plan": ["step"],
            "customRules": {"global": null, "project": "no unsafe", "style": {"indent": 4}},
            "projectContext": {"path": null, "branch": "main"}
        });
        let req: ExecutionRequest = serde_json::from_value(sent.clone()).unwrap();

        let rules = req.custom_rules.as_ref().unwrap();
        assert_eq!(rules.global(), None);
        assert_eq!(rules.project(), Some("no unsafe"));
        assert_eq!(rules.extra["style"], json!({"indent": 4}));
        assert_eq!(serde_json::to_value(&req).unwrap(), sent);
    }

    #[test]
    fn missing_primary_input() {
        assert!(ExecutionRequest::default().is_missing_primary_input());
        assert!(ExecutionRequest::from_plan(Mode::Coder, vec![]).is_missing_primary_input());
        assert!(!ExecutionRequest::from_plan(Mode::Coder, vec!["x".into()]).is_missing_primary_input());
        assert!(
            !ExecutionRequest::from_messages(Mode::Ask, vec![ChatMessage::user("hi")])
                .is_missing_primary_input()
        );
    }

    #[test]
    fn plan_reads_legacy_plan_key() {
        let plan: Plan = serde_json::from_value(json!({"plan": ["one", "two"]})).unwrap();
        assert_eq!(plan.steps, vec!["one", "two"]);
        assert!(plan.summary.is_none());
    }

    #[test]
    fn chat_message_roles() {
        let msg: ChatMessage =
            serde_json::from_value(json!({"role": "system", "content": "rules"})).unwrap();
        assert_eq!(msg, ChatMessage::system("rules"));
        assert!(serde_json::from_value::<ChatMessage>(json!({"role": "tool", "content": ""})).is_err());
    }
}
