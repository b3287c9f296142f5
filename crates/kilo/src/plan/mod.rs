//! Plan Service - turn conversation history into ordered steps.

use std::sync::Arc;

use kilo_protocol::{ChatMessage, Mode, Plan};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use crate::agent::{AgentError, AgentInvoker};

/// Summary returned when the planner's reply held no usable step list and
/// no summary of its own.
pub const MALFORMED_PLAN_SUMMARY: &str =
    "The planner's reply could not be read as a list of steps. Ask again to retry.";

#[derive(Clone)]
pub struct PlanService {
    invoker: Arc<AgentInvoker>,
}

impl PlanService {
    pub fn new(invoker: Arc<AgentInvoker>) -> Self {
        Self { invoker }
    }

    /// Ask the architect for a plan.
    ///
    /// Undecodable agent output degrades to an empty plan; failures to reach
    /// or run the agent propagate. Nothing is retried here.
    #[instrument(skip_all, fields(messages = history.len()))]
    pub async fn plan(&self, history: Vec<ChatMessage>) -> Result<Plan, AgentError> {
        let raw = self
            .invoker
            .invoke(Mode::Architect, json!({ "messages": history }))
            .await?;

        match decode(&raw) {
            Decoded::Plan(plan) => {
                debug!(steps = plan.steps.len(), "planner returned a plan");
                Ok(plan)
            }
            Decoded::Malformed { summary } => {
                warn!("planner output held no step list; returning an empty plan");
                Ok(degraded(summary))
            }
        }
    }
}

/// Decode raw planner output, degrading to an empty plan.
pub fn normalize_plan(raw: &Value) -> Plan {
    match decode(raw) {
        Decoded::Plan(plan) => plan,
        Decoded::Malformed { summary } => degraded(summary),
    }
}

enum Decoded {
    Plan(Plan),
    Malformed { summary: Option<String> },
}

fn decode(raw: &Value) -> Decoded {
    let Some(object) = plan_object(raw) else {
        return Decoded::Malformed { summary: None };
    };
    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .map(str::to_string);

    match steps_of(&object) {
        Some(steps) => Decoded::Plan(Plan { steps, summary }),
        None => Decoded::Malformed { summary },
    }
}

fn degraded(summary: Option<String>) -> Plan {
    Plan {
        steps: Vec::new(),
        summary: Some(summary.unwrap_or_else(|| MALFORMED_PLAN_SUMMARY.to_string())),
    }
}

/// Locate the object carrying the plan: the result itself, or the JSON text
/// in its `content` field.
fn plan_object(raw: &Value) -> Option<Map<String, Value>> {
    match raw {
        Value::String(text) => parse_embedded(text),
        Value::Object(object) if object.contains_key("steps") || object.contains_key("plan") => {
            Some(object.clone())
        }
        Value::Object(object) => match object.get("content")? {
            Value::String(text) => parse_embedded(text),
            Value::Object(inner) => Some(inner.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn parse_embedded(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(strip_code_fence(text)) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Drop a surrounding Markdown code fence, language tag included.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn steps_of(object: &Map<String, Value>) -> Option<Vec<String>> {
    let items = object
        .get("steps")
        .or_else(|| object.get("plan"))?
        .as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(text) => Some(text.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
    )
}
