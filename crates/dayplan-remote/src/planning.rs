use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use dayplan_core::message::Message;

use crate::error::PlanningError;
use crate::types::{BreakdownFields, SubtaskDescriptor, TaskDescriptor};

/// Client for the planning service that turns free-text prompts into
/// task lists. The service does the language-model work; this side only
/// speaks JSON over HTTP.
#[derive(Debug, Clone)]
pub struct PlanningClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PlanRequest<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct SubtasksRequest<'a> {
    task_id: Uuid,
    name: &'a str,
    description: &'a str,
    duration_minutes: u32,
}

#[derive(Serialize)]
struct BreakdownRequest<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
}

impl PlanningClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PlanningError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Decompose a free-text description of the day into tasks.
    #[instrument(skip(self, prompt))]
    pub async fn plan_day(&self, prompt: &str) -> Result<Vec<TaskDescriptor>, PlanningError> {
        let body = self
            .post_json("/api/plan", &PlanRequest { prompt })
            .await?;
        parse_plan_response(body)
    }

    #[instrument(skip(self, name, description))]
    pub async fn generate_subtasks(
        &self,
        task_id: Uuid,
        name: &str,
        description: &str,
        duration_minutes: u32,
    ) -> Result<Vec<SubtaskDescriptor>, PlanningError> {
        let body = self
            .post_json(
                "/api/generate-subtasks",
                &SubtasksRequest {
                    task_id,
                    name,
                    description,
                    duration_minutes,
                },
            )
            .await?;
        parse_subtasks_response(body)
    }

    /// Single-task breakdown kept for servers predating the
    /// generate-subtasks endpoint; it also refines duration and priority.
    #[instrument(skip(self, name, description))]
    pub async fn breakdown(
        &self,
        name: &str,
        description: &str,
    ) -> Result<BreakdownFields, PlanningError> {
        let body = self
            .post_json("/api/breakdown", &BreakdownRequest { name, description })
            .await?;
        serde_json::from_value(body).map_err(|_| PlanningError::Format("breakdown fields"))
    }

    /// One conversational turn; the whole transcript goes up each time.
    #[instrument(skip(self, messages))]
    pub async fn chat(&self, messages: &[Message]) -> Result<String, PlanningError> {
        let body = self.post_json("/chat", &ChatRequest { messages }).await?;
        parse_chat_response(body)
    }

    async fn post_json<T: Serialize>(&self, path: &str, payload: &T) -> Result<Value, PlanningError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "posting to planning service");

        let response = self.client.post(&url).json(payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PlanningError::Server {
                status: status.as_u16(),
                detail: extract_detail(&detail),
            });
        }

        Ok(response.json().await?)
    }
}

/// Servers wrap error messages as `{"detail": "..."}`; fall back to the
/// raw body when they do not.
fn extract_detail(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body)
        && let Some(Value::String(detail)) = map.get("detail")
    {
        return detail.clone();
    }
    body.trim().to_string()
}

fn parse_plan_response(body: Value) -> Result<Vec<TaskDescriptor>, PlanningError> {
    let tasks = body
        .get("tasks")
        .cloned()
        .ok_or(PlanningError::Format("tasks field"))?;
    serde_json::from_value(tasks).map_err(|_| PlanningError::Format("task list"))
}

fn parse_subtasks_response(body: Value) -> Result<Vec<SubtaskDescriptor>, PlanningError> {
    let subtasks = body
        .get("subtasks")
        .cloned()
        .ok_or(PlanningError::Format("subtasks field"))?;
    serde_json::from_value(subtasks).map_err(|_| PlanningError::Format("subtask list"))
}

fn parse_chat_response(body: Value) -> Result<String, PlanningError> {
    match body.get("response") {
        Some(Value::String(reply)) => Ok(reply.clone()),
        _ => Err(PlanningError::Format("response field")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn plan_response_requires_tasks_field() {
        let ok = json!({
            "tasks": [
                { "name": "write report", "description": "quarterly numbers",
                  "duration_minutes": 45, "priority": 1 },
                { "name": "email sweep", "description": "inbox zero",
                  "duration_minutes": 20, "priority": 3, "can_be_interleaved": true },
            ]
        });
        let tasks = parse_plan_response(ok).expect("parse");
        assert_eq!(tasks.len(), 2);
        assert!(!tasks[0].can_be_interleaved);
        assert!(tasks[1].can_be_interleaved);

        let missing = json!({ "items": [] });
        assert!(matches!(
            parse_plan_response(missing),
            Err(PlanningError::Format("tasks field"))
        ));
    }

    #[test]
    fn malformed_task_entries_are_a_format_error() {
        let bad = json!({ "tasks": [ { "name": "no duration" } ] });
        assert!(matches!(
            parse_plan_response(bad),
            Err(PlanningError::Format("task list"))
        ));
    }

    #[test]
    fn chat_response_must_be_a_string() {
        let ok = json!({ "response": "Start with the report." });
        assert_eq!(
            parse_chat_response(ok).expect("parse"),
            "Start with the report."
        );

        let bad = json!({ "response": 42 });
        assert!(matches!(
            parse_chat_response(bad),
            Err(PlanningError::Format("response field"))
        ));
    }

    #[test]
    fn detail_field_is_unwrapped_when_present() {
        assert_eq!(
            extract_detail(r#"{"detail": "model overloaded"}"#),
            "model overloaded"
        );
        assert_eq!(extract_detail("plain text error\n"), "plain text error");
    }
}
