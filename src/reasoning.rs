//! Planner and Synthesizer: reasoning-model calls.
//!
//! Mirrors the teacher's `generate_actions_with_llm` shape in
//! `agent/core/llm_integration.rs` — build a prompt, call the model under a
//! timeout, parse the response as JSON, surface parse failure as a typed
//! error — but targets an OpenAI-compatible chat-completions HTTP endpoint
//! instead of the in-process `CandleFluentAi` streaming builder, since the
//! reasoning model here is an external, independently-hosted collaborator
//! per spec.md §4.4/§6.

use crate::errors::OrchestratorError;
use crate::types::{Plan, PlanResponse};
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait::async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Calls the reasoning model with the current findings and returns a
    /// structured continuation plan, per spec.md §4.4.
    async fn plan(
        &self,
        topic: &str,
        remaining_minutes: f64,
        findings_prompt: &str,
    ) -> Result<Plan, OrchestratorError>;

    /// A single large-context call producing the final free-text analysis,
    /// per spec.md §4.4.
    async fn synthesize(&self, combined_prompt: &str) -> Result<String, OrchestratorError>;
}

const PLANNER_SYSTEM_PROMPT: &str = "You are a research planner. Given a topic, the \
time remaining, and findings gathered so far, identify gaps in the research, decide \
whether more research is needed, and suggest the next search topic. Respond with JSON \
matching the required schema. If less than one minute remains, set shouldContinue to false.";

const SYNTHESIZER_SYSTEM_PROMPT: &str = "You are a research analyst. Write a \
comprehensive, well-organized final analysis from the findings and summaries provided. \
Cite sources inline where relevant. Focus on factual content drawn from the findings.";

fn planner_user_prompt(topic: &str, remaining_minutes: f64, findings_prompt: &str) -> String {
    format!(
        "Topic: {topic}\nTime remaining: {remaining_minutes:.1} minutes\n\nFindings so far:\n{findings_prompt}"
    )
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Reasoning Client backed by an OpenAI-compatible `/chat/completions`
/// endpoint.
pub struct HttpReasoningClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    bypass_json_validation: bool,
    synthesis_max_tokens: u64,
    call_timeout: Duration,
}

impl HttpReasoningClient {
    pub fn new(http: reqwest::Client, api_base: String, api_key: String, model: String) -> Self {
        Self {
            http,
            api_base,
            api_key,
            model,
            bypass_json_validation: false,
            synthesis_max_tokens: 16_384,
            call_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_bypass_json_validation(mut self, bypass: bool) -> Self {
        self.bypass_json_validation = bypass;
        self
    }

    pub fn with_synthesis_max_tokens(mut self, max_tokens: u64) -> Self {
        self.synthesis_max_tokens = max_tokens;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    async fn chat(&self, request: ChatCompletionRequest<'_>) -> Result<String, OrchestratorError> {
        let response = tokio::time::timeout(
            self.call_timeout,
            self.http
                .post(format!("{}/chat/completions", self.api_base))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| OrchestratorError::Planner("reasoning model call timed out".to_string()))?
        .map_err(|e| OrchestratorError::Planner(format!("reasoning model request failed: {e}")))?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::Planner(format!("reasoning model response parse failed: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OrchestratorError::Planner("reasoning model returned no choices".to_string()))
    }
}

#[async_trait::async_trait]
impl ReasoningClient for HttpReasoningClient {
    async fn plan(
        &self,
        topic: &str,
        remaining_minutes: f64,
        findings_prompt: &str,
    ) -> Result<Plan, OrchestratorError> {
        let user_prompt = planner_user_prompt(topic, remaining_minutes, findings_prompt);

        let response_format = if self.bypass_json_validation {
            debug!("BYPASS_JSON_VALIDATION set, requesting free text for planner");
            None
        } else {
            let schema = schema_for!(PlanResponse);
            Some(json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "plan_response",
                    "schema": schema,
                    "strict": true,
                }
            }))
        };

        let content = self
            .chat(ChatCompletionRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage { role: "system", content: PLANNER_SYSTEM_PROMPT.to_string() },
                    ChatMessage { role: "user", content: user_prompt },
                ],
                max_tokens: None,
                response_format,
            })
            .await?;

        let parsed: PlanResponse = serde_json::from_str(&content).map_err(|e| {
            warn!("planner returned unparseable JSON: {e}");
            OrchestratorError::Planner(format!("failed to parse planner response: {e}"))
        })?;

        Ok(parsed.analysis)
    }

    async fn synthesize(&self, combined_prompt: &str) -> Result<String, OrchestratorError> {
        let content = self
            .chat(ChatCompletionRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage { role: "system", content: SYNTHESIZER_SYSTEM_PROMPT.to_string() },
                    ChatMessage { role: "user", content: combined_prompt.to_string() },
                ],
                max_tokens: Some(self.synthesis_max_tokens),
                response_format: None,
            })
            .await
            .map_err(|e| OrchestratorError::Synthesis(e.to_string()))?;

        if content.is_empty() {
            return Err(OrchestratorError::Synthesis("empty synthesis generated".to_string()));
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePlanner {
        plans: std::sync::Mutex<std::collections::VecDeque<Result<Plan, String>>>,
    }

    #[async_trait::async_trait]
    impl ReasoningClient for FakePlanner {
        async fn plan(&self, _topic: &str, _remaining: f64, _findings: &str) -> Result<Plan, OrchestratorError> {
            match self.plans.lock().unwrap().pop_front() {
                Some(Ok(plan)) => Ok(plan),
                Some(Err(msg)) => Err(OrchestratorError::Planner(msg)),
                None => Err(OrchestratorError::Planner("fixture exhausted".to_string())),
            }
        }

        async fn synthesize(&self, _combined: &str) -> Result<String, OrchestratorError> {
            Ok("synthesis".to_string())
        }
    }

    #[tokio::test]
    async fn planner_failure_is_typed_not_panicking() {
        let planner = FakePlanner {
            plans: std::sync::Mutex::new(vec![Err("model overloaded".to_string())].into()),
        };
        let err = planner.plan("topic", 5.0, "").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Planner(_)));
    }

    #[tokio::test]
    async fn planner_success_round_trips() {
        let plan = Plan {
            summary: "s".to_string(),
            gaps: vec!["g1".to_string()],
            next_steps: vec![],
            should_continue: true,
            next_search_topic: Some("next".to_string()),
            url_to_search: None,
        };
        let planner = FakePlanner {
            plans: std::sync::Mutex::new(vec![Ok(plan.clone())].into()),
        };
        let got = planner.plan("topic", 5.0, "").await.unwrap();
        assert_eq!(got.gaps, plan.gaps);
        assert!(got.should_continue);
    }
}
