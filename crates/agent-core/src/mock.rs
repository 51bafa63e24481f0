//! Scripted Provider
//!
//! For testing and demo purposes. Replays a fixed sequence of assistant turns
//! and records every request it receives, without any network access.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{Completion, FinishReason, GenerationOptions, LlmProvider};
use crate::tool::{ToolCall, ToolSchema};

/// One request as seen by the provider
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Provider that answers from a script
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Message>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: impl IntoIterator<Item = Message>) -> Self {
        Self::from_results(turns.into_iter().map(Ok))
    }

    /// Script that may also fail at chosen steps
    pub fn from_results(steps: impl IntoIterator<Item = Result<Message>>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Provider that requests the same tool forever
    pub fn looping(tool: &str, turns: usize) -> Self {
        Self::new((0..turns).map(|i| {
            Message::assistant_with_tools(
                None,
                vec![ToolCall::new(format!("call_{i}"), tool, Default::default())],
            )
        }))
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of requests received so far
    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.requests.lock().await.push(RecordedRequest {
            system_prompt: system_prompt.to_string(),
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });

        let message = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::ModelUnavailable("script exhausted".into())))?;

        let finish_reason = if message.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };

        Ok(Completion {
            message,
            model: options.model.clone(),
            usage: None,
            finish_reason: Some(finish_reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_provider_replays_then_fails() {
        let provider = ScriptedProvider::new(vec![Message::assistant("first")]);
        let options = GenerationOptions::default();

        let completion = provider
            .complete("prompt", &[Message::user("hi")], &[], &options)
            .await
            .unwrap();
        assert_eq!(completion.message.text(), "first");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));

        let err = provider
            .complete("prompt", &[], &[], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelUnavailable(_)));
        assert_eq!(provider.request_count().await, 2);
    }
}
