//! Reasoning Loop
//!
//! Drives the conversation with the model: ask, run whatever tools the model
//! requested, append their results, and ask again until an assistant turn
//! arrives without tool calls.
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            ▼                              │
//!   ┌────────────────┐  tool calls   ┌──────┴───────┐
//!   │ AwaitingModel  │──────────────▶│ dispatch all │
//!   └───────┬────────┘               └──────────────┘
//!           │ no tool calls
//!           ▼
//!       ┌──────┐
//!       │ Done │
//!       └──────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::ToolDispatcher;
use crate::error::{AgentError, Result};
use crate::message::{request_ids, Conversation, Message, Role};
use crate::provider::{Completion, GenerationOptions, LlmProvider};
use crate::tool::{Tool, ToolRegistry, ToolSchema};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt, sent ahead of the history on every model call
    pub system_prompt: String,

    /// Maximum model calls in one run before giving up
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Deadline for a single model round trip
    pub model_timeout: Option<Duration>,

    /// Deadline for a single tool invocation
    pub tool_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            generation: GenerationOptions::default(),
            model_timeout: Some(Duration::from_secs(120)),
            tool_timeout: Some(Duration::from_secs(30)),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Use the available tools when they help you answer accurately, then synthesize \
their results into a concise response.";

/// Result of a finished orchestration run
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The terminal assistant turn
    pub final_message: Message,

    /// Full log, including the turns added during the run
    pub conversation: Conversation,

    /// Number of model calls made
    pub iterations: usize,
}

impl RunOutcome {
    /// Text of the final answer
    pub fn text(&self) -> &str {
        self.final_message.text()
    }
}

/// Loop state
enum Phase {
    AwaitingModel,
    Done(Message),
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    dispatcher: ToolDispatcher,
    schemas: Vec<ToolSchema>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let schemas = tools.schemas();
        let dispatcher = ToolDispatcher::new(tools).with_timeout(config.tool_timeout);
        Self {
            provider,
            dispatcher,
            schemas,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    /// Run the loop until the model answers without requesting tools.
    ///
    /// The conversation is owned by the run and handed back in the outcome.
    /// Tool failures never fail the run; they are appended as error results
    /// for the model to react to.
    pub async fn run(&self, mut conversation: Conversation) -> Result<RunOutcome> {
        conversation.validate()?;
        if !conversation.pending_tool_calls().is_empty() {
            return Err(AgentError::ProtocolViolation(
                "conversation ends with unanswered tool calls".into(),
            ));
        }

        let mut iterations = 0;
        let mut phase = Phase::AwaitingModel;

        let final_message = loop {
            match phase {
                Phase::Done(message) => break message,
                Phase::AwaitingModel => {
                    if iterations >= self.config.max_iterations {
                        tracing::warn!(
                            max = self.config.max_iterations,
                            "Model kept requesting tools; giving up"
                        );
                        return Err(AgentError::DepthExceeded(self.config.max_iterations));
                    }
                    iterations += 1;
                    phase = self.step(&mut conversation, iterations).await?;
                }
            }
        };

        tracing::info!(
            iterations,
            turns = conversation.len(),
            "Run finished"
        );

        Ok(RunOutcome {
            final_message,
            conversation,
            iterations,
        })
    }

    /// Run and always produce a displayable reply.
    ///
    /// Failures become a single explanatory assistant message instead of an
    /// error.
    pub async fn respond(&self, conversation: Conversation) -> (Message, Option<Conversation>) {
        match self.run(conversation).await {
            Ok(outcome) => (outcome.final_message, Some(outcome.conversation)),
            Err(e) => {
                tracing::error!(error = %e, "Agent run failed");
                (Message::assistant(e.user_message()), None)
            }
        }
    }

    /// Run with a simple string input (creates temporary conversation)
    pub async fn ask(&self, question: &str) -> Result<String> {
        let mut conversation = Conversation::new();
        conversation.push(Message::user(question));
        let outcome = self.run(conversation).await?;
        Ok(outcome.text().to_string())
    }

    /// One AwaitingModel transition: ask the model, append its turn, and run
    /// the requested batch if there is one.
    async fn step(&self, conversation: &mut Conversation, iteration: usize) -> Result<Phase> {
        let completion = self.request_completion(conversation).await?;
        let message = completion.message;
        check_assistant_turn(&message, conversation.len())?;

        conversation.push(message.clone());

        if !message.requests_tools() {
            return Ok(Phase::Done(message));
        }

        tracing::debug!(
            iteration,
            tools = ?message.tool_calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "Dispatching tool batch"
        );

        let results = self.dispatcher.dispatch_batch(&message.tool_calls).await;
        for result in results {
            conversation.push(result.into_message());
        }

        Ok(Phase::AwaitingModel)
    }

    /// Call the provider under the configured deadline
    async fn request_completion(&self, conversation: &Conversation) -> Result<Completion> {
        let request = self.provider.complete(
            &self.config.system_prompt,
            conversation.messages(),
            &self.schemas,
            &self.config.generation,
        );

        let result = match self.config.model_timeout {
            Some(limit) => tokio::time::timeout(limit, request).await.map_err(|_| {
                AgentError::ModelUnavailable(format!(
                    "{} did not respond within {limit:?}",
                    self.provider.name()
                ))
            })?,
            None => request.await,
        };

        result.map_err(|e| match e {
            AgentError::ModelUnavailable(_) | AgentError::ProtocolViolation(_) => e,
            other => AgentError::ModelUnavailable(other.to_string()),
        })
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// The backend must answer with one well-formed assistant turn
fn check_assistant_turn(message: &Message, position: usize) -> Result<()> {
    if message.role != Role::Assistant {
        return Err(AgentError::ProtocolViolation(format!(
            "backend returned a {} turn instead of an assistant turn",
            message.role
        )));
    }
    if message.tool_call_id.is_some() {
        return Err(AgentError::ProtocolViolation(
            "assistant turn carries a tool_call_id".into(),
        ));
    }
    request_ids(position, message).map(|_| ())
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Result<Self> {
        self.tools.register(tool)?;
        Ok(self)
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn model_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.model_timeout = timeout;
        self
    }

    pub fn tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.tool_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        if self.config.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedProvider;
    use crate::tool::{ParameterSchema, ToolCall};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct LookupTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for LookupTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "code_lookup".into(),
                description: "Find ICD-10 codes for a term".into(),
                parameters: vec![ParameterSchema::required("term", "string", "Condition")],
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match call.get_str("term") {
                Some("diabetes") => Ok("E11.9".into()),
                Some("hypertension") => Ok("I10".into()),
                _ => Err(AgentError::ToolExecution("no matching code".into())),
            }
        }
    }

    struct Fixture {
        provider: Arc<ScriptedProvider>,
        calls: Arc<AtomicUsize>,
        agent: Agent,
    }

    fn fixture(script: Vec<Message>, max_iterations: usize) -> Fixture {
        let provider = Arc::new(ScriptedProvider::new(script));
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = AgentBuilder::new()
            .provider(provider.clone())
            .tool(LookupTool {
                calls: Arc::clone(&calls),
            })
            .unwrap()
            .system_prompt("You are a medical coder.")
            .max_iterations(max_iterations)
            .build()
            .unwrap();
        Fixture {
            provider,
            calls,
            agent,
        }
    }

    fn lookup(id: &str, term: &str) -> ToolCall {
        ToolCall::from_json(id, "code_lookup", json!({ "term": term }))
    }

    fn user(text: &str) -> Conversation {
        Conversation::from_messages(vec![Message::user(text)])
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let f = fixture(vec![Message::assistant("Hello!")], 5);

        let outcome = f.agent.run(user("Hi")).await.unwrap();

        assert_eq!(outcome.text(), "Hello!");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.conversation.len(), 2);
        assert_eq!(f.provider.request_count().await, 1);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_diabetes_lookup_scenario() {
        let f = fixture(
            vec![
                Message::assistant_with_tools(None, vec![lookup("t1", "diabetes")]),
                Message::assistant("The code is E11.9"),
            ],
            5,
        );

        let outcome = f.agent.run(user("lookup code for diabetes")).await.unwrap();

        assert_eq!(outcome.text(), "The code is E11.9");
        let roles: Vec<_> = outcome.conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let tool_turn = &outcome.conversation.messages()[2];
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("t1"));
        assert_eq!(tool_turn.text(), "E11.9");
        assert!(!tool_turn.is_error);
    }

    #[tokio::test]
    async fn test_batch_results_grouped_after_request() {
        let f = fixture(
            vec![
                Message::assistant_with_tools(
                    Some("Looking up both.".into()),
                    vec![lookup("a", "diabetes"), lookup("b", "hypertension")],
                ),
                Message::assistant("E11.9 and I10"),
            ],
            5,
        );
        let prior = vec![
            Message::user("earlier question"),
            Message::assistant("earlier answer"),
            Message::user("code diabetes and hypertension"),
        ];

        let outcome = f
            .agent
            .run(Conversation::from_messages(prior))
            .await
            .unwrap();

        let log = outcome.conversation.messages();
        assert_eq!(log.len(), 7);
        assert_eq!(log[3].tool_calls.len(), 2);
        assert_eq!(log[4].tool_call_id.as_deref(), Some("a"));
        assert_eq!(log[5].tool_call_id.as_deref(), Some("b"));
        assert_eq!(log[6].text(), "E11.9 and I10");

        // The second request saw the whole batch answered.
        let requests = f.provider.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 6);
        assert!(requests[1].messages.iter().skip(4).all(|m| m.role == Role::Tool));
    }

    #[tokio::test]
    async fn test_failing_tools_do_not_fail_run() {
        let f = fixture(
            vec![
                Message::assistant_with_tools(
                    None,
                    vec![
                        lookup("a", "unobtainium"),
                        ToolCall::from_json("b", "nonexistent", json!({})),
                        lookup("c", "diabetes"),
                    ],
                ),
                Message::assistant("Only diabetes could be coded: E11.9"),
            ],
            5,
        );

        let outcome = f.agent.run(user("code these")).await.unwrap();

        let tool_turns: Vec<_> = outcome
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_turns.len(), 3);
        assert!(tool_turns[0].is_error);
        assert!(tool_turns[0].text().contains("no matching code"));
        assert!(tool_turns[1].is_error);
        assert_eq!(tool_turns[1].text(), "unknown tool: nonexistent");
        assert!(!tool_turns[2].is_error);
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_system_prompt_sent_once_per_call() {
        let f = fixture(
            vec![
                Message::assistant_with_tools(None, vec![lookup("a", "diabetes")]),
                Message::assistant_with_tools(None, vec![lookup("b", "hypertension")]),
                Message::assistant("done"),
            ],
            5,
        );

        let outcome = f.agent.run(user("code everything")).await.unwrap();
        assert_eq!(outcome.iterations, 3);

        for request in f.provider.requests().await {
            assert_eq!(request.system_prompt, "You are a medical coder.");
            assert!(request.messages.iter().all(|m| m.role != Role::System));
            assert_eq!(request.tool_names, vec!["code_lookup"]);
        }
        assert!(outcome
            .conversation
            .messages()
            .iter()
            .all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn test_depth_exceeded() {
        let provider = Arc::new(ScriptedProvider::looping("code_lookup", 10));
        let agent = AgentBuilder::new()
            .provider(provider.clone())
            .max_iterations(3)
            .build()
            .unwrap();

        let err = agent.run(user("loop forever")).await.unwrap_err();

        assert!(matches!(err, AgentError::DepthExceeded(3)));
        assert_eq!(provider.request_count().await, 3);
    }

    #[tokio::test]
    async fn test_model_failure_surfaces() {
        let provider = Arc::new(ScriptedProvider::from_results(vec![Err(
            AgentError::ModelUnavailable("HTTP 503".into()),
        )]));
        let agent = Agent::with_defaults(provider, Arc::new(ToolRegistry::new()));

        let err = agent.run(user("hi")).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_respond_turns_failure_into_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agent = Agent::with_defaults(provider, Arc::new(ToolRegistry::new()));

        let (reply, conversation) = agent.respond(user("hi")).await;
        assert_eq!(reply.role, Role::Assistant);
        assert!(reply.text().contains("unavailable"));
        assert!(conversation.is_none());
    }

    #[tokio::test]
    async fn test_system_turn_in_history_rejected() {
        let f = fixture(vec![Message::assistant("unused")], 5);
        let conversation =
            Conversation::from_messages(vec![Message::system("sneaky"), Message::user("hi")]);

        let err = f.agent.run(conversation).await.unwrap_err();
        assert!(matches!(err, AgentError::ProtocolViolation(_)));
        assert_eq!(f.provider.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_seeded_history_with_unanswered_calls_rejected() {
        let f = fixture(vec![Message::assistant("unused")], 5);
        let conversation = Conversation::from_messages(vec![
            Message::user("code diabetes"),
            Message::assistant_with_tools(None, vec![lookup("a", "diabetes")]),
        ]);

        let err = f.agent.run(conversation).await.unwrap_err();
        assert!(matches!(err, AgentError::ProtocolViolation(_)));
        assert_eq!(f.provider.request_count().await, 0);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_call_ids_from_backend_rejected() {
        let f = fixture(
            vec![Message::assistant_with_tools(
                None,
                vec![lookup("same", "diabetes"), lookup("same", "hypertension")],
            )],
            5,
        );

        let err = f.agent.run(user("code")).await.unwrap_err();
        assert!(matches!(err, AgentError::ProtocolViolation(_)));
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_assistant_turn_from_backend_rejected() {
        let f = fixture(vec![Message::user("I am not the assistant")], 5);
        let err = f.agent.run(user("hi")).await.unwrap_err();
        assert!(matches!(err, AgentError::ProtocolViolation(_)));
    }

    struct StalledProvider;

    #[async_trait]
    impl LlmProvider for StalledProvider {
        fn name(&self) -> &str {
            "Stalled"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(false)
        }

        async fn complete(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _tools: &[ToolSchema],
            _options: &GenerationOptions,
        ) -> Result<Completion> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_model_timeout_is_model_unavailable() {
        let agent = AgentBuilder::new()
            .provider(Arc::new(StalledProvider))
            .model_timeout(Some(Duration::from_millis(20)))
            .build()
            .unwrap();

        let err = agent.run(user("hi")).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_ask() {
        let f = fixture(vec![Message::assistant("42")], 5);
        assert_eq!(f.agent.ask("meaning?").await.unwrap(), "42");
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(matches!(
            AgentBuilder::new().build(),
            Err(AgentError::Config(_))
        ));
    }
}
