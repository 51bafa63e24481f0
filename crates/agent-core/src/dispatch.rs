//! Tool Dispatcher
//!
//! Resolves a [`ToolCall`] against the [`ToolRegistry`] and runs the bound
//! handler. Every failure mode (unknown name, bad arguments, handler error,
//! panic, timeout) comes back as an error-flagged [`ToolResult`] so a single
//! misbehaving tool never ends the conversation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;

use crate::error::AgentError;
use crate::tool::{ToolCall, ToolRegistry, ToolResult};

/// Runs tool calls against a shared registry
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Option<Duration>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    /// Limit how long a single tool invocation may run
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool call
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        invoke(&self.registry, call, self.timeout).await
    }

    /// Run every call of a batch in parallel and wait for all of them.
    ///
    /// Results come back in request order, one per call, whatever happened to
    /// the individual invocations. Dropping the returned future aborts the
    /// tasks still running.
    pub async fn dispatch_batch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut tasks = JoinSet::new();
        for (index, call) in calls.iter().cloned().enumerate() {
            let registry = Arc::clone(&self.registry);
            let timeout = self.timeout;
            tasks.spawn(async move { (index, invoke(&registry, &call, timeout).await) });
        }

        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::warn!(error = %e, "Tool task did not complete"),
            }
        }

        slots
            .into_iter()
            .zip(calls)
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| {
                    ToolResult::failure(
                        &call.id,
                        &call.name,
                        format!("tool '{}' did not complete", call.name),
                    )
                })
            })
            .collect()
    }
}

async fn invoke(registry: &ToolRegistry, call: &ToolCall, timeout: Option<Duration>) -> ToolResult {
    let Some(tool) = registry.get(&call.name) else {
        tracing::warn!(tool = %call.name, id = %call.id, "Unknown tool requested");
        let err = AgentError::ToolNotFound(call.name.clone());
        return ToolResult::failure(&call.id, &call.name, err.to_string());
    };

    if let Err(e) = tool.validate(call) {
        tracing::warn!(tool = %call.name, id = %call.id, error = %e, "Tool arguments rejected");
        return ToolResult::failure(&call.id, &call.name, e.to_string());
    }

    tracing::debug!(tool = %call.name, id = %call.id, "Executing tool");
    let started = Instant::now();
    let execution = AssertUnwindSafe(tool.execute(call)).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, execution).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(tool = %call.name, id = %call.id, ?limit, "Tool timed out");
                return ToolResult::failure(
                    &call.id,
                    &call.name,
                    format!("Error executing tool {}: timed out after {limit:?}", call.name),
                );
            }
        },
        None => execution.await,
    };

    let result = match outcome {
        Ok(Ok(output)) => ToolResult::success(&call.id, &call.name, output),
        Ok(Err(e)) => ToolResult::failure(
            &call.id,
            &call.name,
            format!("Error executing tool {}: {e}", call.name),
        ),
        Err(payload) => ToolResult::failure(
            &call.id,
            &call.name,
            format!("tool '{}' panicked: {}", call.name, panic_message(&*payload)),
        ),
    };

    if result.is_error {
        tracing::warn!(tool = %call.name, id = %call.id, error = %result.content, "Tool failed");
    } else {
        tracing::debug!(tool = %call.name, id = %call.id, elapsed = ?started.elapsed(), "Tool finished");
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, Result};
    use crate::tool::{ParameterSchema, Tool, ToolSchema};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    fn schema(name: &str) -> ToolSchema {
        ToolSchema {
            name: name.into(),
            description: format!("{name} test tool"),
            parameters: vec![],
        }
    }

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                parameters: vec![ParameterSchema::required("term", "string", "Search term")],
                ..schema("code_lookup")
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match call.get_str("term") {
                Some("diabetes") => "E11.9".into(),
                Some(other) => format!("no match for {other}"),
                None => String::new(),
            })
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn schema(&self) -> ToolSchema {
            schema("failing")
        }

        async fn execute(&self, _call: &ToolCall) -> Result<String> {
            Err(AgentError::ToolExecution("catalog offline".into()))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn schema(&self) -> ToolSchema {
            schema("panicking")
        }

        async fn execute(&self, _call: &ToolCall) -> Result<String> {
            panic!("index out of range");
        }
    }

    struct SlowTool(Duration);

    #[async_trait]
    impl Tool for SlowTool {
        fn schema(&self) -> ToolSchema {
            schema("slow")
        }

        async fn execute(&self, _call: &ToolCall) -> Result<String> {
            tokio::time::sleep(self.0).await;
            Ok("slow done".into())
        }
    }

    struct BarrierTool(Arc<Barrier>);

    #[async_trait]
    impl Tool for BarrierTool {
        fn schema(&self) -> ToolSchema {
            schema("rendezvous")
        }

        async fn execute(&self, call: &ToolCall) -> Result<String> {
            self.0.wait().await;
            Ok(call.id.clone())
        }
    }

    fn dispatcher(calls: &Arc<AtomicUsize>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry
            .register(CountingTool {
                calls: Arc::clone(calls),
            })
            .unwrap();
        registry.register(FailingTool).unwrap();
        registry.register(PanickingTool).unwrap();
        registry
            .register(SlowTool(Duration::from_secs(30)))
            .unwrap();
        ToolDispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = dispatcher(&calls)
            .dispatch(&ToolCall::from_json("t1", "code_lookup", json!({"term": "diabetes"})))
            .await;

        assert_eq!(result, ToolResult::success("t1", "code_lookup", "E11.9"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_invokes_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = dispatcher(&calls)
            .dispatch(&ToolCall::from_json("t9", "nonexistent", json!({})))
            .await;

        assert!(result.is_error);
        assert_eq!(result.tool_call_id, "t9");
        assert_eq!(result.content, "unknown tool: nonexistent");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_argument_is_error_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = dispatcher(&calls)
            .dispatch(&ToolCall::from_json("t1", "code_lookup", json!({})))
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("term"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_is_captured() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = dispatcher(&calls)
            .dispatch(&ToolCall::from_json("t2", "failing", json!({})))
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("catalog offline"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_captured() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = dispatcher(&calls)
            .dispatch(&ToolCall::from_json("t3", "panicking", json!({})))
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("index out of range"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_error_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = dispatcher(&calls)
            .with_timeout(Some(Duration::from_millis(20)))
            .dispatch(&ToolCall::from_json("t4", "slow", json!({})))
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("timed out"));
    }

    #[tokio::test]
    async fn test_batch_keeps_request_order_and_all_results() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batch = vec![
            ToolCall::from_json("a", "panicking", json!({})),
            ToolCall::from_json("b", "code_lookup", json!({"term": "diabetes"})),
            ToolCall::from_json("c", "nonexistent", json!({})),
            ToolCall::from_json("d", "failing", json!({})),
        ];

        let results = dispatcher(&calls).dispatch_batch(&batch).await;

        let ids: Vec<_> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        let errors: Vec<_> = results.iter().map(|r| r.is_error).collect();
        assert_eq!(errors, vec![true, false, true, true]);
        assert_eq!(results[1].content, "E11.9");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_batch_runs_calls_concurrently() {
        // Each call waits for the other; sequential execution would never finish.
        let mut registry = ToolRegistry::new();
        registry
            .register(BarrierTool(Arc::new(Barrier::new(2))))
            .unwrap();
        let dispatcher = ToolDispatcher::new(Arc::new(registry));
        let batch = vec![
            ToolCall::from_json("x", "rendezvous", json!({})),
            ToolCall::from_json("y", "rendezvous", json!({})),
        ];

        let results = tokio::time::timeout(Duration::from_secs(5), dispatcher.dispatch_batch(&batch))
            .await
            .expect("batch should not deadlock");

        assert_eq!(results[0].content, "x");
        assert_eq!(results[1].content, "y");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(dispatcher(&calls).dispatch_batch(&[]).await.is_empty());
    }
}
