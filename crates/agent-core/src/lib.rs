//! # agent-core
//!
//! Tool-calling orchestration: a provider-agnostic model abstraction, a tool
//! registry with a failure-isolating dispatcher, and the loop that ties them
//! together.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Reasoning  │  │    Tool     │  │   LlmProvider       │  │
//! │  │    Loop     │──│  Dispatcher │  │   (Strategy)        │  │
//! │  └──────┬──────┘  └──────┬──────┘  └─────────────────────┘  │
//! │         │          ┌─────┴───────┐                          │
//! │   Conversation     │ToolRegistry │                          │
//! │                    └─────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait is injected into the `Agent`, so tests can swap in
//! [`mock::ScriptedProvider`] and deployments can use any backend.

pub mod dispatch;
pub mod error;
pub mod message;
pub mod mock;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use dispatch::ToolDispatcher;
pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, RunOutcome};
pub use session::{MemorySessionStore, Session, SessionId, SessionStore};
pub use tool::{ParameterSchema, Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};
