//! Application State

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use agent_core::{Agent, AgentConfig, LlmProvider, SessionId, SessionStore, ToolRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Model backend
    pub provider: Arc<dyn LlmProvider>,

    /// Tool registry with all available tools
    pub tools: Arc<ToolRegistry>,

    /// Chat history per session
    pub sessions: Arc<dyn SessionStore>,

    /// Serializes runs that continue the same session
    pub session_locks: Arc<SessionLocks>,

    /// Loop settings shared by every request
    pub config: AgentConfig,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<dyn SessionStore>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            sessions,
            session_locks: Arc::new(SessionLocks::default()),
            config,
        }
    }

    /// A fresh agent over the shared provider and tools
    pub fn agent(&self) -> Agent {
        Agent::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.tools),
            self.config.clone(),
        )
    }
}

/// One async lock per session, held from load to save
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // nobody else holds or waits on these
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_session_waits() {
        let locks = SessionLocks::default();
        let id = SessionId::from_string("s1");

        let guard = locks.acquire(&id).await;
        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(50), locks.acquire(&id)).await;
        assert!(blocked.is_err());

        // other sessions are unaffected
        let _other = locks.acquire(&SessionId::from_string("s2")).await;

        drop(guard);
        let _again = locks.acquire(&id).await;
    }
}
