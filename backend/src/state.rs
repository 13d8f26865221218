//! Application state management.

use std::sync::Arc;

use crate::config::TransportConfig;
use crate::mcp::{random_session_ids, HandlerFactory, SessionIdGenerator, SessionRegistry};
use crate::tools::ToolServer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Endpoint and transport settings
    config: TransportConfig,
    /// Live sessions (stateful mode only)
    sessions: SessionRegistry,
    /// Builds a handler per session or per stateless request
    handler_factory: HandlerFactory,
    /// Issues session ids on successful initialize
    id_generator: SessionIdGenerator,
}

impl AppState {
    /// Create state with the given handler factory and random session ids.
    pub fn new(config: TransportConfig, handler_factory: HandlerFactory) -> Self {
        Self::with_id_generator(config, handler_factory, random_session_ids())
    }

    /// Create state with a custom session id generator.
    pub fn with_id_generator(
        config: TransportConfig,
        handler_factory: HandlerFactory,
        id_generator: SessionIdGenerator,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                sessions: SessionRegistry::new(),
                handler_factory,
                id_generator,
            }),
        }
    }

    /// State serving the built-in Kubernetes tool server.
    pub fn with_tool_server(config: TransportConfig) -> Self {
        Self::new(config, ToolServer::factory())
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Get the session registry.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Build a fresh handler instance.
    pub fn new_handler(&self) -> Arc<dyn crate::mcp::RequestHandler> {
        (self.inner.handler_factory)()
    }

    pub fn id_generator(&self) -> SessionIdGenerator {
        self.inner.id_generator.clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_tool_server(TransportConfig::default())
    }
}
