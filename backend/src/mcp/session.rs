//! MCP session registry.
//!
//! Maps session identifiers to the transport that owns each session. A
//! session is registered once its initialize handshake succeeds and leaves
//! the registry on DELETE, on transport closure or at shutdown.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::McpError;
use super::transport::Transport;

/// Opaque session identifier issued after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// A fresh random (UUID v4) identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Produces session identifiers for stateful transports.
pub type SessionIdGenerator = Arc<dyn Fn() -> SessionId + Send + Sync>;

/// The default generator: random UUIDs.
pub fn random_session_ids() -> SessionIdGenerator {
    Arc::new(SessionId::random)
}

/// One logical client connection in stateful mode.
pub struct Session {
    id: SessionId,
    transport: Arc<Transport>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, transport: Arc<Transport>) -> Self {
        Self {
            id,
            transport,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("closed", &self.transport.is_closed())
            .finish()
    }
}

/// Process-wide map of live sessions.
///
/// Every operation takes the lock for one non-suspending step; the lock is
/// never held across an `.await`.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Fails if the id is already taken.
    pub fn create(&self, session: Session) -> Result<Arc<Session>, McpError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(McpError::DuplicateSession(session.id.clone()));
        }
        let session = Arc::new(session);
        sessions.insert(session.id.clone(), session.clone());
        info!(session_id = %session.id, "Created MCP session");
        Ok(session)
    }

    /// Find a live session. Sessions whose transport already closed are
    /// reported as missing.
    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read();
        sessions
            .get(&SessionId::from(id))
            .filter(|session| !session.transport.is_closed())
            .cloned()
    }

    /// Remove a session. Returns whether it was present.
    pub fn remove(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().remove(id);
        match removed {
            Some(session) => {
                info!(
                    session_id = %id,
                    age_secs = session.age().num_seconds(),
                    "Terminated MCP session"
                );
                true
            }
            None => false,
        }
    }

    /// Remove the session as soon as its transport closes, whoever closed it.
    pub fn evict_on_close(&self, session: &Arc<Session>) {
        let registry = self.clone();
        let id = session.id.clone();
        let closed = session.transport.closed();
        tokio::spawn(async move {
            closed.await;
            if registry.remove(&id) {
                debug!(session_id = %id, "Evicted closed MCP session");
            }
        });
    }

    /// Drain the registry and close every transport.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().drain().collect();
        let count = drained.len();
        for (_, session) in drained {
            session.transport.close();
        }
        if count > 0 {
            info!("Closed {} MCP session(s)", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
