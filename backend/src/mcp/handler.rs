//! Request handler seam.
//!
//! The transport knows nothing about what a handler does; it only hands over
//! decoded requests and notifications and relays whatever comes back.

use async_trait::async_trait;
use kube_mcp_types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use std::sync::Arc;

use super::session::SessionId;
use super::transport::Notifier;

/// Per-message context given to a handler.
#[derive(Clone)]
pub struct RequestContext {
    session_id: Option<SessionId>,
    notifier: Notifier,
}

impl RequestContext {
    pub(crate) fn new(session_id: Option<SessionId>, notifier: Notifier) -> Self {
        Self {
            session_id,
            notifier,
        }
    }

    /// Session the message arrived on, `None` in stateless mode and during
    /// the initialize handshake.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Handle for pushing server-initiated notifications to the client.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

/// A long-lived protocol handler bound to one transport.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response correlated with `request`.
    ///
    /// Protocol-level failures belong in the returned response; an `Err`
    /// is treated as an uncaught handler failure.
    async fn handle_request(
        &self,
        request: JsonRpcRequest,
        ctx: RequestContext,
    ) -> anyhow::Result<JsonRpcResponse>;

    /// React to a client notification.
    async fn handle_notification(
        &self,
        notification: JsonRpcNotification,
        ctx: RequestContext,
    ) -> anyhow::Result<()> {
        let _ = (notification, ctx);
        Ok(())
    }
}

/// Builds a fresh handler instance: one per session in stateful mode,
/// one per request in stateless mode.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn RequestHandler> + Send + Sync>;
