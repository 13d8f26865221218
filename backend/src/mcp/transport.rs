//! Transport: one logical duplex channel between HTTP and a bound handler.
//!
//! Inbound bodies are decoded and handed to the handler; responses come back
//! inline, while server-initiated notifications travel over the push channel
//! (the long-lived GET stream) when one is open.

use futures::stream::Stream;
use kube_mcp_types::{JsonRpcMessage, JsonRpcNotification, JsonRpcResponse};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info, warn};

use super::codec;
use super::error::McpError;
use super::handler::{RequestContext, RequestHandler};
use super::session::{SessionId, SessionIdGenerator};

/// Messages buffered for a slow push-channel reader before new ones are dropped.
const PUSH_CHANNEL_CAPACITY: usize = 100;

/// What became of an inbound message.
#[derive(Debug)]
pub enum Inbound {
    /// A request was answered.
    Reply(JsonRpcResponse),
    /// The initialize handshake succeeded. Stateful transports report the
    /// session id they just generated.
    Initialized {
        session_id: Option<SessionId>,
        response: JsonRpcResponse,
    },
    /// A notification or client response was taken; nothing to send back.
    Accepted,
}

enum HandlerSlot {
    Unbound,
    Bound(Arc<dyn RequestHandler>),
    Released,
}

/// Sender side of the currently open push channel, if any.
struct PushSlot {
    sender: Mutex<Option<mpsc::Sender<JsonRpcMessage>>>,
}

impl PushSlot {
    fn push(&self, message: JsonRpcMessage) -> bool {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            debug!("No push channel open, discarding {:?}", message.method());
            return false;
        };
        match tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!("Push channel full, dropping {:?}", message.method());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Pushes server-initiated notifications onto a transport's push channel.
///
/// Delivery is best effort: with no open channel the message is discarded.
#[derive(Clone)]
pub struct Notifier {
    push: Arc<PushSlot>,
}

impl Notifier {
    /// Queue a notification. Returns whether it reached an open channel.
    pub fn notify(&self, notification: JsonRpcNotification) -> bool {
        self.push.push(notification.into())
    }
}

/// Per-session (or per-request, when stateless) channel owner.
pub struct Transport {
    session_id: OnceLock<SessionId>,
    id_generator: Option<SessionIdGenerator>,
    initialized: AtomicBool,
    handler: Mutex<HandlerSlot>,
    push: Arc<PushSlot>,
    closing: AtomicBool,
    closed: CancellationToken,
}

impl Transport {
    /// Transport that issues a session id once the handshake succeeds.
    pub fn stateful(id_generator: SessionIdGenerator) -> Self {
        Self::with_generator(Some(id_generator))
    }

    /// Transport with no session concept; it never issues or honors ids.
    pub fn stateless() -> Self {
        Self::with_generator(None)
    }

    fn with_generator(id_generator: Option<SessionIdGenerator>) -> Self {
        Self {
            session_id: OnceLock::new(),
            id_generator,
            initialized: AtomicBool::new(false),
            handler: Mutex::new(HandlerSlot::Unbound),
            push: Arc::new(PushSlot {
                sender: Mutex::new(None),
            }),
            closing: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.get()
    }

    pub fn is_stateless(&self) -> bool {
        self.id_generator.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the transport has been closed.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.closed.clone().cancelled_owned()
    }

    pub fn notifier(&self) -> Notifier {
        Notifier {
            push: self.push.clone(),
        }
    }

    /// Attach the handler. A transport binds exactly once.
    pub fn bind(&self, handler: Arc<dyn RequestHandler>) -> Result<(), McpError> {
        let mut slot = self.handler.lock();
        match *slot {
            HandlerSlot::Unbound => {
                *slot = HandlerSlot::Bound(handler);
                Ok(())
            }
            HandlerSlot::Bound(_) => Err(McpError::AlreadyBound),
            HandlerSlot::Released => Err(McpError::Closed),
        }
    }

    fn bound_handler(&self) -> Result<Arc<dyn RequestHandler>, McpError> {
        match &*self.handler.lock() {
            HandlerSlot::Bound(handler) => Ok(handler.clone()),
            HandlerSlot::Unbound => Err(McpError::Internal(
                "transport has no bound handler".to_string(),
            )),
            HandlerSlot::Released => Err(McpError::Closed),
        }
    }

    /// Decode a raw HTTP body and forward it to the handler.
    pub async fn handle_inbound(&self, body: &[u8]) -> Result<Inbound, McpError> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        let message = codec::decode(body)?;
        self.dispatch(message).await
    }

    /// Forward an already decoded message to the handler.
    ///
    /// Handler work races the close signal; if the transport closes first
    /// the outcome is discarded and `Closed` is returned.
    pub async fn dispatch(&self, message: JsonRpcMessage) -> Result<Inbound, McpError> {
        let handler = self.bound_handler()?;
        let ctx = RequestContext::new(self.session_id().cloned(), self.notifier());

        match message {
            JsonRpcMessage::Request(request) => {
                let is_initialize = request.is_initialize();
                if is_initialize && self.initialized.load(Ordering::Acquire) {
                    return Err(McpError::AlreadyInitialized);
                }

                let request_id = request.id.clone();
                let response = tokio::select! {
                    biased;
                    _ = self.closed.cancelled() => {
                        debug!(%request_id, "Transport closed, discarding response");
                        return Err(McpError::Closed);
                    }
                    result = handler.handle_request(request, ctx) => result?,
                };

                if is_initialize && !response.is_error() {
                    let session_id = self.mark_initialized();
                    return Ok(Inbound::Initialized {
                        session_id,
                        response,
                    });
                }
                Ok(Inbound::Reply(response))
            }
            JsonRpcMessage::Notification(notification) => {
                let method = notification.method.clone();
                tokio::select! {
                    biased;
                    _ = self.closed.cancelled() => return Err(McpError::Closed),
                    result = handler.handle_notification(notification, ctx) => {
                        if let Err(e) = result {
                            warn!("MCP: Notification {} failed: {:#}", method, e);
                        }
                    }
                }
                Ok(Inbound::Accepted)
            }
            JsonRpcMessage::Response(response) => {
                debug!(id = ?response.id, "Ignoring client response, no server requests outstanding");
                Ok(Inbound::Accepted)
            }
        }
    }

    fn mark_initialized(&self) -> Option<SessionId> {
        self.initialized.store(true, Ordering::Release);
        let generator = self.id_generator.as_ref()?;
        Some(self.session_id.get_or_init(|| generator()).clone())
    }

    /// Open the outbound message stream. Only one may be active at a time.
    ///
    /// Dropping the returned channel (client disconnect) closes the transport.
    pub fn open_push_channel(self: &Arc<Self>) -> Result<PushChannel, McpError> {
        let mut sender = self.push.sender.lock();
        // Checked under the lock; close() cancels before clearing the slot.
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        if sender.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(McpError::PushChannelBusy);
        }
        let (tx, rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        *sender = Some(tx);

        Ok(PushChannel {
            rx,
            guard: CloseOnDrop(Arc::clone(self)),
        })
    }

    /// Close the transport. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closed.cancel();
        self.push.sender.lock().take();
        let released = std::mem::replace(&mut *self.handler.lock(), HandlerSlot::Released);
        drop(released);
        debug!(session_id = ?self.session_id(), "Transport closed");
        true
    }
}

/// Receiving end of one push-channel connection.
pub struct PushChannel {
    rx: mpsc::Receiver<JsonRpcMessage>,
    guard: CloseOnDrop,
}

impl PushChannel {
    /// Pushed messages in order. The stream ends when the transport closes,
    /// and dropping it closes the transport.
    pub fn into_stream(self) -> impl Stream<Item = JsonRpcMessage> + Send + 'static {
        let PushChannel { rx, guard } = self;
        ReceiverStream::new(rx).map(move |message| {
            let _connection = &guard;
            message
        })
    }
}

/// Closes the transport when the push-channel consumer goes away.
struct CloseOnDrop(Arc<Transport>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if self.0.close() {
            info!(
                session_id = ?self.0.session_id(),
                "Push channel disconnected, transport closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kube_mcp_types::JsonRpcRequest;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Replies with the request method; `hang` never completes.
    struct EchoHandler {
        notifications: AtomicUsize,
    }

    #[async_trait]
    impl RequestHandler for EchoHandler {
        async fn handle_request(
            &self,
            request: JsonRpcRequest,
            ctx: RequestContext,
        ) -> anyhow::Result<JsonRpcResponse> {
            match request.method.as_str() {
                "hang" => std::future::pending().await,
                "fail" => Err(anyhow::anyhow!("handler exploded")),
                "reject" | "initialize" if request.params.is_none() => Ok(JsonRpcResponse::error(
                    Some(request.id),
                    -32602,
                    "missing params",
                )),
                method => {
                    ctx.notifier().notify(JsonRpcNotification::new(
                        "notifications/message",
                        Some(json!({ "data": method })),
                    ));
                    Ok(JsonRpcResponse::success(
                        request.id,
                        json!({ "method": method, "session": ctx.session_id().map(|s| s.to_string()) }),
                    ))
                }
            }
        }

        async fn handle_notification(
            &self,
            _notification: JsonRpcNotification,
            _ctx: RequestContext,
        ) -> anyhow::Result<()> {
            self.notifications.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn echo() -> Arc<EchoHandler> {
        Arc::new(EchoHandler {
            notifications: AtomicUsize::new(0),
        })
    }

    fn fixed_ids() -> SessionIdGenerator {
        Arc::new(|| SessionId::from("session-1"))
    }

    fn bound_stateful() -> Arc<Transport> {
        let transport = Arc::new(Transport::stateful(fixed_ids()));
        transport.bind(echo()).unwrap();
        transport
    }

    const INIT: &[u8] = br#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;

    #[tokio::test]
    async fn test_bind_twice_fails() {
        let transport = Transport::stateless();
        transport.bind(echo()).unwrap();
        assert!(matches!(
            transport.bind(echo()),
            Err(McpError::AlreadyBound)
        ));
    }

    #[tokio::test]
    async fn test_unbound_transport_is_internal_error() {
        let transport = Transport::stateless();
        let err = transport.handle_inbound(INIT).await.unwrap_err();
        assert!(matches!(err, McpError::Internal(_)));
    }

    #[tokio::test]
    async fn test_initialize_issues_session_id_once() {
        let transport = bound_stateful();
        assert!(transport.session_id().is_none());

        match transport.handle_inbound(INIT).await.unwrap() {
            Inbound::Initialized { session_id, .. } => {
                assert_eq!(session_id, Some(SessionId::from("session-1")));
            }
            other => panic!("expected Initialized, got {:?}", other),
        }
        assert_eq!(transport.session_id(), Some(&SessionId::from("session-1")));

        let err = transport.handle_inbound(INIT).await.unwrap_err();
        assert!(matches!(err, McpError::AlreadyInitialized));
    }

    #[tokio::test]
    async fn test_failed_handshake_issues_no_session() {
        let transport = bound_stateful();
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;

        match transport.handle_inbound(body).await.unwrap() {
            Inbound::Reply(response) => assert!(response.is_error()),
            other => panic!("expected Reply, got {:?}", other),
        }
        assert!(transport.session_id().is_none());
    }

    #[tokio::test]
    async fn test_stateless_initialize_has_no_session() {
        let transport = Transport::stateless();
        transport.bind(echo()).unwrap();

        match transport.handle_inbound(INIT).await.unwrap() {
            Inbound::Initialized { session_id, .. } => assert!(session_id.is_none()),
            other => panic!("expected Initialized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_reply_carries_session() {
        let transport = bound_stateful();
        transport.handle_inbound(INIT).await.unwrap();

        let body = br#"{"jsonrpc":"2.0","id":"x","method":"tools/list"}"#;
        match transport.handle_inbound(body).await.unwrap() {
            Inbound::Reply(response) => {
                let result = response.result.unwrap();
                assert_eq!(result["method"], "tools/list");
                assert_eq!(result["session"], "session-1");
            }
            other => panic!("expected Reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notification_is_accepted() {
        let handler = echo();
        let transport = Transport::stateless();
        transport.bind(handler.clone()).unwrap();

        let body = br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert!(matches!(
            transport.handle_inbound(body).await.unwrap(),
            Inbound::Accepted
        ));
        assert_eq!(handler.notifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_is_internal() {
        let transport = bound_stateful();
        let body = br#"{"jsonrpc":"2.0","id":3,"method":"fail"}"#;
        let err = transport.handle_inbound(body).await.unwrap_err();
        assert!(matches!(err, McpError::Internal(_)));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let transport = bound_stateful();
        let err = transport.handle_inbound(b"{oops").await.unwrap_err();
        assert!(matches!(err, McpError::MalformedMessage(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = bound_stateful();
        assert!(transport.close());
        assert!(!transport.close());
        assert!(transport.is_closed());

        let err = transport.handle_inbound(INIT).await.unwrap_err();
        assert!(matches!(err, McpError::Closed));
        assert!(matches!(transport.bind(echo()), Err(McpError::Closed)));
    }

    #[tokio::test]
    async fn test_close_discards_in_flight_request() {
        let transport = bound_stateful();
        let in_flight = tokio::spawn({
            let transport = transport.clone();
            async move {
                transport
                    .handle_inbound(br#"{"jsonrpc":"2.0","id":9,"method":"hang"}"#)
                    .await
            }
        });

        tokio::task::yield_now().await;
        transport.close();

        let result = tokio::time::timeout(Duration::from_secs(1), in_flight)
            .await
            .expect("in-flight request should observe close")
            .unwrap();
        assert!(matches!(result, Err(McpError::Closed)));
    }

    #[tokio::test]
    async fn test_push_channel_delivers_notifications() {
        let transport = bound_stateful();
        transport.handle_inbound(INIT).await.unwrap();
        let mut messages = Box::pin(transport.open_push_channel().unwrap().into_stream());

        transport
            .handle_inbound(br#"{"jsonrpc":"2.0","id":2,"method":"tools/call"}"#)
            .await
            .unwrap();

        match messages.next().await.unwrap() {
            JsonRpcMessage::Notification(notification) => {
                assert_eq!(notification.method, "notifications/message");
                assert_eq!(notification.params.unwrap()["data"], "tools/call");
            }
            other => panic!("expected a notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notify_without_channel_is_discarded() {
        let transport = bound_stateful();
        let delivered = transport
            .notifier()
            .notify(JsonRpcNotification::new("notifications/message", None));
        assert!(!delivered);
    }

    #[tokio::test]
    async fn test_second_push_channel_is_rejected() {
        let transport = bound_stateful();
        let _first = transport.open_push_channel().unwrap();
        assert!(matches!(
            transport.open_push_channel(),
            Err(McpError::PushChannelBusy)
        ));
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_push_channel_closes_transport() {
        let transport = bound_stateful();
        let channel = transport.open_push_channel().unwrap();
        drop(channel);
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_push_stream_closes_transport() {
        let transport = bound_stateful();
        let messages = transport.open_push_channel().unwrap().into_stream();
        assert!(!transport.is_closed());
        drop(messages);
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_close_ends_push_stream() {
        let transport = bound_stateful();
        let mut messages = Box::pin(transport.open_push_channel().unwrap().into_stream());
        transport.close();
        assert!(messages.next().await.is_none());
        assert!(matches!(
            transport.open_push_channel(),
            Err(McpError::Closed)
        ));
    }
}
