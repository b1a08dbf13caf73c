//! Server-side dispatch of incoming invocations.
//!
//! The [`Dispatcher`] resolves an invocation against the registry, runs the
//! handler on its own task and hands back the encoded reply. Every failure
//! is scoped to the one call that caused it.

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;

use super::{CallContext, MethodKind, ProtocolRegistry};
use crate::error::{Result, RpcError};

/// One invocation as delivered by a transport.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    /// Wire method name, `<protocol>.<method>`.
    pub method: String,
    /// Call-kind as declared by the sender.
    pub kind: MethodKind,
    /// Encoded one-element argument sequence.
    pub payload: Bytes,
}

impl IncomingCall {
    pub fn call(method: impl Into<String>, payload: Bytes) -> Self {
        Self {
            method: method.into(),
            kind: MethodKind::Call,
            payload,
        }
    }

    pub fn notify(method: impl Into<String>, payload: Bytes) -> Self {
        Self {
            method: method.into(),
            kind: MethodKind::Notify,
            payload,
        }
    }
}

/// Dispatches invocations to the handlers of a frozen registry.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ProtocolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: ProtocolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn from_arc(registry: Arc<ProtocolRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// Dispatch one invocation.
    ///
    /// Returns `Some(reply)` for calls and `None` for notifies. A notify's
    /// failure is only logged, since nobody is waiting for it.
    pub async fn dispatch(&self, ctx: CallContext, call: IncomingCall) -> Option<Result<Bytes>> {
        let kind = call.kind;
        let method = call.method.clone();
        let result = self.invoke(ctx, call).await;

        match kind {
            MethodKind::Call => {
                if let Err(e) = &result {
                    tracing::debug!(method = %method, error = %e, "call failed");
                }
                Some(result)
            }
            MethodKind::Notify => {
                if let Err(e) = result {
                    tracing::warn!(method = %method, error = %e, "notify handler failed");
                }
                None
            }
        }
    }

    /// Resolve, decode, run and encode a single invocation.
    async fn invoke(&self, ctx: CallContext, call: IncomingCall) -> Result<Bytes> {
        let entry = self.registry.resolve(&call.method)?;

        if entry.kind() != call.kind {
            return Err(RpcError::KindMismatch {
                method: call.method,
                expected: entry.kind(),
                actual: call.kind,
            });
        }

        let handler = entry.handler();
        let payload = call.payload;

        // Decode runs inside the task as well.
        let task = tokio::spawn(async move { handler.call(ctx, payload).await });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!(method = %call.method, panic = %message, "handler panicked");
                Err(RpcError::Panic(message))
            }
            Err(_) => Err(RpcError::Cancelled),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
