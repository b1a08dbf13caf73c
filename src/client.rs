//! Client stub over a generic transport.
//!
//! [`GenericClient`] is the transport capability the stub consumes: it moves
//! encoded payloads and returns encoded replies. [`Client`] adds the typed
//! layer: it wraps the argument record in its one-element sequence, issues the
//! call under the full wire method name and decodes the reply.
//!
//! # Example
//!
//! ```ignore
//! use keybase_rpc::{CallContext, Client};
//!
//! let client = Client::new(transport);
//! let doubled: i64 = client
//!     .call(&CallContext::new(), "example.1.math.double", &21i64)
//!     .await?;
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::codec::MsgPackCodec;
use crate::error::{Result, RpcError};
use crate::handler::{BoxFuture, CallContext};

/// Transport capability used by the client stub.
///
/// Implementations own connection handling and error classification; a
/// server-side error and a transport failure both arrive as `Err`.
pub trait GenericClient: Send + Sync {
    /// Issue a call and wait for its reply payload.
    fn call<'a>(
        &'a self,
        ctx: &'a CallContext,
        method: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<Bytes>>;

    /// Send a fire-and-forget invocation.
    fn notify<'a>(
        &'a self,
        ctx: &'a CallContext,
        method: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Lifecycle of one outgoing invocation.
///
/// ```text
/// call:   Pending ─► Completed | Failed | Cancelled
/// notify: Pending ─► Sent | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Sent,
}

impl CallState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, CallState::Pending)
    }

    /// Move to `next`. Terminal states never change again.
    pub fn transition(
        self,
        next: CallState,
    ) -> std::result::Result<CallState, InvalidTransition> {
        match (self, next) {
            (CallState::Pending, next) if next.is_terminal() => Ok(next),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }

    /// Terminal state for a finished call.
    fn for_call<T>(result: &Result<T>) -> CallState {
        match result {
            Ok(_) => CallState::Completed,
            Err(RpcError::Cancelled | RpcError::DeadlineExceeded) => CallState::Cancelled,
            Err(_) => CallState::Failed,
        }
    }
}

/// Rejected [`CallState::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid call state transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: CallState,
    pub to: CallState,
}

/// Typed client over any [`GenericClient`].
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn GenericClient>,
}

impl Client {
    pub fn new(transport: impl GenericClient + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn from_arc(transport: Arc<dyn GenericClient>) -> Self {
        Self { transport }
    }

    /// Call `method` with `arg` and decode the reply into `R`.
    ///
    /// Use `R = ()` for methods without a return value; `Ok(())` is then the
    /// whole confirmation.
    pub async fn call<A, R>(&self, ctx: &CallContext, method: &str, arg: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let result = self.call_inner(ctx, method, arg).await;

        let terminal = CallState::for_call(&result);
        match &result {
            Ok(_) => tracing::debug!(method, state = ?terminal, "call finished"),
            Err(e) => tracing::debug!(method, state = ?terminal, error = %e, "call finished"),
        }
        result
    }

    async fn call_inner<A, R>(&self, ctx: &CallContext, method: &str, arg: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let payload = Bytes::from(MsgPackCodec::encode_args(arg)?);
        let reply = self.transport.call(ctx, method, payload).await?;
        MsgPackCodec::decode(&reply)
    }

    /// Send `arg` to `method` without waiting for any reply.
    pub async fn notify<A>(&self, ctx: &CallContext, method: &str, arg: &A) -> Result<()>
    where
        A: Serialize,
    {
        let payload = Bytes::from(MsgPackCodec::encode_args(arg)?);
        let result = self.transport.notify(ctx, method, payload).await;

        let terminal = if result.is_ok() {
            CallState::Sent
        } else {
            CallState::Failed
        };
        tracing::debug!(method, state = ?terminal, "notify finished");
        result
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records what it was asked to send and answers with a fixed reply.
    struct Recorder {
        sent: Mutex<Vec<(String, Bytes)>>,
        reply: Result<Bytes>,
    }

    impl Recorder {
        fn replying(reply: Result<Bytes>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                reply,
            }
        }
    }

    impl GenericClient for Arc<Recorder> {
        fn call<'a>(
            &'a self,
            _ctx: &'a CallContext,
            method: &'a str,
            payload: Bytes,
        ) -> BoxFuture<'a, Result<Bytes>> {
            self.sent.lock().unwrap().push((method.to_string(), payload));
            let reply = match &self.reply {
                Ok(b) => Ok(b.clone()),
                Err(_) => Err(RpcError::ConnectionClosed),
            };
            Box::pin(async move { reply })
        }

        fn notify<'a>(
            &'a self,
            _ctx: &'a CallContext,
            method: &'a str,
            payload: Bytes,
        ) -> BoxFuture<'a, Result<()>> {
            self.sent.lock().unwrap().push((method.to_string(), payload));
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn test_call_wraps_args_and_decodes_reply() {
        let recorder = Arc::new(Recorder::replying(Ok(Bytes::from(
            MsgPackCodec::encode(&42i64).unwrap(),
        ))));
        let client = Client::new(recorder.clone());

        let value: i64 = client
            .call(&CallContext::new(), "a.1.b.c", &21i64)
            .await
            .unwrap();
        assert_eq!(value, 42);

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].0, "a.1.b.c");
        let arg: i64 = MsgPackCodec::decode_args(&sent[0].1).unwrap();
        assert_eq!(arg, 21);
    }

    #[tokio::test]
    async fn test_call_unit_reply() {
        let recorder = Arc::new(Recorder::replying(Ok(Bytes::from(
            MsgPackCodec::encode(&()).unwrap(),
        ))));
        let client = Client::new(recorder);

        let result: Result<()> = client.call(&CallContext::new(), "a.1.b.c", &()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_call_transport_error() {
        let client = Client::new(Arc::new(Recorder::replying(Err(RpcError::ConnectionClosed))));

        let result: Result<()> = client.call(&CallContext::new(), "a.1.b.c", &()).await;
        assert!(matches!(result, Err(RpcError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_call_undecodable_reply() {
        let client = Client::new(Arc::new(Recorder::replying(Ok(Bytes::from_static(&[0xc1])))));

        let result: Result<i64> = client.call(&CallContext::new(), "a.1.b.c", &()).await;
        assert!(matches!(result, Err(RpcError::MsgPackDecode(_))));
    }

    #[tokio::test]
    async fn test_notify() {
        let recorder = Arc::new(Recorder::replying(Ok(Bytes::new())));
        let client = Client::new(recorder.clone());

        client
            .notify(&CallContext::new(), "a.1.b.n", &"payload")
            .await
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let arg: String = MsgPackCodec::decode_args(&sent[0].1).unwrap();
        assert_eq!(arg, "payload");
    }

    #[test]
    fn test_call_state_transitions() {
        let pending = CallState::Pending;
        assert!(!pending.is_terminal());

        for next in [
            CallState::Completed,
            CallState::Failed,
            CallState::Cancelled,
            CallState::Sent,
        ] {
            let terminal = pending.transition(next).unwrap();
            assert!(terminal.is_terminal());
            assert!(terminal.transition(CallState::Completed).is_err());
        }

        let err = pending.transition(CallState::Pending).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: CallState::Pending,
                to: CallState::Pending,
            }
        );
        assert_eq!(err.to_string(), "invalid call state transition Pending -> Pending");
    }

    #[test]
    fn test_call_state_for_result() {
        assert_eq!(CallState::for_call(&Ok(())), CallState::Completed);
        assert_eq!(
            CallState::for_call::<()>(&Err(RpcError::Cancelled)),
            CallState::Cancelled
        );
        assert_eq!(
            CallState::for_call::<()>(&Err(RpcError::DeadlineExceeded)),
            CallState::Cancelled
        );
        assert_eq!(CallState::for_call::<()>(&Err(RpcError::Busy)), CallState::Failed);
    }
}
