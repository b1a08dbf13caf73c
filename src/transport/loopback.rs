//! In-process transport connecting a [`Client`] to a [`Dispatcher`].
//!
//! Messages travel over a bounded tokio channel; each call carries its own
//! reply slot, so any number of calls can be outstanding at once and replies
//! never block each other.
//!
//! ```text
//! Client ─┐                                  ┌─► task ─► handler
//! Client ─┼─► mpsc::Sender<Message> ─► serve ┼─► task ─► handler
//! Client ─┘        (Call / Notify)           └─► task ─► handler
//! ```
//!
//! The reply slot doubles as the call's cancellation signal: a caller that
//! gives up (cancel, deadline, or a dropped future) drops its receiver, and
//! the server cancels the handler's context as soon as it notices. A call
//! abandoned while still queued is never dispatched.
//!
//! Payloads stay encoded end to end, and errors are encoded as
//! [`WireError`] on the way back, exactly as a socket transport would see
//! them.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;

use crate::client::{Client, GenericClient};
use crate::codec::MsgPackCodec;
use crate::config::ConnectionConfig;
use crate::error::{Result, RpcError, WireError};
use crate::handler::{BoxFuture, CallContext, Dispatcher, IncomingCall, Tags};

/// Reply to a call: encoded result, or encoded [`WireError`].
type Reply = std::result::Result<Bytes, Bytes>;

/// Message from client to server.
#[derive(Debug)]
enum Message {
    Call {
        seqid: u32,
        method: String,
        payload: Bytes,
        tags: Tags,
        timeout: Option<Duration>,
        reply: oneshot::Sender<Reply>,
    },
    Notify {
        method: String,
        payload: Bytes,
        tags: Tags,
    },
}

/// Client half of a loopback connection.
pub struct LoopbackClient {
    tx: mpsc::Sender<Message>,
    next_seqid: AtomicU32,
    default_timeout: Option<Duration>,
}

/// Server half of a loopback connection. Run it with [`serve`](Self::serve).
pub struct LoopbackServer {
    rx: mpsc::Receiver<Message>,
    dispatcher: Dispatcher,
    semaphore: Arc<Semaphore>,
}

/// Create a connected client/server pair.
///
/// Limits outside what tokio supports are clamped with a warning, so any
/// [`ConnectionConfig`] is accepted.
pub fn connect(dispatcher: Dispatcher, config: &ConnectionConfig) -> (LoopbackClient, LoopbackServer) {
    let channel_capacity = bounded("channel_capacity", config.channel_capacity);
    let max_concurrent_calls = bounded("max_concurrent_calls", config.max_concurrent_calls);
    let (tx, rx) = mpsc::channel(channel_capacity);

    let client = LoopbackClient {
        tx,
        next_seqid: AtomicU32::new(1),
        default_timeout: config.default_timeout,
    };
    let server = LoopbackServer {
        rx,
        dispatcher,
        semaphore: Arc::new(Semaphore::new(max_concurrent_calls)),
    };

    (client, server)
}

/// Connect and spawn the server loop, returning a ready [`Client`].
///
/// The server loop ends once every clone of the client is dropped.
pub fn spawn(dispatcher: Dispatcher, config: &ConnectionConfig) -> (Client, JoinHandle<()>) {
    let (client, server) = connect(dispatcher, config);
    let task = tokio::spawn(server.serve());
    (Client::new(client), task)
}

/// Clamp a limit into `1..=Semaphore::MAX_PERMITS`.
fn bounded(name: &str, value: usize) -> usize {
    let clamped = value.clamp(1, Semaphore::MAX_PERMITS);
    if clamped != value {
        tracing::warn!(setting = name, value, clamped, "limit out of range, clamping");
    }
    clamped
}

impl LoopbackClient {
    fn next_seqid(&self) -> u32 {
        self.next_seqid.fetch_add(1, Ordering::Relaxed)
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| RpcError::ConnectionClosed)
    }

    async fn call_with(&self, ctx: &CallContext, method: &str, payload: Bytes) -> Result<Bytes> {
        ctx.check()?;

        let seqid = self.next_seqid();
        let (reply_tx, reply_rx) = oneshot::channel();
        let message = Message::Call {
            seqid,
            method: method.to_string(),
            payload,
            tags: ctx.tags().clone(),
            timeout: ctx.remaining(),
            reply: reply_tx,
        };

        // Waiting for channel capacity is bounded by the context too.
        tokio::select! {
            sent = self.send(message) => sent?,
            err = ctx.done() => {
                tracing::debug!(seqid, method, error = %err, "call abandoned before it was sent");
                return Err(err);
            }
        }

        tokio::select! {
            reply = reply_rx => match reply {
                Ok(Ok(bytes)) => Ok(bytes),
                Ok(Err(encoded)) => Err(decode_error(&encoded)),
                Err(_) => Err(RpcError::ConnectionClosed),
            },
            err = ctx.done() => {
                // Dropping the receiver here is what tells the server to cancel.
                tracing::debug!(seqid, method, error = %err, "cancelling call");
                Err(err)
            }
        }
    }
}

impl GenericClient for LoopbackClient {
    fn call<'a>(
        &'a self,
        ctx: &'a CallContext,
        method: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move {
            match (ctx.deadline(), self.default_timeout) {
                (None, Some(timeout)) => {
                    let scoped = ctx.clone().with_timeout(timeout);
                    self.call_with(&scoped, method, payload).await
                }
                _ => self.call_with(ctx, method, payload).await,
            }
        })
    }

    fn notify<'a>(
        &'a self,
        ctx: &'a CallContext,
        method: &'a str,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            ctx.check()?;
            let message = Message::Notify {
                method: method.to_string(),
                payload,
                tags: ctx.tags().clone(),
            };
            tokio::select! {
                sent = self.send(message) => sent,
                err = ctx.done() => Err(err),
            }
        })
    }
}

impl LoopbackServer {
    /// Serve messages until every client handle is dropped.
    ///
    /// Each call runs on its own task; a failing or panicking call never
    /// stops the loop.
    pub async fn serve(mut self) {
        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Call {
                    seqid,
                    method,
                    payload,
                    tags,
                    timeout,
                    reply,
                } => self.spawn_call(seqid, method, payload, tags, timeout, reply),
                Message::Notify {
                    method,
                    payload,
                    tags,
                } => self.spawn_notify(method, payload, tags),
            }
        }

        tracing::debug!("loopback connection closed");
    }

    fn spawn_call(
        &self,
        seqid: u32,
        method: String,
        payload: Bytes,
        tags: Tags,
        timeout: Option<Duration>,
        mut reply: oneshot::Sender<Reply>,
    ) {
        if reply.is_closed() {
            tracing::debug!(seqid, method = %method, "caller gave up before dispatch, skipping");
            return;
        }

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(seqid, method = %method, "handler capacity reached, refusing call");
                let _ = reply.send(Err(encode_error(&RpcError::Busy)));
                return;
            }
        };

        let mut ctx = CallContext::new().with_tags(tags);
        if let Some(timeout) = timeout {
            ctx = ctx.with_timeout(timeout);
        }

        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            // Permit is held until the handler finishes, even after a cancel
            let _permit = permit;

            let dispatch = dispatcher.dispatch(ctx.clone(), IncomingCall::call(method, payload));
            tokio::pin!(dispatch);

            let finished = tokio::select! {
                outcome = &mut dispatch => Some(outcome),
                _ = reply.closed() => None,
            };
            let outcome = match finished {
                Some(outcome) => outcome,
                None => {
                    tracing::debug!(seqid, "caller went away, cancelling handler");
                    ctx.cancel();
                    dispatch.await;
                    return;
                }
            };

            let response = match outcome {
                Some(Ok(bytes)) => Ok(bytes),
                Some(Err(e)) => Err(encode_error(&e)),
                None => return,
            };
            if reply.send(response).is_err() {
                tracing::debug!(seqid, "caller went away before the reply");
            }
        });
    }

    fn spawn_notify(&self, method: String, payload: Bytes, tags: Tags) {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(method = %method, "handler capacity reached, dropping notify");
                return;
            }
        };

        let ctx = CallContext::new().with_tags(tags);
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            let _permit = permit;
            dispatcher
                .dispatch(ctx, IncomingCall::notify(method, payload))
                .await;
        });
    }
}

fn encode_error(err: &RpcError) -> Bytes {
    match MsgPackCodec::encode(&WireError::from(err)) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode error reply");
            Bytes::new()
        }
    }
}

fn decode_error(bytes: &[u8]) -> RpcError {
    match MsgPackCodec::decode::<WireError>(bytes) {
        Ok(wire) => wire.into(),
        Err(e) => e,
    }
}
