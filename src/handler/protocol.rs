//! Protocol descriptors: named tables of typed method handlers.
//!
//! A [`Protocol`] is built once from a business implementation and never
//! changes afterwards. Each method's argument type is the type parameter of
//! its [`TypedHandler`], so the decoder and the handler cannot disagree.
//!
//! # Example
//!
//! ```ignore
//! use keybase_rpc::handler::{MethodKind, Protocol};
//!
//! let protocol = Protocol::builder("example.1.echo")
//!     .method("echo", MethodKind::Call, |_ctx, arg: String| async move { Ok(arg) })
//!     .method("ping", MethodKind::Notify, |_ctx, _: ()| async { Ok(()) })
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::CallContext;
use crate::codec::MsgPackCodec;
use crate::error::{Result, RpcError};

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whether an invocation expects a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Expects a reply (result or error).
    Call,
    /// Fire-and-forget, no reply.
    Notify,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Call => f.write_str("call"),
            MethodKind::Notify => f.write_str("notify"),
        }
    }
}

/// Trait for method handlers working on encoded payloads.
pub trait Handler: Send + Sync + 'static {
    /// Decode `payload`, run the method, and encode its result.
    fn call(&self, ctx: CallContext, payload: Bytes) -> BoxFuture<'static, Result<Bytes>>;
}

/// Wrapper that decodes the argument record before calling the handler and
/// encodes the reply afterwards.
pub struct TypedHandler<F, A, R, Fut>
where
    F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    handler: F,
    arg_schema: Option<&'static str>,
    _phantom: PhantomData<fn(A) -> Fut>,
}

impl<F, A, R, Fut> TypedHandler<F, A, R, Fut>
where
    F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            arg_schema: None,
            _phantom: PhantomData,
        }
    }

    /// Name the argument record in type errors, e.g. `SelfProvisionArg`.
    pub fn with_arg_schema(mut self, arg_schema: &'static str) -> Self {
        self.arg_schema = Some(arg_schema);
        self
    }
}

impl<F, A, R, Fut> Handler for TypedHandler<F, A, R, Fut>
where
    F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn call(&self, ctx: CallContext, payload: Bytes) -> BoxFuture<'static, Result<Bytes>> {
        let arg: A = match MsgPackCodec::decode_args(&payload) {
            Ok(v) => v,
            Err(mut e) => {
                if let Some(schema) = self.arg_schema {
                    e.expected = format!("[{schema}]");
                }
                return Box::pin(async move { Err(RpcError::Type(e)) });
            }
        };

        let fut = (self.handler)(ctx, arg);
        Box::pin(async move {
            let reply = fut.await?;
            Ok(Bytes::from(MsgPackCodec::encode(&reply)?))
        })
    }
}

/// Entry for a registered method.
#[derive(Clone)]
pub struct MethodEntry {
    handler: Arc<dyn Handler>,
    kind: MethodKind,
}

impl MethodEntry {
    #[inline]
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    #[inline]
    pub fn handler(&self) -> Arc<dyn Handler> {
        self.handler.clone()
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A named protocol: method name to [`MethodEntry`].
#[derive(Debug, Clone)]
pub struct Protocol {
    name: String,
    methods: HashMap<String, MethodEntry>,
}

impl Protocol {
    /// Start building a protocol with the given dotted name.
    pub fn builder(name: impl Into<String>) -> ProtocolBuilder {
        ProtocolBuilder::new(name)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a method entry by its short name.
    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.get(name)
    }

    /// Get the call-kind of a method.
    pub fn method_kind(&self, name: &str) -> Option<MethodKind> {
        self.methods.get(name).map(MethodEntry::kind)
    }

    /// Method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Builder for [`Protocol`].
///
/// Registration problems are collected and reported by [`build`](Self::build)
/// so the builder chain stays fluent.
pub struct ProtocolBuilder {
    name: String,
    methods: HashMap<String, MethodEntry>,
    error: Option<RpcError>,
}

impl ProtocolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
            error: None,
        }
    }

    /// Register a method handler.
    ///
    /// Type errors name the argument by its Rust type; prefer
    /// [`method_with_schema`](Self::method_with_schema) for protocols that
    /// come from a schema.
    ///
    /// # Arguments
    ///
    /// * `name` - Short method name (no dots)
    /// * `kind` - Declared call-kind
    /// * `handler` - Function from (CallContext, A) to a future of `Result<R>`
    pub fn method<F, A, R, Fut>(self, name: &str, kind: MethodKind, handler: F) -> Self
    where
        F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.insert(name, kind, TypedHandler::new(handler))
    }

    /// Register a method handler whose argument record has a schema name.
    ///
    /// The name is what callers see as the expected type of a rejected
    /// payload, so it stays stable across builds.
    pub fn method_with_schema<F, A, R, Fut>(
        self,
        name: &str,
        kind: MethodKind,
        arg_schema: &'static str,
        handler: F,
    ) -> Self
    where
        F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.insert(
            name,
            kind,
            TypedHandler::new(handler).with_arg_schema(arg_schema),
        )
    }

    fn insert(mut self, name: &str, kind: MethodKind, handler: impl Handler) -> Self {
        if self.error.is_some() {
            return self;
        }

        if name.is_empty() || name.contains('.') {
            self.error = Some(RpcError::InvalidMethodName(name.to_string()));
            return self;
        }

        if self.methods.contains_key(name) {
            self.error = Some(RpcError::DuplicateMethod {
                protocol: self.name.clone(),
                method: name.to_string(),
            });
            return self;
        }

        self.methods.insert(
            name.to_string(),
            MethodEntry {
                handler: Arc::new(handler),
                kind,
            },
        );
        self
    }

    /// Finish the protocol, failing on the first registration error.
    pub fn build(self) -> Result<Protocol> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.name.is_empty() {
            return Err(RpcError::InvalidProtocolName(self.name));
        }

        Ok(Protocol {
            name: self.name,
            methods: self.methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_protocol() -> Protocol {
        Protocol::builder("test.1.echo")
            .method("echo", MethodKind::Call, |_ctx, data: String| async move {
                Ok(data)
            })
            .method("ping", MethodKind::Notify, |_ctx, _: ()| async { Ok(()) })
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_methods() {
        let protocol = echo_protocol();

        assert_eq!(protocol.name(), "test.1.echo");
        assert_eq!(protocol.method_names(), vec!["echo", "ping"]);
        assert_eq!(protocol.method_kind("echo"), Some(MethodKind::Call));
        assert_eq!(protocol.method_kind("ping"), Some(MethodKind::Notify));
        assert!(protocol.method("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_method_fails_build() {
        let result = Protocol::builder("test.1.dup")
            .method("a", MethodKind::Call, |_ctx, _: ()| async { Ok(()) })
            .method("a", MethodKind::Notify, |_ctx, _: ()| async { Ok(()) })
            .build();

        match result {
            Err(RpcError::DuplicateMethod { protocol, method }) => {
                assert_eq!(protocol, "test.1.dup");
                assert_eq!(method, "a");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_dotted_method_name_rejected() {
        let result = Protocol::builder("test.1.bad")
            .method("a.b", MethodKind::Call, |_ctx, _: ()| async { Ok(()) })
            .build();

        assert!(matches!(result, Err(RpcError::InvalidMethodName(n)) if n == "a.b"));
    }

    #[test]
    fn test_empty_protocol_name_rejected() {
        let result = Protocol::builder("")
            .method("a", MethodKind::Call, |_ctx, _: ()| async { Ok(()) })
            .build();

        assert!(matches!(result, Err(RpcError::InvalidProtocolName(n)) if n.is_empty()));
    }

    #[tokio::test]
    async fn test_typed_handler_roundtrip() {
        let protocol = echo_protocol();
        let handler = protocol.method("echo").unwrap().handler();

        let payload = Bytes::from(MsgPackCodec::encode_args(&"hi".to_string()).unwrap());
        let reply = handler.call(CallContext::new(), payload).await.unwrap();

        let decoded: String = MsgPackCodec::decode(&reply).unwrap();
        assert_eq!(decoded, "hi");
    }

    #[tokio::test]
    async fn test_typed_handler_type_error() {
        let protocol = echo_protocol();
        let handler = protocol.method("echo").unwrap().handler();

        let payload = Bytes::from(MsgPackCodec::encode_args(&42i32).unwrap());
        let err = handler.call(CallContext::new(), payload).await.unwrap_err();

        match err {
            RpcError::Type(e) => {
                assert!(e.expected.ends_with("String]"), "{}", e.expected);
                assert_eq!(e.actual, "[integer]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_schema_name_in_type_error() {
        let protocol = Protocol::builder("test.1.schema")
            .method_with_schema("greet", MethodKind::Call, "GreetArg", |_ctx, name: String| {
                async move { Ok(format!("hello {name}")) }
            })
            .build()
            .unwrap();
        let handler = protocol.method("greet").unwrap().handler();

        let payload = Bytes::from(MsgPackCodec::encode_args(&true).unwrap());
        let err = handler.call(CallContext::new(), payload).await.unwrap_err();

        match err {
            RpcError::Type(e) => {
                assert_eq!(e.expected, "[GreetArg]");
                assert_eq!(e.actual, "[bool]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_method_kind_display() {
        assert_eq!(MethodKind::Call.to_string(), "call");
        assert_eq!(MethodKind::Notify.to_string(), "notify");
    }
}
