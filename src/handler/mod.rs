//! Handler module - protocol descriptors, registry and dispatch.
//!
//! Provides:
//! - [`Protocol`] - a named table of typed method handlers
//! - [`ProtocolRegistry`] - the frozen set of protocols a server answers
//! - [`Dispatcher`] - resolves and runs incoming invocations
//! - [`CallContext`] - cancellation, deadline and tags for one call
//!
//! # Example
//!
//! ```ignore
//! use keybase_rpc::handler::{CallContext, Dispatcher, IncomingCall, MethodKind, Protocol, ProtocolRegistry};
//!
//! let protocol = Protocol::builder("example.1.echo")
//!     .method("echo", MethodKind::Call, |_ctx, data: String| async move { Ok(data) })
//!     .build()?;
//!
//! let dispatcher = Dispatcher::new(ProtocolRegistry::builder().register(protocol)?.build());
//! let reply = dispatcher
//!     .dispatch(CallContext::new(), IncomingCall::call("example.1.echo.echo", payload))
//!     .await;
//! ```

mod context;
mod dispatch;
mod protocol;
mod registry;

pub use context::{CallContext, Tags};
pub use dispatch::{Dispatcher, IncomingCall};
pub use protocol::{
    BoxFuture, Handler, MethodEntry, MethodKind, Protocol, ProtocolBuilder, TypedHandler,
};
pub use registry::{method_name, split_method_name, ProtocolRegistry, RegistryBuilder};
