//! # keybase-rpc
//!
//! Protocol registry, typed dispatch and client stubs for framed msgpack RPC,
//! plus the `keybase.1.selfprovision` binding.
//!
//! ## Architecture
//!
//! - **Protocols** ([`handler::Protocol`]): named tables of typed handlers,
//!   built once and frozen into a [`handler::ProtocolRegistry`]
//! - **Dispatch** ([`handler::Dispatcher`]): resolves `<protocol>.<method>`,
//!   decodes the one-element argument sequence, runs the handler on its own
//!   task and encodes the reply
//! - **Client** ([`Client`]): encodes arguments, calls through any
//!   [`GenericClient`] transport and decodes the reply or error
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use keybase_rpc::handler::{Dispatcher, ProtocolRegistry};
//! use keybase_rpc::keybase1::{selfprovision_protocol, SelfProvisionArg, SelfprovisionClient};
//! use keybase_rpc::{transport, CallContext, ConnectionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ProtocolRegistry::builder()
//!         .register(selfprovision_protocol(Arc::new(MyProvisioner))?)?
//!         .build();
//!
//!     let (client, _server) = transport::spawn(Dispatcher::new(registry), &ConnectionConfig::default());
//!     let cli = SelfprovisionClient::new(client);
//!
//!     cli.self_provision(
//!         &CallContext::new(),
//!         &SelfProvisionArg { session_id: 42, device_name: "laptop".into() },
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod keybase1;
pub mod transport;

mod client;

pub use client::{CallState, Client, GenericClient, InvalidTransition};
pub use config::{ConfigError, ConnectionConfig};
pub use error::{AppError, Result, RpcError, TypeError, WireError};
pub use handler::CallContext;
