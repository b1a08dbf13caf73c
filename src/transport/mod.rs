//! Transport module - ways to move invocations between a client and a
//! dispatcher.
//!
//! The core only needs [`GenericClient`](crate::client::GenericClient) on the
//! client side and [`Dispatcher`](crate::handler::Dispatcher) on the server
//! side. Socket transports with their own framing plug in at those two
//! seams. This crate ships the in-process loopback.

pub mod loopback;

pub use loopback::{connect, spawn, LoopbackClient, LoopbackServer};
