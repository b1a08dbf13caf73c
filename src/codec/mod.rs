//! Codec module - serialization of argument records, replies and errors.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`)
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the target type of every decode is fixed at compile time.

mod msgpack;

pub use msgpack::{describe_payload, expected_args, MsgPackCodec};
