//! MsgPack codec using `rmp-serde`.
//!
//! Always use `to_vec_named`, never `to_vec`: argument records travel as
//! maps keyed by their schema field names (`sessionID`, `deviceName`), not as
//! positional arrays.
//!
//! Argument records are wrapped as a one-element sequence on the wire. The
//! wrapping leaves room for positional arguments later without breaking
//! existing peers. [`MsgPackCodec::encode_args`] and
//! [`MsgPackCodec::decode_args`] own that convention.
//!
//! # Example
//!
//! ```
//! use keybase_rpc::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = MsgPackCodec::encode_args(&msg).unwrap();
//! let decoded: Message = MsgPackCodec::decode_args(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use serde::de::{self, DeserializeOwned};
use serde::Serialize;

use crate::error::{Result, TypeError};

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    #[inline]
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value. The value must span the whole input.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(from_slice_exact(bytes)?)
    }

    /// Encode an argument record as the sole element of a sequence.
    pub fn encode_args<A: Serialize>(arg: &A) -> Result<Vec<u8>> {
        Self::encode(&std::slice::from_ref(arg))
    }

    /// Decode a one-element argument sequence into `A`.
    ///
    /// Any shape mismatch (not a sequence, wrong arity, missing, unknown or
    /// mistyped fields, trailing bytes) is reported as a [`TypeError`] naming
    /// the expected type and describing what was actually received.
    pub fn decode_args<A: DeserializeOwned>(bytes: &[u8]) -> std::result::Result<A, TypeError> {
        match from_slice_exact::<Vec<A>>(bytes) {
            Ok(mut args) if args.len() == 1 => Ok(args.remove(0)),
            _ => Err(TypeError::new(
                expected_args::<A>(),
                describe_payload(bytes),
            )),
        }
    }
}

/// Like `rmp_serde::from_slice`, but input left over after the value is an
/// error.
fn from_slice_exact<T: DeserializeOwned>(
    bytes: &[u8],
) -> std::result::Result<T, rmp_serde::decode::Error> {
    let mut rest = bytes;
    let value = {
        let mut de = rmp_serde::Deserializer::new(&mut rest);
        T::deserialize(&mut de)?
    };
    if !rest.is_empty() {
        return Err(de::Error::custom(format!(
            "{} trailing bytes after value",
            rest.len()
        )));
    }
    Ok(value)
}

/// Fallback description of the wire shape `decode_args::<A>` accepts.
///
/// Built from the Rust type name, which is only meant for diagnostics;
/// protocols with a schema pass their own name through
/// [`ProtocolBuilder::method_with_schema`](crate::handler::ProtocolBuilder::method_with_schema).
pub fn expected_args<A>() -> String {
    format!("[{}]", std::any::type_name::<A>())
}

/// Describe the shape of a msgpack payload, e.g. `[{sessionID: integer}]`.
pub fn describe_payload(bytes: &[u8]) -> String {
    let mut rest = bytes;
    match rmpv::decode::read_value(&mut rest) {
        Ok(value) if rest.is_empty() => describe_value(&value),
        Ok(value) => format!(
            "{} followed by {} trailing bytes",
            describe_value(&value),
            rest.len()
        ),
        Err(e) => format!("undecodable msgpack ({e})"),
    }
}

fn describe_value(value: &rmpv::Value) -> String {
    use rmpv::Value;

    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(_) => "bool".to_string(),
        Value::Integer(_) => "integer".to_string(),
        Value::F32(_) | Value::F64(_) => "float".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Binary(_) => "bytes".to_string(),
        Value::Ext(tag, _) => format!("ext({tag})"),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(describe_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Map(entries) => {
            let mut inner: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", describe_key(k), describe_value(v)))
                .collect();
            inner.sort_unstable();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// String keys are shown by name, any other key by its type.
fn describe_key(key: &rmpv::Value) -> String {
    match key.as_str() {
        Some(name) => name.to_string(),
        None => describe_value(key),
    }
}
