//! Protocol registry: the set of protocols served by one server.
//!
//! The registry is filled once through [`RegistryBuilder`] and is read-only
//! afterwards; dispatchers share it behind an `Arc`.
//!
//! # Example
//!
//! ```ignore
//! let registry = ProtocolRegistry::builder()
//!     .register(selfprovision_protocol(Arc::new(MyProvisioner))?)?
//!     .build();
//!
//! let entry = registry.resolve("keybase.1.selfprovision.selfProvision")?;
//! ```

use std::collections::HashMap;

use super::{MethodEntry, Protocol};
use crate::error::{Result, RpcError};

/// Build the wire name `<protocol>.<method>`.
pub fn method_name(protocol: &str, method: &str) -> String {
    format!("{protocol}.{method}")
}

/// Split a wire method name at its last `.` into (protocol, method).
pub fn split_method_name(full: &str) -> Result<(&str, &str)> {
    match full.rsplit_once('.') {
        Some((protocol, method)) if !protocol.is_empty() && !method.is_empty() => {
            Ok((protocol, method))
        }
        _ => Err(RpcError::InvalidMethodName(full.to_string())),
    }
}

/// Immutable protocol table keyed by protocol name.
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    protocols: HashMap<String, Protocol>,
}

impl ProtocolRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Get a protocol by name.
    pub fn get(&self, name: &str) -> Option<&Protocol> {
        self.protocols.get(name)
    }

    /// Registered protocol names, sorted.
    pub fn protocol_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.protocols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Resolve a wire method name to its entry.
    ///
    /// Fails with `ProtocolNotFound` when the protocol part is unknown and
    /// with `MethodNotFound` when only the method is.
    pub fn resolve(&self, full_method: &str) -> Result<&MethodEntry> {
        let (protocol_name, method) = split_method_name(full_method)?;

        let protocol = self
            .protocols
            .get(protocol_name)
            .ok_or_else(|| RpcError::ProtocolNotFound(protocol_name.to_string()))?;

        protocol
            .method(method)
            .ok_or_else(|| RpcError::MethodNotFound {
                protocol: protocol_name.to_string(),
                method: method.to_string(),
            })
    }
}

/// Builder for [`ProtocolRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    protocols: HashMap<String, Protocol>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a protocol. A name that is already registered is rejected.
    pub fn register(mut self, protocol: Protocol) -> Result<Self> {
        if self.protocols.contains_key(protocol.name()) {
            return Err(RpcError::DuplicateProtocol(protocol.name().to_string()));
        }
        self.protocols.insert(protocol.name().to_string(), protocol);
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> ProtocolRegistry {
        ProtocolRegistry {
            protocols: self.protocols,
        }
    }
}
