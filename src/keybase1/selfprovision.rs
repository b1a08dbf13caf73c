//! Binding for the `keybase.1.selfprovision` protocol.
//!
//! Schema: `avdl/keybase1/selfprovision.avdl`. Keep the wire names below in
//! step with the schema; changing them needs a protocol version bump.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::error::Result;
use crate::handler::{BoxFuture, CallContext, MethodKind, Protocol};

/// Protocol name.
pub const SELFPROVISION_PROTOCOL: &str = "keybase.1.selfprovision";

/// Wire name of `selfProvision`.
pub const SELF_PROVISION_METHOD: &str = "keybase.1.selfprovision.selfProvision";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfProvisionArg {
    #[serde(rename = "sessionID")]
    pub session_id: i64,
    #[serde(rename = "deviceName")]
    pub device_name: String,
}

pub trait SelfprovisionInterface: Send + Sync + 'static {
    /// Provision the current device as a new device when it is a clone.
    fn self_provision<'a>(
        &'a self,
        ctx: CallContext,
        arg: SelfProvisionArg,
    ) -> BoxFuture<'a, Result<()>>;
}

pub fn selfprovision_protocol<I: SelfprovisionInterface>(i: Arc<I>) -> Result<Protocol> {
    Protocol::builder(SELFPROVISION_PROTOCOL)
        .method_with_schema(
            "selfProvision",
            MethodKind::Call,
            "SelfProvisionArg",
            move |ctx, arg: SelfProvisionArg| {
                let i = i.clone();
                async move { i.self_provision(ctx, arg).await }
            },
        )
        .build()
}

#[derive(Debug, Clone)]
pub struct SelfprovisionClient {
    pub cli: Client,
}

impl SelfprovisionClient {
    pub fn new(cli: Client) -> Self {
        Self { cli }
    }

    /// Provision the current device as a new device when it is a clone.
    pub async fn self_provision(&self, ctx: &CallContext, arg: &SelfProvisionArg) -> Result<()> {
        self.cli.call(ctx, SELF_PROVISION_METHOD, arg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;
    use crate::handler::method_name;

    struct Noop;

    impl SelfprovisionInterface for Noop {
        fn self_provision<'a>(
            &'a self,
            _ctx: CallContext,
            _arg: SelfProvisionArg,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            method_name(SELFPROVISION_PROTOCOL, "selfProvision"),
            SELF_PROVISION_METHOD
        );
    }

    #[test]
    fn test_protocol_table() {
        let protocol = selfprovision_protocol(Arc::new(Noop)).unwrap();

        assert_eq!(protocol.name(), "keybase.1.selfprovision");
        assert_eq!(protocol.method_names(), vec!["selfProvision"]);
        assert_eq!(protocol.method_kind("selfProvision"), Some(MethodKind::Call));
    }

    #[test]
    fn test_arg_uses_schema_field_names() {
        let arg = SelfProvisionArg {
            session_id: 42,
            device_name: "laptop".to_string(),
        };

        let encoded = MsgPackCodec::encode_args(&arg).unwrap();
        assert_eq!(
            crate::codec::describe_payload(&encoded),
            "[{deviceName: string, sessionID: integer}]"
        );

        let decoded: SelfProvisionArg = MsgPackCodec::decode_args(&encoded).unwrap();
        assert_eq!(decoded, arg);
    }
}
