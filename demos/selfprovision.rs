//! Self-provision demo - one server, one client, in one process.
//!
//! This demo shows:
//! - Implementing a protocol interface and registering it
//! - Serving it over the loopback transport
//! - Calling it through the typed client stub, including an error reply
//!
//! ```text
//! RUST_LOG=debug cargo run --example selfprovision
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use keybase_rpc::handler::{BoxFuture, Dispatcher, ProtocolRegistry};
use keybase_rpc::keybase1::{
    selfprovision_protocol, SelfProvisionArg, SelfprovisionClient, SelfprovisionInterface,
};
use keybase_rpc::{transport, AppError, CallContext, ConnectionConfig, Result, RpcError};
use tracing_subscriber::{fmt, EnvFilter};

/// Accepts each device name once.
#[derive(Default)]
struct Provisioner {
    devices: Mutex<HashSet<String>>,
}

impl SelfprovisionInterface for Provisioner {
    fn self_provision<'a>(
        &'a self,
        _ctx: CallContext,
        arg: SelfProvisionArg,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            if !devices.insert(arg.device_name.clone()) {
                return Err(RpcError::from(AppError::new(
                    1403,
                    "SCDeviceNameInUse",
                    "device name already in use",
                )));
            }
            tracing::info!(session_id = arg.session_id, device = %arg.device_name, "provisioned");
            Ok(())
        })
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let config = ConnectionConfig::from_env()?;

    let registry = ProtocolRegistry::builder()
        .register(selfprovision_protocol(Arc::new(Provisioner::default()))?)?
        .build();
    let (client, _server) = transport::spawn(Dispatcher::new(registry), &config);
    let cli = SelfprovisionClient::new(client);

    let arg = SelfProvisionArg {
        session_id: 42,
        device_name: "laptop".to_string(),
    };

    cli.self_provision(&CallContext::new(), &arg).await?;

    match cli.self_provision(&CallContext::new(), &arg).await {
        Ok(()) => tracing::warn!("second provision unexpectedly succeeded"),
        Err(e) => tracing::info!(error = %e, "second provision refused"),
    }

    Ok(())
}
