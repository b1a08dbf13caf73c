//! Protocol bindings for the `keybase.1` namespace.

pub mod selfprovision;

pub use selfprovision::{
    selfprovision_protocol, SelfProvisionArg, SelfprovisionClient, SelfprovisionInterface,
    SELFPROVISION_PROTOCOL, SELF_PROVISION_METHOD,
};
