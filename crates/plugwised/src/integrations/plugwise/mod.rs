mod client;
mod data;
mod entity;
mod entry;
mod platforms;
// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod plugwise;
mod updater;

use linkme::distributed_slice;
pub use plugwise::PlugwiseIntegration;

use crate::engine;

/// Integration domain, also the storage key for per-entry data
pub const DOMAIN: &str = "plugwise";

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_plugwise(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let plugwise_config = if let Some(c) = &ctx.config.integrations.plugwise {
        c
    } else {
        return Ok(None);
    };

    Ok(Some(Box::new(PlugwiseIntegration::new(plugwise_config))))
}
