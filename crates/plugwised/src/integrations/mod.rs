#[cfg(feature = "integration_plugwise")]
pub mod plugwise;
