//! Client for Plugwise Smile gateways.
//!
//! The Smile (P1, Anna, Adam) and the Stretch expose their full state as a single
//! XML document at `/core/domain_objects`. This crate fetches that document over
//! HTTP basic auth and reduces it to the small snapshot an integration needs:
//! gateway identity, firmware, and a flat map of devices with their readings.

mod error;
mod model;
mod smile;
mod xml;

pub use error::Error;
pub use error::Result;
pub use model::DeviceData;
pub use model::GatewayInfo;
pub use model::Snapshot;
pub use model::SmileType;
pub use model::THERMOSTAT_CLASSES;
pub use smile::Smile;
pub use smile::SmileConfig;
pub use smile::DEFAULT_PORT;
pub use smile::DEFAULT_TIMEOUT;
pub use smile::DEFAULT_USERNAME;
pub use xml::parse_domain_objects;
