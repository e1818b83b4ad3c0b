use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::model::DeviceData;
use crate::model::GatewayInfo;
use crate::model::SmileType;
use crate::model::Snapshot;
use crate::xml::parse_domain_objects;
use crate::Error;
use crate::Result;

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_USERNAME: &str = "smile";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const DOMAIN_OBJECTS_ENDPOINT: &str = "/core/domain_objects";

/// Connection settings for a single gateway.
#[derive(Debug, Clone)]
pub struct SmileConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl SmileConfig {
    pub fn new(host: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// HTTP client for one Smile gateway.
///
/// The latest snapshot is kept behind a lock so readers can inspect device state
/// synchronously between refreshes.
pub struct Smile {
    config: SmileConfig,
    http: reqwest::Client,
    snapshot: RwLock<Option<Snapshot>>,
}

impl Smile {
    pub fn new(config: SmileConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| Error::ConnectionFailed {
                host: config.host.clone(),
                source,
            })?;

        Ok(Self {
            config,
            http,
            snapshot: RwLock::new(None),
        })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Fetch the gateway document once and verify the gateway is supported.
    pub async fn connect(&self) -> Result<()> {
        self.full_update_device().await?;
        if let Some(gateway) = self.gateway() {
            debug!(
                "Connected to Smile {} ({}) at {}, firmware {}",
                gateway.smile_name, gateway.id, self.config.host, gateway.firmware_version
            );
        }
        Ok(())
    }

    /// Re-fetch the full device state.
    pub async fn full_update_device(&self) -> Result<()> {
        let body = self.request(DOMAIN_OBJECTS_ENDPOINT).await?;
        let snapshot = parse_domain_objects(&body)?;
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        Ok(())
    }

    async fn request(&self, endpoint: &str) -> Result<String> {
        let url = format!(
            "http://{}:{}{}",
            self.config.host, self.config.port, endpoint
        );

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(Error::InvalidAuthentication),
            status if !status.is_success() => {
                return Err(Error::ResponseError {
                    status: status.as_u16(),
                })
            }
            _ => {}
        }

        response.text().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, source: reqwest::Error) -> Error {
        if source.is_timeout() {
            Error::Timeout {
                host: self.config.host.clone(),
            }
        } else {
            Error::ConnectionFailed {
                host: self.config.host.clone(),
                source,
            }
        }
    }

    fn with_snapshot<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> Option<T> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(f)
    }

    pub fn gateway(&self) -> Option<GatewayInfo> {
        self.with_snapshot(|s| s.gateway.clone())
    }

    fn connected_gateway(&self) -> Result<GatewayInfo> {
        self.gateway().ok_or(Error::NotConnected)
    }

    pub fn gateway_id(&self) -> Result<String> {
        Ok(self.connected_gateway()?.id)
    }

    pub fn smile_type(&self) -> Result<SmileType> {
        Ok(self.connected_gateway()?.smile_type)
    }

    pub fn smile_name(&self) -> Result<String> {
        Ok(self.connected_gateway()?.smile_name)
    }

    pub fn smile_version(&self) -> Result<String> {
        Ok(self.connected_gateway()?.firmware_version)
    }

    pub fn devices(&self) -> Vec<DeviceData> {
        self.with_snapshot(|s| s.devices.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn device(&self, id: &str) -> Option<DeviceData> {
        self.with_snapshot(|s| s.devices.get(id).cloned()).flatten()
    }

    pub fn single_master_thermostat(&self) -> Option<bool> {
        self.with_snapshot(Snapshot::single_master_thermostat)
            .flatten()
    }
}
