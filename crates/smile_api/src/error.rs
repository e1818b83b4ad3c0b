use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to a Smile gateway.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to Smile at {host}: {source}")]
    ConnectionFailed {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timed out waiting for Smile at {host}")]
    Timeout { host: String },

    #[error("Smile rejected the supplied credentials")]
    InvalidAuthentication,

    #[error("Smile returned HTTP status {status}")]
    ResponseError { status: u16 },

    #[error("failed to parse Smile response: {0}")]
    InvalidXml(#[from] quick_xml::DeError),

    #[error("Smile response did not contain a gateway")]
    MissingGateway,

    #[error("unsupported Smile model '{0}'")]
    UnsupportedDevice(String),

    #[error("Smile client is not connected, call connect() first")]
    NotConnected,
}
