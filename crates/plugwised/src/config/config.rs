use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use super::diagnostics::format_diagnostics;
use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::SourceInfo;
use super::diagnostics::ValidationError;
use super::diagnostics::Warning;
use super::partial::PartialApiConfig;
use super::partial::PartialConfig;
use super::partial::PartialPlugwiseEntry;

pub const DEFAULT_API_LISTEN: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 8565;
pub const DEFAULT_PLUGWISE_TITLE: &str = "Smile";
pub const DEFAULT_PLUGWISE_PORT: u16 = 80;
pub const DEFAULT_PLUGWISE_USERNAME: &str = "smile";

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub integrations: IntegrationsConfig,
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"plugwised::integrations::plugwise" = "debug"`
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the `EnvFilter` directives for this config: the global level followed by each
    /// override, sorted by target.
    pub fn directives(&self) -> String {
        let mut overrides: Vec<_> = self.overrides.iter().collect();
        overrides.sort();

        std::iter::once(LevelFilter::from(self.level).to_string().to_lowercase())
            .chain(overrides.into_iter().map(|(target, level)| {
                format!(
                    "{}={}",
                    target,
                    LevelFilter::from(*level).to_string().to_lowercase()
                )
            }))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn env_filter(&self) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
        EnvFilter::try_new(self.directives())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub listen: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_API_LISTEN.to_string(),
            port: DEFAULT_API_PORT,
        }
    }
}

#[derive(Debug, Default)]
pub struct IntegrationsConfig {
    pub plugwise: Option<PlugwiseConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct PlugwiseConfig {
    /// Config entries keyed by entry id
    pub entries: BTreeMap<String, PlugwiseEntryConfig>,
}

/// Connection settings for one Smile gateway
#[derive(Debug, Clone, PartialEq)]
pub struct PlugwiseEntryConfig {
    pub title: String,
    pub host: String,
    pub password: String,
    pub port: u16,
    /// `smile` for P1 and Anna/Adam gateways. Stretch gateways log in as `stretch`, which has
    /// to be set explicitly.
    pub username: String,
    /// Overrides the polling interval chosen from the gateway type
    pub scan_interval: Option<Duration>,
}

impl Config {
    /// Load configuration from multiple TOML files with import resolution
    ///
    /// Supports multiple config files (e.g. base + secrets), import statements within config
    /// files, conflict detection across all sources, and validation with all errors and warnings
    /// reported together.
    ///
    /// Returns Ok((Config, diagnostics)) where diagnostics contains warnings.
    /// Only returns Err if there are actual errors (not just warnings).
    pub fn from_files(
        paths: &[PathBuf],
    ) -> Result<(Self, Vec<Diagnostic>), Box<dyn std::error::Error>> {
        let configs = PartialConfig::load_with_imports(paths)?;

        // Merge with first-wins semantics, collecting diagnostics
        let (partial, diagnostics) = PartialConfig::merge(configs);

        Self::from_partial(partial, diagnostics)
    }

    /// Convert a PartialConfig to a Config, validating all fields
    ///
    /// Takes diagnostics from the merge step and adds validation diagnostics.
    /// Returns Ok((Config, diagnostics)) if no errors, Err if there are errors.
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), Box<dyn std::error::Error>> {
        let logging = if let Some(partial_logging) = partial.logging {
            LoggingConfig {
                level: partial_logging
                    .level
                    .map(|s| *s.get_ref())
                    .unwrap_or_default(),
                overrides: partial_logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, *v.get_ref())).collect())
                    .unwrap_or_default(),
            }
        } else {
            LoggingConfig::default()
        };

        let api = partial.api.map(Self::api_from_partial).unwrap_or_default();

        let plugwise = partial
            .integrations
            .and_then(|i| i.plugwise)
            .map(|partial_plugwise| {
                let mut entries = BTreeMap::new();
                for (entry_id, partial_entry) in partial_plugwise.entries {
                    match Self::validate_plugwise_entry(&entry_id, partial_entry, &partial.source)
                    {
                        Ok(entry) => {
                            entries.insert(entry_id, entry);
                        }
                        Err(errors) => {
                            diagnostics.extend(
                                errors
                                    .into_iter()
                                    .map(|e| Diagnostic::Error(Error::Validation(e))),
                            );
                        }
                    }
                }
                PlugwiseConfig { entries }
            });

        if plugwise.as_ref().is_some_and(|p| p.entries.is_empty())
            && !diagnostics.iter().any(|d| d.is_error())
        {
            diagnostics.push(Diagnostic::Warning(Warning::NoPlugwiseEntries));
        }

        let config = Config {
            logging,
            api,
            integrations: IntegrationsConfig { plugwise },
        };

        let has_errors = diagnostics.iter().any(|d| d.is_error());

        if has_errors {
            Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format_diagnostics(&diagnostics),
            )))
        } else {
            Ok((config, diagnostics))
        }
    }

    fn api_from_partial(partial: PartialApiConfig) -> ApiConfig {
        let defaults = ApiConfig::default();
        ApiConfig {
            listen: partial
                .listen
                .map(|s| s.into_inner())
                .unwrap_or(defaults.listen),
            port: partial.port.map(|s| s.into_inner()).unwrap_or(defaults.port),
        }
    }

    /// Validate a partial Plugwise entry and convert it to a complete entry config
    fn validate_plugwise_entry(
        entry_id: &str,
        partial: PartialPlugwiseEntry,
        source: &Option<SourceInfo>,
    ) -> Result<PlugwiseEntryConfig, Vec<ValidationError>> {
        let mut errors = Vec::new();

        // Point diagnostics at the entry's table header when it can be found
        let header = format!("[integrations.plugwise.entries.{}]", entry_id);
        let span = source
            .as_ref()
            .and_then(|s| s.content.find(&header))
            .map(|start| start..(start + header.len()));
        let error = |field: &str, message: &str| ValidationError {
            field_path: format!("integrations.plugwise.entries.{}.{}", entry_id, field),
            message: message.to_string(),
            span: span.clone(),
            source: span.as_ref().and(source.clone()),
        };

        let host = match partial.host {
            Some(host) if !host.trim().is_empty() => host,
            Some(_) => {
                errors.push(error("host", "host must not be empty"));
                String::new()
            }
            None => {
                errors.push(error("host", "host is required"));
                String::new()
            }
        };

        let password = partial.password.unwrap_or_else(|| {
            errors.push(error("password", "password is required"));
            String::new()
        });

        let scan_interval = match partial.scan_interval {
            Some(0) => {
                errors.push(error("scan_interval", "scan_interval must be at least 1 second"));
                None
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(PlugwiseEntryConfig {
            title: partial
                .title
                .unwrap_or_else(|| DEFAULT_PLUGWISE_TITLE.to_string()),
            host,
            password,
            port: partial.port.unwrap_or(DEFAULT_PLUGWISE_PORT),
            username: partial
                .username
                .unwrap_or_else(|| DEFAULT_PLUGWISE_USERNAME.to_string()),
            scan_interval,
        })
    }
}
