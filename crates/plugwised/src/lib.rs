pub mod api;
pub mod config;
mod engine;
mod integrations;

pub use config::Config;
pub use config::Diagnostic;
pub use config::LogLevel;
pub use config::format_diagnostics;
pub use engine::ConfigEntryState;
pub use engine::Device;
pub use engine::Engine;
pub use engine::ServiceError;
pub use engine::State;
