use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::diagnostics::{
    Diagnostic, Error, LoadError, MergeConflictLocation, MergeError, SourceInfo, Warning,
};
use super::LogLevel;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub api: Option<PartialApiConfig>,
    pub integrations: Option<PartialIntegrationsConfig>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialLoggingConfig {
    pub level: Option<toml::Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, toml::Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialApiConfig {
    pub listen: Option<toml::Spanned<String>>,
    pub port: Option<toml::Spanned<u16>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialIntegrationsConfig {
    pub plugwise: Option<PartialPlugwiseConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialPlugwiseConfig {
    #[serde(default)]
    pub entries: HashMap<String, PartialPlugwiseEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialPlugwiseEntry {
    pub title: Option<String>,
    pub host: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Seconds between polls
    pub scan_interval: Option<u64>,
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Each config file is loaded, then its imports are recursively processed.
    /// Cycle detection prevents infinite loops.
    ///
    /// Returns a Vec of all loaded configs in order (imports first, then parent)
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    /// Recursively load a config file and its imports
    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        // Canonicalize the path to detect cycles reliably
        let canonical_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        // Process imports first (depth-first)
        for import_path in &config.imports {
            let import_path_buf = PathBuf::from(import_path);

            // Resolve relative imports from the parent file's directory
            let resolved_path = if import_path_buf.is_absolute() {
                import_path_buf
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path_buf)
            };

            Self::load_recursive(&resolved_path, visited, configs)?;
        }

        configs.push(config);

        // Remove from visited set to allow imports from sibling branches
        visited.remove(&canonical_path);

        Ok(())
    }

    /// Merge multiple partial configs together
    ///
    /// Uses first-wins semantics: the first occurrence of a field is kept.
    /// Conflicts (same field defined in multiple configs) are collected as errors
    /// but merging continues to find all conflicts at once (compiler-style error collection).
    ///
    /// Returns (merged, diagnostics) where diagnostics may contain warnings and errors
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut merger = Merger::default();
        let mut result = PartialConfig::default();
        let mut imports = Vec::new();

        for config in configs {
            imports.extend(config.imports.clone());

            let source_info = config.source.as_ref().cloned().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            let is_empty = config.logging.is_none()
                && config.api.is_none()
                && config.integrations.is_none()
                && config.imports.is_empty();

            if is_empty {
                merger.diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                    file_path: source_info.file_path.clone(),
                }));
            }

            if let Some(logging) = config.logging {
                let result_logging = result.logging.get_or_insert_with(Default::default);

                if let Some(level) = logging.level {
                    let span = level.span();
                    merger.first_wins(
                        &mut result_logging.level,
                        level,
                        "logging.level".to_string(),
                        "Logging level defined in multiple config files".to_string(),
                        &source_info,
                        span,
                    );
                }

                if let Some(overrides) = logging.overrides {
                    let result_overrides =
                        result_logging.overrides.get_or_insert_with(HashMap::new);
                    for (key, value) in overrides {
                        let field_path = format!("logging.overrides.{}", key);
                        let message = format!(
                            "Logging override for '{}' defined in multiple config files",
                            key
                        );
                        let span = value.span();
                        merger.first_wins_keyed(
                            result_overrides,
                            key,
                            value,
                            field_path,
                            message,
                            &source_info,
                            span,
                        );
                    }
                }
            }

            if let Some(api) = config.api {
                let result_api = result.api.get_or_insert_with(Default::default);

                if let Some(listen) = api.listen {
                    let span = listen.span();
                    merger.first_wins(
                        &mut result_api.listen,
                        listen,
                        "api.listen".to_string(),
                        "API listen address defined in multiple config files".to_string(),
                        &source_info,
                        span,
                    );
                }

                if let Some(port) = api.port {
                    let span = port.span();
                    merger.first_wins(
                        &mut result_api.port,
                        port,
                        "api.port".to_string(),
                        "API port defined in multiple config files".to_string(),
                        &source_info,
                        span,
                    );
                }
            }

            if let Some(plugwise) = config.integrations.and_then(|i| i.plugwise) {
                let result_plugwise = result
                    .integrations
                    .get_or_insert_with(Default::default)
                    .plugwise
                    .get_or_insert_with(Default::default);

                for (entry_id, entry) in plugwise.entries {
                    // Find the span of the entry table in the source
                    let header = format!("[integrations.plugwise.entries.{}]", entry_id);
                    let span = source_info
                        .content
                        .find(&header)
                        .map(|start| start..(start + header.len()))
                        .unwrap_or(0..0);

                    let field_path = format!("integrations.plugwise.entries.{}", entry_id);
                    let message = format!(
                        "Plugwise entry '{}' defined in multiple config files",
                        entry_id
                    );
                    merger.first_wins_keyed(
                        &mut result_plugwise.entries,
                        entry_id,
                        entry,
                        field_path,
                        message,
                        &source_info,
                        span,
                    );
                }
            }
        }

        result.imports = imports;

        (result, merger.diagnostics)
    }
}

/// Tracks where each merged field was first defined so later definitions can be reported.
#[derive(Default)]
struct Merger {
    first_seen: HashMap<String, MergeConflictLocation>,
    diagnostics: Vec<Diagnostic>,
}

impl Merger {
    /// Record a definition of `field_path`. Returns true if it is the first one.
    fn claim(
        &mut self,
        field_path: String,
        message: String,
        source_info: &SourceInfo,
        span: Range<usize>,
    ) -> bool {
        let location = MergeConflictLocation {
            file_path: source_info.file_path.clone(),
            span,
            content: source_info.content.clone(),
        };

        if let Some(prev) = self.first_seen.get(&field_path) {
            self.diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                field_path,
                message,
                conflicts: vec![prev.clone(), location],
            })));
            false
        } else {
            self.first_seen.insert(field_path, location);
            true
        }
    }

    fn first_wins<T>(
        &mut self,
        slot: &mut Option<T>,
        value: T,
        field_path: String,
        message: String,
        source_info: &SourceInfo,
        span: Range<usize>,
    ) {
        if self.claim(field_path, message, source_info, span) {
            *slot = Some(value);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn first_wins_keyed<T>(
        &mut self,
        map: &mut HashMap<String, T>,
        key: String,
        value: T,
        field_path: String,
        message: String,
        source_info: &SourceInfo,
        span: Range<usize>,
    ) {
        if self.claim(field_path, message, source_info, span) {
            map.insert(key, value);
        }
    }
}
