use std::collections::HashSet;
use std::ops::Range;
use std::path::PathBuf;

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error as ThisError;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },
    NoPlugwiseEntries,
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Merge(MergeError),
    Validation(ValidationError),
}

/// Error type for merge conflicts
#[derive(Debug, Clone)]
pub struct MergeError {
    pub field_path: String,
    pub message: String,
    pub conflicts: Vec<MergeConflictLocation>,
}

#[derive(Debug, Clone)]
pub struct MergeConflictLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

/// Error type for validation failures
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub span: Option<Range<usize>>,
    pub source: Option<SourceInfo>,
}

/// Error type for config loading failures (parse errors, IO errors, etc.)
#[derive(Debug, ThisError)]
pub enum LoadError {
    #[error("Failed to read '{}': {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to parse '{}': {error}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    #[error("Import cycle detected at '{}': involves {} file(s)", path.display(), cycle.len())]
    ImportCycle { path: PathBuf, cycle: Vec<PathBuf> },
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                let warning_msg = format!(
                    "Warning: Config file '{}' is empty and has no effect\n",
                    file_path.display()
                );
                output.extend_from_slice(warning_msg.as_bytes());
            }
            Diagnostic::Warning(Warning::NoPlugwiseEntries) => {
                output.extend_from_slice(
                    b"Warning: No Plugwise entries configured, nothing will be polled\n",
                );
            }
            Diagnostic::Error(Error::Merge(merge_error)) => {
                write_merge_error(merge_error, &mut output);
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                write_validation_error(validation_error, &mut output);
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}

fn write_merge_error(merge_error: &MergeError, output: &mut Vec<u8>) {
    let Some(first_conflict) = merge_error.conflicts.first() else {
        return;
    };

    let mut report = Report::build(
        ReportKind::Error,
        (
            first_conflict.file_path.to_string_lossy().to_string(),
            first_conflict.span.clone(),
        ),
    )
    .with_message(format!("Merge conflict in field '{}'", merge_error.field_path))
    .with_note(&merge_error.message);

    for (idx, conflict) in merge_error.conflicts.iter().enumerate() {
        let label_msg = if idx == 0 {
            "first definition here"
        } else {
            "conflicts with this definition"
        };

        report = report.with_label(
            Label::new((
                conflict.file_path.to_string_lossy().to_string(),
                conflict.span.clone(),
            ))
            .with_message(label_msg)
            .with_color(if idx == 0 { Color::Red } else { Color::Yellow }),
        );
    }

    let finished_report = report.finish();

    // Write to each unique source file
    let mut written_files = HashSet::new();
    for conflict in &merge_error.conflicts {
        let file_id = conflict.file_path.to_string_lossy().to_string();
        if written_files.insert(file_id.clone()) {
            let source = Source::from(&conflict.content);
            finished_report.write((file_id, source), &mut *output).ok();
        }
    }
}

fn write_validation_error(validation_error: &ValidationError, output: &mut Vec<u8>) {
    let (Some(span), Some(source)) = (&validation_error.span, &validation_error.source) else {
        let error_msg = format!(
            "Validation error in '{}': {}\n",
            validation_error.field_path, validation_error.message
        );
        output.extend_from_slice(error_msg.as_bytes());
        return;
    };

    let file_id = source.file_path.to_string_lossy().to_string();
    Report::build(ReportKind::Error, (file_id.clone(), span.clone()))
        .with_message(format!(
            "Validation error in '{}'",
            validation_error.field_path
        ))
        .with_label(
            Label::new((file_id.clone(), span.clone()))
                .with_message(&validation_error.message)
                .with_color(Color::Red),
        )
        .finish()
        .write((file_id, Source::from(&source.content)), &mut *output)
        .ok();
}
