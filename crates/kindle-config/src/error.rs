//! Error surface for application configuration loading and validation.

use std::fmt;
use std::io;

use camino::Utf8PathBuf;
use strum::{Display, EnumString};
use thiserror::Error;

/// Category of a single field validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FieldErrorKind {
    /// A required field or section was absent.
    Missing,
    /// The value had the wrong shape or type.
    TypeError,
    /// The value had the right type but was rejected.
    ValueError,
    /// The value carried a field the schema does not declare.
    UnknownField,
}

/// A single offending field, located by its path from the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    location: Vec<String>,
    message: String,
    kind: FieldErrorKind,
}

impl FieldError {
    /// Builds a field error from its location segments, message, and kind.
    pub fn new<I, S>(location: I, message: impl Into<String>, kind: FieldErrorKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            location: location.into_iter().map(Into::into).collect(),
            message: message.into(),
            kind,
        }
    }

    /// Shorthand for a rejected value on a single named field.
    pub fn value_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([field.into()], message, FieldErrorKind::ValueError)
    }

    /// Returns the same error nested below `segment`.
    #[must_use]
    pub fn prefixed(mut self, segment: &str) -> Self {
        self.location.insert(0, segment.to_owned());
        self
    }

    /// Location segments from the document root.
    #[must_use]
    pub fn location(&self) -> &[String] {
        &self.location
    }

    /// Dotted location, e.g. `database.port`.
    #[must_use]
    pub fn dotted_location(&self) -> String {
        self.location.join(".")
    }

    /// Human-readable description of the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Failure category.
    #[must_use]
    pub fn kind(&self) -> FieldErrorKind {
        self.kind
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}: {} (type={})",
            self.location.join(" -> "),
            self.message,
            self.kind
        )
    }
}

/// Aggregate of every field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration validation failed with {} error(s)", .errors.len())]
pub struct ValidationError {
    errors: Vec<FieldError>,
}

impl ValidationError {
    /// Wraps a non-empty list of field errors.
    #[must_use]
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// The offending fields in schema order.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// One line per offending field, suitable for printing before exit.
    #[must_use]
    pub fn report(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Errors surfaced while assembling the application configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A source file could not be read.
    #[error("failed to read configuration source '{path}': {source}")]
    Read {
        /// File that failed to load.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A source file was not valid YAML.
    #[error("failed to parse '{path}': {message}")]
    Parse {
        /// File that failed to parse.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// The parameters file did not contain a mapping.
    #[error("parameters file '{path}' must contain a mapping")]
    ParametersNotMapping {
        /// Offending parameters file.
        path: Utf8PathBuf,
    },
    /// The configuration referenced a parameter nobody supplied.
    #[error("configuration references undefined parameter '{name}'")]
    MissingParameter {
        /// Placeholder name.
        name: String,
    },
    /// A placeholder was malformed.
    #[error("invalid placeholder in configuration: {message}")]
    Template {
        /// Description of the problem.
        message: String,
    },
    /// One or more schema sections rejected the document.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
