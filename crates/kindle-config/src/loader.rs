//! Assembles the application configuration from its sources.

use std::collections::BTreeMap;
use std::env;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};

use crate::error::ConfigurationError;
use crate::schema::{ConfigSchema, Configuration};
use crate::settings::KernelSettings;
use crate::template::{self, Parameters};

/// Produces a validated configuration for a schema.
pub trait ConfigurationLoader: Send + Sync {
    /// Loads and validates the configuration against `schema`.
    fn load(&self, schema: &ConfigSchema) -> Result<Configuration, ConfigurationError>;
}

/// Loader that validates a fixed, already-parsed document.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigurationLoader {
    document: Value,
}

impl StaticConfigurationLoader {
    /// Creates a loader over `document`.
    #[must_use]
    pub fn new(document: Value) -> Self {
        Self { document }
    }
}

impl ConfigurationLoader for StaticConfigurationLoader {
    fn load(&self, schema: &ConfigSchema) -> Result<Configuration, ConfigurationError> {
        Ok(schema.build(&self.document)?)
    }
}

/// Where parameter overrides from the environment come from.
#[derive(Debug, Clone, Default)]
enum EnvironmentSource {
    #[default]
    Process,
    Fixed(BTreeMap<String, String>),
}

impl EnvironmentSource {
    fn variables(&self) -> BTreeMap<String, String> {
        match self {
            Self::Process => env::vars().collect(),
            Self::Fixed(variables) => variables.clone(),
        }
    }
}

/// Loads a YAML configuration file with placeholders filled from a
/// parameters file and the environment.
///
/// Environment variables take precedence over the parameters file, which is
/// optional.
#[derive(Debug, Clone)]
pub struct YamlConfigurationLoader {
    config_path: Utf8PathBuf,
    parameters_path: Utf8PathBuf,
    environment: EnvironmentSource,
}

impl YamlConfigurationLoader {
    /// Creates a loader reading the process environment.
    pub fn new(config_path: impl Into<Utf8PathBuf>, parameters_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            parameters_path: parameters_path.into(),
            environment: EnvironmentSource::Process,
        }
    }

    /// Creates a loader from the paths in the kernel settings.
    #[must_use]
    pub fn from_settings(settings: &KernelSettings) -> Self {
        Self::new(settings.app_config(), settings.app_parameters())
    }

    /// Replaces the process environment with a fixed set of variables.
    #[must_use]
    pub fn with_environment<I, K, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment = EnvironmentSource::Fixed(
            variables
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    /// Path of the primary configuration file.
    #[must_use]
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Path of the parameters file.
    #[must_use]
    pub fn parameters_path(&self) -> &Utf8Path {
        &self.parameters_path
    }

    /// Reads the sources and returns the substituted document.
    pub fn document(&self) -> Result<Value, ConfigurationError> {
        let raw = read(&self.config_path)?;
        let mut parameters = self.file_parameters()?;
        parameters.extend(
            self.environment
                .variables()
                .into_iter()
                .map(|(key, value)| (key, template::render_scalar(&value))),
        );
        let substituted = template::substitute(&raw, &parameters)?;
        let document = parse_yaml(&self.config_path, &substituted)?;
        Ok(if document.is_null() {
            Value::Object(Map::new())
        } else {
            document
        })
    }

    fn file_parameters(&self) -> Result<Parameters, ConfigurationError> {
        if !self.parameters_path.is_file() {
            return Ok(Parameters::new());
        }
        let raw = read(&self.parameters_path)?;
        match parse_yaml(&self.parameters_path, &raw)? {
            Value::Null => Ok(Parameters::new()),
            Value::Object(entries) => Ok(entries
                .into_iter()
                .map(|(key, value)| (key, render_parameter(&value)))
                .collect()),
            _ => Err(ConfigurationError::ParametersNotMapping {
                path: self.parameters_path.clone(),
            }),
        }
    }
}

impl ConfigurationLoader for YamlConfigurationLoader {
    fn load(&self, schema: &ConfigSchema) -> Result<Configuration, ConfigurationError> {
        let document = self.document()?;
        Ok(schema.build(&document)?)
    }
}

fn render_parameter(value: &Value) -> String {
    match value {
        Value::String(text) => format!("'{}'", text.replace('\'', "''")),
        other => other.to_string(),
    }
}

fn read(path: &Utf8Path) -> Result<String, ConfigurationError> {
    fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_yaml(path: &Utf8Path, text: &str) -> Result<Value, ConfigurationError> {
    if is_blank_document(text) {
        return Ok(Value::Null);
    }
    serde_saphyr::from_str::<Value>(text).map_err(|error| ConfigurationError::Parse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

fn is_blank_document(text: &str) -> bool {
    text.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with('#') || trimmed == "---"
    })
}
