//! Schema fragments contributed by bundles and the validated configuration
//! object they produce.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use serde_path_to_error::Segment;

use crate::error::{FieldError, FieldErrorKind, ValidationError};

/// A validated section value, stored type-erased until a bundle asks for it.
pub type SectionValue = Arc<dyn Any + Send + Sync>;

/// Post-deserialisation checks for a configuration section.
///
/// Implementations may reject a value or return a normalised copy of it.
/// Locations in returned errors are relative to the section root.
pub trait Validate: Sized {
    /// Checks and optionally normalises the deserialised value.
    fn validate(self) -> Result<Self, Vec<FieldError>> {
        Ok(self)
    }
}

/// A schema fragment responsible for one top-level configuration key.
pub trait ConfigSection: Send + Sync {
    /// Builds the section from the raw value found under its key, if any.
    ///
    /// Errors carry locations relative to the section root; the schema
    /// prefixes them with the key.
    fn build(&self, value: Option<&Value>) -> Result<SectionValue, Vec<FieldError>>;
}

/// Adapter deserialising a key into `T` and running its [`Validate`] hook.
pub struct Section<T> {
    marker: PhantomData<fn() -> T>,
}

impl<T> Section<T> {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Section<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Section")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> ConfigSection for Section<T>
where
    T: DeserializeOwned + Validate + Send + Sync + 'static,
{
    fn build(&self, value: Option<&Value>) -> Result<SectionValue, Vec<FieldError>> {
        let Some(value) = value.filter(|value| !value.is_null()) else {
            return Err(vec![FieldError::new(
                Vec::<String>::new(),
                "field required",
                FieldErrorKind::Missing,
            )]);
        };
        let parsed: T = deserialize_section(value)?;
        let validated = parsed.validate()?;
        Ok(Arc::new(validated))
    }
}

const MAX_ATTEMPTS: usize = 256;

/// Deserialises `value` into `T`, reporting every offending field.
///
/// Serde stops at the first error, so each fault is recorded and patched over
/// with a stand-in value before the next attempt. Faults raised inside a
/// stand-in belong to the stand-in and are never reported.
fn deserialize_section<T: DeserializeOwned>(value: &Value) -> Result<T, Vec<FieldError>> {
    let mut document = value.clone();
    let mut faults: Vec<FieldError> = Vec::new();
    let mut patches: Vec<Patch> = Vec::new();

    for _ in 0..MAX_ATTEMPTS {
        let fault = match serde_path_to_error::deserialize::<_, T>(&document) {
            Ok(parsed) if faults.is_empty() => return Ok(parsed),
            Ok(_) => break,
            Err(error) => locate(&error),
        };
        let applied =
            if let Some(patch) = patches.iter_mut().find(|patch| patch.location == fault.location()) {
                patch.attempt += 1;
                patch.apply(&mut document)
            } else {
                let patch = Patch::new(&fault);
                if !patches
                    .iter()
                    .any(|earlier| fault.location().starts_with(&earlier.location))
                {
                    faults.push(fault);
                }
                let applied = patch.apply(&mut document);
                patches.push(patch);
                applied
            };
        if applied.is_none() {
            break;
        }
    }
    // The first failed attempt always records a fault.
    Err(faults)
}

fn locate(error: &serde_path_to_error::Error<serde_json::Error>) -> FieldError {
    let mut location: Vec<String> = error
        .path()
        .iter()
        .map(|segment| match segment {
            Segment::Seq { index } => index.to_string(),
            other => other.to_string(),
        })
        .collect();
    let message = error.inner().to_string();
    let (message, kind) = if let Some(field) = backticked_after(&message, "missing field ") {
        location.push(field.to_owned());
        ("field required".to_owned(), FieldErrorKind::Missing)
    } else if let Some(field) = backticked_after(&message, "unknown field ") {
        // Unknown keys are already on the path; missing ones never are.
        if location.last().map(String::as_str) != Some(field) {
            location.push(field.to_owned());
        }
        (message.clone(), FieldErrorKind::UnknownField)
    } else if message.starts_with("invalid type") || message.starts_with("invalid length") {
        (message, FieldErrorKind::TypeError)
    } else {
        (message, FieldErrorKind::ValueError)
    };
    FieldError::new(location, message, kind)
}

fn backticked_after<'a>(message: &'a str, prefix: &str) -> Option<&'a str> {
    message
        .strip_prefix(prefix)?
        .strip_prefix('`')?
        .split('`')
        .next()
}

/// A stand-in written over one faulty location.
struct Patch {
    location: Vec<String>,
    remove: bool,
    attempt: usize,
}

impl Patch {
    fn new(fault: &FieldError) -> Self {
        Self {
            location: fault.location().to_vec(),
            remove: fault.kind() == FieldErrorKind::UnknownField,
            attempt: 0,
        }
    }

    /// Writes the current stand-in; `None` once every stand-in was refused.
    fn apply(&self, document: &mut Value) -> Option<()> {
        let replacement = if self.remove {
            (self.attempt == 0).then_some(None::<Value>)?
        } else {
            Some(stand_in(self.attempt)?)
        };
        let Some((field, parent)) = self.location.split_last() else {
            *document = replacement?;
            return Some(());
        };
        match (lookup(document, parent)?, replacement) {
            (Value::Object(map), Some(value)) => {
                map.insert(field.clone(), value);
            }
            (Value::Object(map), None) => {
                map.remove(field)?;
            }
            (Value::Array(items), Some(value)) => {
                *items.get_mut(field.parse::<usize>().ok()?)? = value;
            }
            _ => return None,
        }
        Some(())
    }
}

fn stand_in(attempt: usize) -> Option<Value> {
    let value = match attempt {
        0 => Value::Null,
        1 => Value::Bool(false),
        2 => Value::from(0),
        3 => Value::String(String::new()),
        4 => Value::Array(Vec::new()),
        5 => Value::Object(Map::new()),
        _ => return None,
    };
    Some(value)
}

fn lookup<'a>(document: &'a mut Value, location: &[String]) -> Option<&'a mut Value> {
    location
        .iter()
        .try_fold(document, |current, segment| match current {
            Value::Object(map) => map.get_mut(segment),
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?),
            _ => None,
        })
}

/// Mapping of top-level keys to the fragments that validate them.
#[derive(Clone, Default)]
pub struct ConfigSchema {
    sections: BTreeMap<String, Arc<dyn ConfigSection>>,
}

impl ConfigSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fragment; a later fragment for the same key replaces the
    /// earlier one.
    pub fn insert(&mut self, key: impl Into<String>, section: Arc<dyn ConfigSection>) {
        self.sections.insert(key.into(), section);
    }

    /// Merges every fragment from `sections`.
    pub fn extend<I>(&mut self, sections: I)
    where
        I: IntoIterator<Item = (String, Arc<dyn ConfigSection>)>,
    {
        self.sections.extend(sections);
    }

    /// Keys declared by the schema, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Number of declared sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns `true` when no bundle declared any section.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Validates `document` against every section, collecting all failures.
    pub fn build(&self, document: &Value) -> Result<Configuration, ValidationError> {
        let mut sections = BTreeMap::new();
        let mut errors = Vec::new();

        for (key, section) in &self.sections {
            match section.build(document.get(key)) {
                Ok(value) => {
                    sections.insert(key.clone(), value);
                }
                Err(failures) => {
                    errors.extend(failures.into_iter().map(|error| error.prefixed(key)));
                }
            }
        }

        if errors.is_empty() {
            Ok(Configuration {
                sections,
                document: document.clone(),
            })
        } else {
            Err(ValidationError::new(errors))
        }
    }
}

impl fmt::Debug for ConfigSchema {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(self.sections.keys())
            .finish()
    }
}

/// Validated configuration with one typed value per schema key.
#[derive(Clone, Default)]
pub struct Configuration {
    sections: BTreeMap<String, SectionValue>,
    document: Value,
}

impl Configuration {
    /// Typed view of the section stored under `key`.
    ///
    /// Returns `None` when the key is absent or holds a different type.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        Arc::clone(self.sections.get(key)?).downcast::<T>().ok()
    }

    /// Returns `true` if a section was validated under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.sections.contains_key(key)
    }

    /// Keys of every validated section.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// The substituted document the sections were built from.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Configuration")
            .field("sections", &self.sections.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    use super::{ConfigSchema, Section, Validate};
    use crate::error::{FieldError, FieldErrorKind};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Database {
        host: String,
        #[serde(default)]
        port: u16,
    }

    impl Validate for Database {
        fn validate(self) -> Result<Self, Vec<FieldError>> {
            if self.host.is_empty() {
                return Err(vec![FieldError::value_error("host", "must not be empty")]);
            }
            Ok(self)
        }
    }

    fn schema() -> ConfigSchema {
        let mut schema = ConfigSchema::new();
        schema.insert("database", Arc::new(Section::<Database>::new()));
        schema
    }

    #[rstest]
    fn builds_typed_sections() {
        let configuration = schema()
            .build(&json!({"database": {"host": "localhost", "port": 5432}}))
            .expect("document should validate");

        let database = configuration
            .get::<Database>("database")
            .expect("section should be present");
        assert_eq!(database.host, "localhost");
        assert_eq!(database.port, 5432);
        assert!(configuration.get::<String>("database").is_none());
    }

    #[rstest]
    fn missing_section_is_reported_at_its_key() {
        let error = schema().build(&json!({})).expect_err("must fail");

        let [field] = error.errors() else {
            panic!("expected one error, got {:?}", error.errors());
        };
        assert_eq!(field.location(), ["database"]);
        assert_eq!(field.kind(), FieldErrorKind::Missing);
    }

    #[rstest]
    fn missing_field_is_located_inside_the_section() {
        let error = schema()
            .build(&json!({"database": {"port": 1}}))
            .expect_err("must fail");

        let [field] = error.errors() else {
            panic!("expected one error, got {:?}", error.errors());
        };
        assert_eq!(field.dotted_location(), "database.host");
        assert_eq!(field.kind(), FieldErrorKind::Missing);
    }

    #[rstest]
    fn wrong_types_are_type_errors() {
        let error = schema()
            .build(&json!({"database": {"host": "db", "port": "many"}}))
            .expect_err("must fail");

        let [field] = error.errors() else {
            panic!("expected one error, got {:?}", error.errors());
        };
        assert_eq!(field.dotted_location(), "database.port");
        assert_eq!(field.kind(), FieldErrorKind::TypeError);
    }

    #[rstest]
    fn every_fault_in_a_section_is_reported() {
        let error = schema()
            .build(&json!({"database": {"port": "x"}}))
            .expect_err("must fail");

        let faults: Vec<(String, FieldErrorKind)> = error
            .errors()
            .iter()
            .map(|field| (field.dotted_location(), field.kind()))
            .collect();
        assert_eq!(
            faults,
            vec![
                ("database.port".to_owned(), FieldErrorKind::TypeError),
                ("database.host".to_owned(), FieldErrorKind::Missing),
            ]
        );
    }

    #[derive(Debug, Deserialize)]
    struct Pool {
        size: u32,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Server {
        port: u16,
    }

    #[derive(Debug, Deserialize)]
    struct Cluster {
        #[serde(rename = "pool")]
        _pool: Pool,
        #[serde(rename = "servers")]
        _servers: Vec<Server>,
    }

    impl Validate for Cluster {}

    fn cluster_schema() -> ConfigSchema {
        let mut schema = ConfigSchema::new();
        schema.insert("cluster", Arc::new(Section::<Cluster>::new()));
        schema
    }

    #[rstest]
    #[case::nested_missing(
        json!({"pool": {}, "servers": []}),
        "cluster.pool.size",
        FieldErrorKind::Missing
    )]
    #[case::nested_type(
        json!({"pool": {"size": -1}, "servers": []}),
        "cluster.pool.size",
        FieldErrorKind::ValueError
    )]
    #[case::sequence_element(
        json!({"pool": {"size": 1}, "servers": [{"port": 80}, {"port": "http"}]}),
        "cluster.servers.1.port",
        FieldErrorKind::TypeError
    )]
    #[case::unknown_field(
        json!({"pool": {"size": 1}, "servers": [{"port": 80, "tls": true}]}),
        "cluster.servers.0.tls",
        FieldErrorKind::UnknownField
    )]
    fn nested_faults_carry_their_full_path(
        #[case] section: serde_json::Value,
        #[case] location: &str,
        #[case] kind: FieldErrorKind,
    ) {
        let error = cluster_schema()
            .build(&json!({ "cluster": section }))
            .expect_err("must fail");

        let [field] = error.errors() else {
            panic!("expected one error, got {:?}", error.errors());
        };
        assert_eq!(field.dotted_location(), location);
        assert_eq!(field.kind(), kind);
    }

    #[rstest]
    fn a_section_of_the_wrong_shape_is_reported_once() {
        let error = cluster_schema()
            .build(&json!({"cluster": {"pool": "big", "servers": []}}))
            .expect_err("must fail");

        let [field] = error.errors() else {
            panic!("expected one error, got {:?}", error.errors());
        };
        assert_eq!(field.dotted_location(), "cluster.pool");
        assert_eq!(field.kind(), FieldErrorKind::TypeError);
    }

    #[rstest]
    fn validation_hook_errors_are_prefixed() {
        let error = schema()
            .build(&json!({"database": {"host": ""}}))
            .expect_err("must fail");

        let [field] = error.errors() else {
            panic!("expected one error, got {:?}", error.errors());
        };
        assert_eq!(field.dotted_location(), "database.host");
        assert_eq!(field.message(), "must not be empty");
    }

    #[rstest]
    fn failures_across_sections_are_aggregated() {
        let mut schema = schema();
        schema.insert("cache", Arc::new(Section::<Database>::new()));

        let error = schema.build(&json!({"database": {}})).expect_err("must fail");
        let locations: Vec<String> = error
            .errors()
            .iter()
            .map(|field| field.dotted_location())
            .collect();
        assert_eq!(locations, vec!["cache", "database.host"]);
    }
}
