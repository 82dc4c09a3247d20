//! End-to-end loading of YAML configuration against bundle schemas.

use std::fs;
use std::sync::Arc;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use serde::Deserialize;
use tempfile::TempDir;

use kindle_config::{
    ConfigSchema, ConfigurationError, ConfigurationLoader, FieldError, FieldErrorKind, Section,
    Validate, YamlConfigurationLoader,
};

#[derive(Debug, Deserialize)]
struct TestModel {
    value: String,
    #[serde(default = "default_value")]
    default_value: String,
    #[serde(default)]
    number: i64,
}

fn default_value() -> String {
    "default".to_owned()
}

impl Validate for TestModel {
    fn validate(mut self) -> Result<Self, Vec<FieldError>> {
        if !self.value.contains(' ') {
            return Err(vec![FieldError::value_error("value", "must contain a space")]);
        }
        self.value = title_case(&self.value);
        Ok(self)
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

struct Sources {
    dir: TempDir,
}

impl Sources {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write source file");
        Utf8PathBuf::from_path_buf(path).expect("temp path should be UTF-8")
    }

    fn missing(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join(name)).expect("temp path should be UTF-8")
    }
}

#[fixture]
fn sources() -> Sources {
    Sources::new()
}

fn schema() -> ConfigSchema {
    let mut schema = ConfigSchema::new();
    schema.insert("test", Arc::new(Section::<TestModel>::new()));
    schema
}

const CONFIG: &str = "test:\n  value: {VALUE}\n";
const CONFIG_WITH_NUMBER: &str = "test:\n  value: {VALUE}\n  number: {NUMBER}\n";
const NO_ENV: [(&str, &str); 0] = [];

#[rstest]
fn rejects_values_failing_validation(sources: Sources) {
    let config = sources.write("config.yml", CONFIG);
    let parameters = sources.write("parameters.yml", "VALUE: onewordonly\n");
    let loader = YamlConfigurationLoader::new(config, parameters).with_environment(NO_ENV);

    let error = loader.load(&schema()).expect_err("validation must fail");

    let ConfigurationError::Validation(validation) = error else {
        panic!("expected a validation error, got {error:?}");
    };
    let [field] = validation.errors() else {
        panic!("expected one field error, got {:?}", validation.errors());
    };
    assert_eq!(field.dotted_location(), "test.value");
    assert_eq!(field.kind(), FieldErrorKind::ValueError);
    assert_eq!(field.message(), "must contain a space");
}

#[rstest]
fn rejects_values_of_the_wrong_type(sources: Sources) {
    let config = sources.write("config.yml", CONFIG_WITH_NUMBER);
    let parameters = sources.write("parameters.yml", "VALUE: two words\nNUMBER: lots\n");
    let loader = YamlConfigurationLoader::new(config, parameters).with_environment(NO_ENV);

    let error = loader.load(&schema()).expect_err("validation must fail");

    let ConfigurationError::Validation(validation) = error else {
        panic!("expected a validation error, got {error:?}");
    };
    let [field] = validation.errors() else {
        panic!("expected one field error, got {:?}", validation.errors());
    };
    assert_eq!(field.dotted_location(), "test.number");
    assert_eq!(field.kind(), FieldErrorKind::TypeError);
}

#[rstest]
fn parameters_fill_placeholders_and_validators_normalise(sources: Sources) {
    let config = sources.write("config.yml", CONFIG);
    let parameters = sources.write("parameters.yml", "VALUE: two words\n");
    let loader = YamlConfigurationLoader::new(config, parameters).with_environment(NO_ENV);

    let configuration = loader.load(&schema()).expect("configuration should load");
    let test = configuration
        .get::<TestModel>("test")
        .expect("test section should be present");

    assert_eq!(test.value, "Two Words");
    assert_eq!(test.default_value, "default");
    assert_eq!(test.number, 0);
}

#[rstest]
fn numeric_parameters_keep_their_type(sources: Sources) {
    let config = sources.write("config.yml", CONFIG_WITH_NUMBER);
    let parameters = sources.write("parameters.yml", "VALUE: two words\nNUMBER: 2\n");
    let loader = YamlConfigurationLoader::new(config, parameters).with_environment(NO_ENV);

    let configuration = loader.load(&schema()).expect("configuration should load");
    let test = configuration
        .get::<TestModel>("test")
        .expect("test section should be present");

    assert_eq!(test.number, 2);
}

#[rstest]
fn undefined_parameters_abort_loading(sources: Sources) {
    let config = sources.write("config.yml", CONFIG);
    let parameters = sources.write("parameters.yml", "");
    let loader = YamlConfigurationLoader::new(config, parameters).with_environment(NO_ENV);

    let error = loader.load(&schema()).expect_err("loading must fail");

    assert!(
        matches!(error, ConfigurationError::MissingParameter { ref name } if name == "VALUE"),
        "unexpected error: {error:?}"
    );
}

#[rstest]
fn environment_overrides_win_over_the_parameters_file(sources: Sources) {
    let config = sources.write("config.yml", CONFIG);
    let parameters = sources.write("parameters.yml", "VALUE: two words\n");

    let rejected = YamlConfigurationLoader::new(config.clone(), parameters.clone())
        .with_environment([("VALUE", "one")])
        .load(&schema());
    assert!(
        matches!(rejected, Err(ConfigurationError::Validation(_))),
        "environment value without a space must be rejected"
    );

    let configuration = YamlConfigurationLoader::new(config, parameters)
        .with_environment([("VALUE", "from env")])
        .load(&schema())
        .expect("configuration should load");
    let test = configuration
        .get::<TestModel>("test")
        .expect("test section should be present");
    assert_eq!(test.value, "From Env");
}

#[rstest]
fn missing_parameters_file_is_skipped(sources: Sources) {
    let config = sources.write("config.yml", CONFIG);
    let parameters = sources.missing("parameters.yml");

    let configuration = YamlConfigurationLoader::new(config, parameters)
        .with_environment([("VALUE", "from env")])
        .load(&schema())
        .expect("configuration should load");

    assert!(configuration.contains("test"));
}

#[rstest]
fn missing_config_file_is_a_read_error(sources: Sources) {
    let loader = YamlConfigurationLoader::new(
        sources.missing("config.yml"),
        sources.missing("parameters.yml"),
    )
    .with_environment(NO_ENV);

    let error = loader.load(&schema()).expect_err("loading must fail");

    assert!(
        matches!(error, ConfigurationError::Read { .. }),
        "unexpected error: {error:?}"
    );
}

#[rstest]
fn list_placeholders_render_sequences(sources: Sources) {
    #[derive(Debug, Deserialize)]
    struct Hosts {
        flow: Vec<String>,
        block: Vec<String>,
    }
    impl Validate for Hosts {}

    let config = sources.write(
        "config.yml",
        "hosts:\n  flow: {HOSTS:[]}\n  block:{HOSTS:[]-^.4}\n",
    );
    let parameters = sources.write("parameters.yml", "HOSTS: alpha,beta\n");
    let mut schema = ConfigSchema::new();
    schema.insert("hosts", Arc::new(Section::<Hosts>::new()));

    let configuration = YamlConfigurationLoader::new(config, parameters)
        .with_environment(NO_ENV)
        .load(&schema)
        .expect("configuration should load");
    let hosts = configuration
        .get::<Hosts>("hosts")
        .expect("hosts section should be present");

    assert_eq!(hosts.flow, ["alpha", "beta"]);
    assert_eq!(hosts.block, ["alpha", "beta"]);
}
