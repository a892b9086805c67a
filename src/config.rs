//! Simulation parameter files
//!
//! A [`Config`] is a free-form JSON object read from a `.json` or `.yaml`
//! file. Values are fetched by name with a default, so a parameters file only
//! needs to mention what differs from the defaults. Command line overrides of
//! the form `key=value` take precedence over the file.
//!
//! After a run the config is written back into the log directory, together
//! with anything the run chose to [`Config::set`], as a record of how the data
//! was produced.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur while reading, querying or writing a config
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file extension could not be determined
    #[error("could not determine config format from path: {0}")]
    UnknownExtension(String),

    /// The file extension is not a supported config format
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// The file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file could not be parsed
    #[error("failed to parse config {path}: {message}")]
    Parse { path: String, message: String },

    /// The document is not a key/value object
    #[error("config root must be an object")]
    NotAnObject,

    /// A command line override was not of the form `key=value`
    #[error("invalid override '{0}': expected key=value")]
    InvalidOverride(String),

    /// A value exists but has the wrong type
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// The config could not be written out
    #[error("failed to write config {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// On-disk formats a config can be read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// File extensions handled by this format
    pub fn supported_extensions(&self) -> &[&str] {
        match self {
            ConfigFormat::Json => &["json"],
            ConfigFormat::Yaml => &["yaml", "yml"],
        }
    }

    /// Pick a format from the extension of `path` (case-insensitive)
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnknownExtension(path.display().to_string()))?;

        [ConfigFormat::Json, ConfigFormat::Yaml]
            .into_iter()
            .find(|f| {
                f.supported_extensions()
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
            })
            .ok_or_else(|| ConfigError::UnsupportedFormat(ext.to_string()))
    }

    fn parse(&self, content: &str) -> Result<Value, String> {
        match self {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// A parameters document plus command line overrides
#[derive(Debug, Clone, Default)]
pub struct Config {
    path: Option<PathBuf>,
    root: Map<String, Value>,
    overrides: BTreeMap<String, String>,
}

impl Config {
    /// An empty config; every getter returns its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a config file, choosing the parser from its extension
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let value = format.parse(&content).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;

        let mut config = Self::from_value(value)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Build a config from an already-parsed JSON value, which must be an object
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        match value {
            Value::Object(root) => Ok(Self {
                path: None,
                root,
                overrides: BTreeMap::new(),
            }),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    /// The file this config was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a `key=value` override
    pub fn apply_override(&mut self, arg: &str) -> ConfigResult<()> {
        match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                self.overrides
                    .insert(key.trim().to_string(), value.to_string());
                Ok(())
            }
            _ => Err(ConfigError::InvalidOverride(arg.to_string())),
        }
    }

    /// Record several `key=value` overrides; later ones win
    pub fn process_args<I, S>(&mut self, args: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter()
            .try_for_each(|arg| self.apply_override(arg.as_ref()))
    }

    pub fn overrides(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }

    /// Whether `key` is set in the file or by an override
    pub fn contains(&self, key: &str) -> bool {
        self.overrides.contains_key(key) || self.root.contains_key(key)
    }

    /// Fetch `key` as a `T`, or `default` if it is absent
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> ConfigResult<T> {
        let invalid = |e: serde_json::Error| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        };

        if let Some(raw) = self.overrides.get(key) {
            let mut last_err = None;
            for candidate in override_candidates(raw) {
                match serde_json::from_value(candidate) {
                    Ok(value) => return Ok(value),
                    Err(e) => last_err = Some(e),
                }
            }
            return Err(last_err.map_or_else(
                || ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("cannot interpret '{raw}'"),
                },
                invalid,
            ));
        }
        match self.root.get(key) {
            Some(value) => serde_json::from_value(value.clone()).map_err(invalid),
            None => Ok(default),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> ConfigResult<bool> {
        self.get(key, default)
    }

    pub fn get_u32(&self, key: &str, default: u32) -> ConfigResult<u32> {
        self.get(key, default)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> ConfigResult<u64> {
        self.get(key, default)
    }

    pub fn get_f32(&self, key: &str, default: f32) -> ConfigResult<f32> {
        self.get(key, default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> ConfigResult<f64> {
        self.get(key, default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> ConfigResult<String> {
        self.get(key, default.to_string())
    }

    /// Deserialize the file contents, with overrides applied, into a typed
    /// settings struct.
    ///
    /// Each override is read the way the target field wants it, so `2024`
    /// can fill a string field and `1` a bool field. Unknown keys are ignored,
    /// so several structs can be read from one file.
    pub fn section<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        let mut merged = self.root.clone();
        for (key, raw) in &self.overrides {
            let candidates = override_candidates(raw);
            // A lone key on an otherwise-default struct shows whether this
            // reading of the value fits the field
            let fits = |candidate: &Value| {
                let single = Map::from_iter([(key.clone(), candidate.clone())]);
                serde_json::from_value::<T>(Value::Object(single)).is_ok()
            };
            let chosen = candidates
                .iter()
                .find(|&c| fits(c))
                .cloned()
                .unwrap_or_else(|| parse_override_value(raw));
            merged.insert(key.clone(), chosen);
        }
        serde_json::from_value(Value::Object(merged)).map_err(|e| ConfigError::InvalidValue {
            key: "<root>".to_string(),
            message: e.to_string(),
        })
    }

    /// Set `key` in the document (overrides for `key` still take precedence
    /// when reading)
    pub fn set(&mut self, key: &str, value: impl Serialize) -> ConfigResult<()> {
        let value = serde_json::to_value(value).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.root.insert(key.to_string(), value);
        Ok(())
    }

    /// Pretty JSON (4-space indent). Overrides are listed under
    /// `config_overrides` so the record shows what the command line changed.
    pub fn to_json_string(&self) -> ConfigResult<String> {
        let mut combined = self.root.clone();
        if !self.overrides.is_empty() {
            let overrides: Map<String, Value> = self
                .overrides
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            combined.insert("config_overrides".to_string(), Value::Object(overrides));
        }

        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        Value::Object(combined)
            .serialize(&mut ser)
            .map_err(|e| ConfigError::InvalidValue {
                key: "<root>".to_string(),
                message: e.to_string(),
            })?;
        let mut text = String::from_utf8_lossy(&out).into_owned();
        text.push('\n');
        Ok(text)
    }

    /// Write the config as JSON to `path`
    pub fn write(&self, path: &Path) -> ConfigResult<()> {
        fs::write(path, self.to_json_string()?).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Interpret an override value: JSON scalars keep their type, `True`/`False`
/// are accepted as booleans, anything else is a string.
fn parse_override_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v) if !v.is_object() && !v.is_array() => v,
        _ => match raw {
            "True" => Value::Bool(true),
            "False" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
    }
}

/// Every plausible reading of an override, most specific first: the parsed
/// scalar, a bool for `1`/`0`, then the raw string.
fn override_candidates(raw: &str) -> Vec<Value> {
    let mut candidates = vec![parse_override_value(raw)];
    match raw {
        "1" => candidates.push(Value::Bool(true)),
        "0" => candidates.push(Value::Bool(false)),
        _ => {}
    }
    if !candidates[0].is_string() {
        candidates.push(Value::String(raw.to_string()));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Config {
        Config::from_value(json!({
            "steps": 500,
            "dt": 0.0001,
            "k1": 2,
            "overwrite_logs": true,
            "logpath": "fromfilename",
        }))
        .unwrap()
    }

    #[test]
    fn getters_read_values_and_fall_back_to_defaults() {
        let conf = sample();
        assert_eq!(conf.get_u32("steps", 1000).unwrap(), 500);
        assert_eq!(conf.get_f64("dt", 0.1).unwrap(), 0.0001);
        assert_eq!(conf.get_f64("k1", 1.0).unwrap(), 2.0);
        assert!(conf.get_bool("overwrite_logs", false).unwrap());
        assert_eq!(conf.get_string("logpath", "x").unwrap(), "fromfilename");

        assert_eq!(conf.get_u64("logevery", 100).unwrap(), 100);
        assert_eq!(conf.get_f32("hexspan", 4.0).unwrap(), 4.0);
        assert!(!conf.contains("logevery"));
    }

    #[test]
    fn wrong_type_is_an_error() {
        let conf = Config::from_value(json!({ "steps": 1.5, "dt": "fast" })).unwrap();
        assert!(matches!(
            conf.get_u32("steps", 1),
            Err(ConfigError::InvalidValue { .. })
        ));
        let err = conf.get_f64("dt", 0.1).unwrap_err();
        assert!(err.to_string().starts_with("invalid value for 'dt'"));
    }

    #[test]
    fn overrides_take_precedence() {
        let mut conf = sample();
        conf.process_args(["steps=20", "overwrite_logs=False", "logpath=out/run1"])
            .unwrap();
        assert_eq!(conf.get_u32("steps", 1000).unwrap(), 20);
        assert!(!conf.get_bool("overwrite_logs", true).unwrap());
        assert_eq!(conf.get_string("logpath", "").unwrap(), "out/run1");
        assert_eq!(conf.overrides().len(), 3);
    }

    #[test]
    fn numeric_looking_override_can_still_be_read_as_string() {
        let mut conf = Config::new();
        conf.apply_override("logbase=2024").unwrap();
        assert_eq!(conf.get_string("logbase", "logs/").unwrap(), "2024");
        assert_eq!(conf.get_u32("logbase", 0).unwrap(), 2024);
    }

    #[test]
    fn one_and_zero_overrides_read_as_bools() {
        let mut conf = Config::new();
        conf.process_args(["overwrite_logs=1", "halt_on_nonfinite=0"])
            .unwrap();
        assert!(conf.get_bool("overwrite_logs", false).unwrap());
        assert!(!conf.get_bool("halt_on_nonfinite", true).unwrap());
        assert_eq!(conf.get_u32("overwrite_logs", 0).unwrap(), 1);
    }

    #[test]
    fn malformed_override_is_rejected() {
        let mut conf = Config::new();
        assert!(matches!(
            conf.apply_override("steps"),
            Err(ConfigError::InvalidOverride(_))
        ));
        assert!(conf.apply_override("=3").is_err());
    }

    #[test]
    fn section_sees_overrides() {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Rates {
            k1: f64,
            #[serde(rename = "D_A")]
            d_a: f64,
        }

        let mut conf = sample();
        conf.apply_override("D_A=0.25").unwrap();
        let rates: Rates = conf.section().unwrap();
        assert_eq!(rates.k1, 2.0);
        assert_eq!(rates.d_a, 0.25);
    }

    #[test]
    fn section_reads_each_override_as_its_field_type() {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Logging {
            logbase: String,
            steps: u64,
            overwrite_logs: bool,
        }

        let mut conf = sample();
        conf.process_args(["logbase=2024", "steps=15", "overwrite_logs=0"])
            .unwrap();
        let logging: Logging = conf.section().unwrap();
        assert_eq!(logging.logbase, "2024");
        assert_eq!(logging.steps, 15);
        assert!(!logging.overwrite_logs);

        conf.apply_override("steps=many").unwrap();
        assert!(matches!(
            conf.section::<Logging>(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn set_rejects_values_without_a_json_form() {
        let mut conf = Config::new();
        let keyed_by_pair = std::collections::HashMap::from([((1, 2), 3)]);
        assert!(matches!(
            conf.set("pairs", keyed_by_pair),
            Err(ConfigError::InvalidValue { key, .. }) if key == "pairs"
        ));
        assert!(!conf.contains("pairs"));
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert!(matches!(
            Config::from_value(json!([1, 2, 3])),
            Err(ConfigError::NotAnObject)
        ));
    }

    #[test]
    fn format_detected_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/schnak.json")).unwrap(),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("params.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert!(matches!(
            ConfigFormat::from_path(Path::new("params.toml")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            ConfigFormat::from_path(Path::new("params")),
            Err(ConfigError::UnknownExtension(_))
        ));
    }

    #[test]
    fn loads_json_and_yaml_files() {
        let dir = TempDir::new().expect("Failed to create temp dir");

        let json_path = dir.path().join("p.json");
        fs::write(&json_path, r#"{ "steps": 7, "k3": 0.5 }"#).unwrap();
        let conf = Config::load(&json_path).unwrap();
        assert_eq!(conf.get_u32("steps", 0).unwrap(), 7);
        assert_eq!(conf.path(), Some(json_path.as_path()));

        let yaml_path = dir.path().join("p.yaml");
        fs::write(&yaml_path, "steps: 9\nk3: 0.25\nmodel: lotka_volterra\n").unwrap();
        let conf = Config::load(&yaml_path).unwrap();
        assert_eq!(conf.get_u32("steps", 0).unwrap(), 9);
        assert_eq!(conf.get_f64("k3", 0.0).unwrap(), 0.25);
        assert_eq!(conf.get_string("model", "").unwrap(), "lotka_volterra");
    }

    #[test]
    fn missing_and_malformed_files_report_the_path() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let missing = dir.path().join("nope.json");
        let err = Config::load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("nope.json"));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ steps: ").unwrap();
        assert!(matches!(
            Config::load(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn written_record_includes_sets_and_overrides() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut conf = Config::from_value(json!({ "steps": 5 })).unwrap();
        conf.apply_override("k1=3").unwrap();
        conf.set("float_width", 8).unwrap();

        let out = dir.path().join("params.json");
        conf.write(&out).unwrap();

        let reloaded = Config::load(&out).unwrap();
        assert_eq!(reloaded.get_u32("steps", 0).unwrap(), 5);
        assert_eq!(reloaded.get_u32("float_width", 0).unwrap(), 8);
        let overrides: BTreeMap<String, String> =
            reloaded.get("config_overrides", BTreeMap::new()).unwrap();
        assert_eq!(overrides.get("k1").map(String::as_str), Some("3"));
    }

    #[test]
    fn json_output_uses_four_space_indent() {
        let conf = Config::from_value(json!({ "steps": 5 })).unwrap();
        insta::assert_snapshot!(conf.to_json_string().unwrap().trim_end(), @r#"
        {
            "steps": 5
        }
        "#);
    }
}
