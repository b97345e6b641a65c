//! Layered configuration loading.
//!
//! Layers are merged key by key as JSON values, so a file only needs the
//! keys it changes and a preset survives a partial file. The merged value
//! is deserialized once at the end, which is where unknown keys and wrong
//! types are reported.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::{ConfigError, HermesConfig};

/// Default environment prefix.
pub const DEFAULT_ENV_PREFIX: &str = "HERMES";

/// Configuration loader.
///
/// Later layers override earlier ones:
/// 1. defaults or a preset
/// 2. configuration files and strings (TOML or JSON)
/// 3. environment variables `PREFIX__SECTION__KEY`
///
/// # Example
///
/// ```no_run
/// use hermes_config::ConfigLoader;
///
/// # fn main() -> Result<(), hermes_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_production()
///     .with_optional_file("hermes.toml")?
///     .with_dotenv()?
///     .with_env_prefix("HERMES")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    layers: Value,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader starting from [`HermesConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&HermesConfig::default())
    }

    fn from_config(config: &HermesConfig) -> Self {
        Self {
            layers: serde_json::to_value(config).unwrap_or_else(|_| Value::Object(Map::new())),
            env_prefix: None,
        }
    }

    /// Resets to the defaults.
    #[must_use]
    pub fn with_defaults(self) -> Self {
        self.with_base(&HermesConfig::default())
    }

    /// Resets to the development preset.
    ///
    /// ```
    /// use hermes_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(self) -> Self {
        self.with_base(&HermesConfig::development())
    }

    /// Resets to the production preset.
    #[must_use]
    pub fn with_production(self) -> Self {
        self.with_base(&HermesConfig::production())
    }

    fn with_base(self, config: &HermesConfig) -> Self {
        Self {
            env_prefix: self.env_prefix,
            ..Self::from_config(config)
        }
    }

    /// Merges a TOML (`.toml`) or JSON (`.json`) file.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        let layer = parse(&content, format)?;
        merge(&mut self.layers, layer);
        Ok(self)
    }

    /// Merges a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merges configuration text in `format` (`toml` or `json`).
    ///
    /// ```
    /// use hermes_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nmax_in_flight = 64", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.max_in_flight, Some(64));
    /// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer = parse(content, format)?;
        merge(&mut self.layers, layer);
        Ok(self)
    }

    /// Reads environment overrides named `PREFIX__SECTION__KEY` at load time.
    ///
    /// Nested keys use more segments: `HERMES__AUTH__BEARER__SECRET`. Lists
    /// are comma-separated.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads `.env` from the working directory into the process environment,
    /// if present.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies environment overrides, deserializes and validates.
    pub fn load(self) -> Result<HermesConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides and deserializes without validating.
    pub fn load_unvalidated(mut self) -> Result<HermesConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let mut vars: Vec<(String, String)> = env::vars()
                .filter(|(key, _)| key.starts_with(&format!("{prefix}__")))
                .collect();
            vars.sort();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        Ok(serde_json::from_value(self.layers)?)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let path: Vec<String> = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?
            .split("__")
            .map(str::to_lowercase)
            .collect();
        if path.iter().any(String::is_empty) {
            return Err(ConfigError::env_parse_error(key, "empty key segment"));
        }

        let (leaf, parents) = path
            .split_last()
            .ok_or_else(|| ConfigError::env_parse_error(key, "missing key"))?;

        let mut node = &mut self.layers;
        for segment in parents {
            let map = as_object(node, key)?;
            node = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            // An absent optional section gets its fields from defaults.
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
        }

        let map = as_object(node, key)?;
        let typed = typed_env_value(key, value, map.get(leaf))?;
        map.insert(leaf.clone(), typed);
        Ok(())
    }
}

fn as_object<'a>(node: &'a mut Value, key: &str) -> Result<&'a mut Map<String, Value>, ConfigError> {
    node.as_object_mut()
        .ok_or_else(|| ConfigError::env_parse_error(key, "does not name a configuration section"))
}

fn parse(content: &str, format: &str) -> Result<Value, ConfigError> {
    match format.to_lowercase().as_str() {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

// Objects merge recursively; anything else replaces.
fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value);
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

// Environment values are strings; the current value decides how to read them.
fn typed_env_value(key: &str, raw: &str, current: Option<&Value>) -> Result<Value, ConfigError> {
    match current {
        Some(Value::Bool(_)) => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean")),
        Some(Value::Number(_)) => raw
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| ConfigError::env_parse_error(key, "expected non-negative integer")),
        Some(Value::Array(_)) => Ok(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
        Some(Value::String(_)) => Ok(Value::String(raw.to_string())),
        // Unset optional or unknown key: best guess, checked on deserialize.
        _ => {
            if raw.eq_ignore_ascii_case("none") || raw.is_empty() {
                Ok(Value::Null)
            } else if let Ok(n) = raw.trim().parse::<u64>() {
                Ok(Value::from(n))
            } else if let Some(b) = parse_bool(raw) {
                Ok(Value::Bool(b))
            } else {
                Ok(Value::String(raw.to_string()))
            }
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_server::ProxyProtocolMode;
    use hermes_telemetry::LogFormat;

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, HermesConfig::default());
    }

    #[test]
    fn test_partial_string_keeps_preset() {
        let config = ConfigLoader::new()
            .with_development()
            .with_string("[server]\nmax_in_flight = 8", "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.max_in_flight, Some(8));
        assert_eq!(config.server.http_addr, "127.0.0.1:8080");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_json_string() {
        let json = r#"{"server": {"proxy_protocol": "enabled"}, "cors": {"enabled": true, "allowed_origins": ["https://a.example"]}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.server.proxy_protocol, ProxyProtocolMode::Enabled);
        assert_eq!(config.cors.allowed_origins, ["https://a.example"]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = ConfigLoader::new()
            .with_string("[server]\nhttp2 = true", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::JsonError(_))));
    }

    #[test]
    fn test_unsupported_format() {
        let result = ConfigLoader::new().with_string("a: 1", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(ConfigLoader::new().with_file("/nonexistent/hermes.toml").is_err());
        assert!(ConfigLoader::new()
            .with_optional_file("/nonexistent/hermes.toml")
            .is_ok());
    }

    #[test]
    fn test_validation_runs_on_load() {
        let result = ConfigLoader::new()
            .with_string("[server]\nhttp_addr = \"nowhere\"", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    // Process environment is shared between tests, so overrides are applied
    // through apply_env_var directly.

    #[test]
    fn test_env_scalars() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("T__SERVER__HTTP_ADDR", "127.0.0.1:9100", "T").unwrap();
        loader.apply_env_var("T__SERVER__KEEP_ALIVE", "off", "T").unwrap();
        loader.apply_env_var("T__SERVER__IDLE_TIMEOUT_SECS", "5", "T").unwrap();
        loader.apply_env_var("T__SERVER__MAX_IN_FLIGHT", "32", "T").unwrap();
        loader.apply_env_var("T__SERVER__PROXY_PROTOCOL", "auto", "T").unwrap();
        loader.apply_env_var("T__LOGGING__FORMAT", "pretty", "T").unwrap();

        let config = loader.load().unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:9100");
        assert!(!config.server.keep_alive);
        assert_eq!(config.server.idle_timeout_secs, 5);
        assert_eq!(config.server.max_in_flight, Some(32));
        assert_eq!(config.server.proxy_protocol, ProxyProtocolMode::Auto);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_lists() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("T__SERVER__TRUSTED_PROXIES", "10.0.0.0/8, 192.168.0.1", "T")
            .unwrap();
        let config = loader.load().unwrap();
        assert_eq!(config.server.trusted_proxies, ["10.0.0.0/8", "192.168.0.1"]);
    }

    #[test]
    fn test_env_creates_optional_section() {
        let secret = "s".repeat(40);
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("T__AUTH__BEARER__SECRET", &secret, "T").unwrap();
        loader.apply_env_var("T__AUTH__BEARER__ISSUER", "nodes-api", "T").unwrap();

        let config = loader.load().unwrap();
        let bearer = config.auth.bearer.unwrap();
        assert_eq!(bearer.secret, secret);
        assert_eq!(bearer.issuer, "nodes-api");
        assert_eq!(bearer.access_ttl_secs, 900);
    }

    #[test]
    fn test_env_guessed_type_mismatch() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("T__AUTH__BEARER__ISSUER", "x", "T").unwrap();
        loader.apply_env_var("T__AUTH__BEARER__SECRET", "1234", "T").unwrap();
        // The secret had no value to type against, so "1234" reads as a number.
        assert!(loader.load_unvalidated().is_err());
    }

    #[test]
    fn test_toml_file_over_preset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hermes.toml");
        std::fs::write(
            &path,
            r#"
[server]
http_addr = "127.0.0.1:9443"
trusted_proxies = ["10.0.0.0/8"]

[auth.ticket]
ttl_secs = 10

[logging]
level = "hermes=trace"
"#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_production()
            .with_file(&path)
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:9443");
        assert_eq!(config.server.proxy_protocol, ProxyProtocolMode::Auto);
        assert_eq!(config.auth.ticket.ttl_secs, 10);
        assert!(config.auth.ticket.enabled);
        assert_eq!(config.logging.level, "hermes=trace");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_json_file_and_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("hermes.json");
        std::fs::write(&json, r#"{"auth": {"ticket": {"enabled": false}}}"#).unwrap();
        let config = ConfigLoader::new().with_file(&json).unwrap().load().unwrap();
        assert!(!config.auth.ticket.enabled);

        let ini = dir.path().join("hermes.ini");
        std::fs::write(&ini, "x=1").unwrap();
        assert!(matches!(
            ConfigLoader::new().with_file(&ini),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_env_type_errors() {
        let mut loader = ConfigLoader::new();
        assert!(loader
            .apply_env_var("T__SERVER__MAX_CONTENT_LENGTH", "big", "T")
            .is_err());
        assert!(loader.apply_env_var("T__SERVER__KEEP_ALIVE", "maybe", "T").is_err());
        assert!(loader.apply_env_var("T__SERVER____X", "1", "T").is_err());
    }

    #[test]
    fn test_env_unknown_key_rejected_on_load() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("T__SERVER__HTTP2", "true", "T").unwrap();
        assert!(loader.load().is_err());
    }

    #[test]
    fn test_merge_replaces_arrays() {
        let mut base = serde_json::json!({"a": {"list": [1, 2], "keep": true}});
        merge(&mut base, serde_json::json!({"a": {"list": [3]}}));
        assert_eq!(base, serde_json::json!({"a": {"list": [3], "keep": true}}));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
