//! Loading pool configuration from properties, TOML and JSON sources

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use sluice_core::{Result, SluiceError};

use super::config::PoolConfig;

const KEY_DRIVER: &str = "driverName";
const KEY_URL: &str = "url";
const KEY_USERNAME: &str = "username";
const KEY_PASSWORD: &str = "userpwd";
const KEY_INIT_POOL_SIZE: &str = "initPoolSize";
const KEY_MAX_IDLE_TIME: &str = "maxIdleTime";
const KEY_MAX_POOL_SIZE: &str = "maxPoolSize";
const KEY_EVICTION_INTERVAL: &str = "evictionIntervalMs";
const KEY_ACQUIRE_TIMEOUT: &str = "acquireTimeoutMs";
const KEY_RETRY_INTERVAL: &str = "retryIntervalMs";

impl PoolConfig {
    /// Build a configuration from data-source style properties.
    ///
    /// `driverName`, `url`, `username`, `userpwd`, `initPoolSize`,
    /// `maxIdleTime` (seconds) and `maxPoolSize` are required.
    /// `evictionIntervalMs`, `acquireTimeoutMs` and `retryIntervalMs` are optional.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut config = PoolConfig::new(
            required(props, KEY_DRIVER)?,
            required(props, KEY_URL)?,
            required(props, KEY_USERNAME)?,
            required(props, KEY_PASSWORD)?,
        )
        .with_init_pool_size(number(props, KEY_INIT_POOL_SIZE)?)
        .with_max_idle_secs(number(props, KEY_MAX_IDLE_TIME)?)
        .with_max_pool_size(number(props, KEY_MAX_POOL_SIZE)?);

        if let Some(interval) = optional_number(props, KEY_EVICTION_INTERVAL)? {
            config = config.with_eviction_interval_ms(interval);
        }
        if let Some(timeout) = optional_number(props, KEY_ACQUIRE_TIMEOUT)? {
            config = config.with_acquire_timeout_ms(timeout);
        }
        if let Some(interval) = optional_number(props, KEY_RETRY_INTERVAL)? {
            config = config.with_retry_interval_ms(interval);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse `.properties` text and build a configuration from it.
    pub fn parse_properties(text: &str) -> Result<Self> {
        Self::from_properties(&parse_properties_text(text))
    }

    /// Deserialize a configuration from TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PoolConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Deserialize a configuration from JSON.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PoolConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, picking the format from its extension.
    ///
    /// Supported extensions are `properties`, `toml` and `json`.
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        tracing::debug!(extension = ?extension, "loading pool configuration");
        match extension.as_deref() {
            Some("properties") => Self::parse_properties(&text),
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            other => Err(SluiceError::Configuration(format!(
                "unsupported configuration file extension: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

/// Split `.properties` text into key/value pairs.
///
/// Accepts `key=value` and `key:value`; lines starting with `#` or `!` are
/// comments. Later duplicates win.
pub(crate) fn parse_properties_text(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_string(), value[1..].trim().to_string()))
        })
        .collect()
}

fn required(props: &HashMap<String, String>, key: &str) -> Result<String> {
    props
        .get(key)
        .cloned()
        .ok_or_else(|| SluiceError::Configuration(format!("missing required property `{}`", key)))
}

fn number<T: FromStr>(props: &HashMap<String, String>, key: &str) -> Result<T> {
    let raw = required(props, key)?;
    parse_number(key, &raw)
}

fn optional_number<T: FromStr>(props: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    props.get(key).map(|raw| parse_number(key, raw)).transpose()
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        SluiceError::Configuration(format!(
            "property `{}` must be a non-negative integer, got `{}`",
            key, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE: &str = "\
# data source
driverName=loopback
url = loopback://orders
username: app
userpwd=s3cret
initPoolSize=2
maxIdleTime=30
maxPoolSize=8
! tuning
evictionIntervalMs=250
";

    #[test]
    fn test_parse_properties_text() {
        let props = parse_properties_text(SAMPLE);
        assert_eq!(props.get("url").map(String::as_str), Some("loopback://orders"));
        assert_eq!(props.get("username").map(String::as_str), Some("app"));
        assert_eq!(props.len(), 8);
    }

    #[test]
    fn test_parse_properties_keeps_separators_in_values() {
        let props = parse_properties_text("url=postgres://host:5432/db?a=b");
        assert_eq!(
            props.get("url").map(String::as_str),
            Some("postgres://host:5432/db?a=b")
        );
    }

    #[test]
    fn test_config_from_properties() {
        let config = PoolConfig::parse_properties(SAMPLE).expect("valid properties");
        assert_eq!(config.driver(), "loopback");
        assert_eq!(config.password(), "s3cret");
        assert_eq!(config.init_pool_size(), 2);
        assert_eq!(config.max_pool_size(), 8);
        assert_eq!(config.max_idle(), Duration::from_secs(30));
        assert_eq!(config.eviction_interval(), Duration::from_millis(250));
        assert!(config.acquire_timeout().is_none());
    }

    #[test]
    fn test_missing_property_is_named() {
        let text = SAMPLE.replace("userpwd=s3cret\n", "");
        let err = PoolConfig::parse_properties(&text).unwrap_err();
        assert!(matches!(err, SluiceError::Configuration(_)));
        assert!(err.to_string().contains("userpwd"));
    }

    #[test]
    fn test_malformed_number_fails_fast() {
        let text = SAMPLE.replace("maxPoolSize=8", "maxPoolSize=eight");
        let err = PoolConfig::parse_properties(&text).unwrap_err();
        assert!(err.to_string().contains("maxPoolSize"));

        let text = SAMPLE.replace("initPoolSize=2", "initPoolSize=-1");
        assert!(PoolConfig::parse_properties(&text).is_err());
    }

    #[test]
    fn test_properties_are_validated() {
        let text = SAMPLE.replace("initPoolSize=2", "initPoolSize=9");
        let err = PoolConfig::parse_properties(&text).unwrap_err();
        assert!(err.to_string().contains("cannot exceed"));
    }

    #[test]
    fn test_config_from_toml_uses_defaults() {
        let config = PoolConfig::from_toml_str(
            r#"
            driver = "loopback"
            url = "loopback://orders"
            username = "app"
            password = "s3cret"
            max_pool_size = 4
            init_pool_size = 1
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.max_pool_size(), 4);
        assert_eq!(config.max_idle_secs(), 0);
        assert_eq!(config.eviction_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_from_json_accepts_property_names() {
        let config = PoolConfig::from_json_str(
            r#"{
                "driverName": "loopback",
                "url": "loopback://orders",
                "username": "app",
                "userpwd": "s3cret",
                "initPoolSize": 0,
                "maxPoolSize": 3,
                "maxIdleTime": 5,
                "acquireTimeoutMs": 1500
            }"#,
        )
        .expect("valid json");
        assert_eq!(config.init_pool_size(), 0);
        assert_eq!(config.max_idle(), Duration::from_secs(5));
        assert_eq!(config.acquire_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_load_picks_format_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");

        let path = dir.path().join("pool.properties");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(SAMPLE.as_bytes()).expect("write");
        let config = PoolConfig::load(&path).expect("load properties");
        assert_eq!(config.max_pool_size(), 8);

        let path = dir.path().join("pool.yaml");
        std::fs::write(&path, "driver: loopback").expect("write");
        let err = PoolConfig::load(&path).unwrap_err();
        assert!(matches!(err, SluiceError::Configuration(_)));
    }
}
