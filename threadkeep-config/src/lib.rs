//! Loader for threadkeep configuration with YAML + environment overlays.
//!
//! Sources are merged in order: an optional YAML file (`threadkeep.yaml` by
//! default), inline YAML snippets, then `THREADKEEP__`-prefixed environment
//! variables using `__` as the nesting separator
//! (`THREADKEEP__SERVER__BIND=0.0.0.0:9000`). After merging, every string is
//! run through `${VAR}` expansion so secrets can stay in the environment.
//! Every section has defaults, so an empty configuration is valid.
//!
//! Environment values arrive as text. Numeric and boolean fields parse them,
//! list fields split them on commas, and secret fields keep digit-only or
//! `true`-looking values verbatim.
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use threadkeep_common::LogFormat;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

pub const DEFAULT_CONFIG_FILE: &str = "threadkeep.yaml";
pub const DEFAULT_PROVIDER_URL: &str = "https://api.twitterapi.io";
pub const DEFAULT_MAX_THREAD_PAGES: u32 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThreadkeepConfig {
    pub version: Option<String>,
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

/// Proxy server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub database_url: String,
    /// Allowed CORS origins; `*` allows any.
    #[serde(deserialize_with = "lenient::comma_list")]
    pub cors_origins: Vec<String>,
    pub provider: ProviderConfig,
    pub thread: ThreadConfig,
    /// Required for the API key sync routes.
    pub crypto: Option<CryptoConfig>,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".into(),
            database_url: "sqlite://threadkeep-server.db?mode=rwc".into(),
            cors_origins: vec!["*".into()],
            provider: ProviderConfig::default(),
            thread: ThreadConfig::default(),
            crypto: None,
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Fallback key used when a request carries none and the caller has none stored.
    #[serde(deserialize_with = "lenient::text_opt")]
    pub api_key: Option<String>,
    #[serde(deserialize_with = "lenient::parsed")]
    pub timeout_secs: u64,
    #[serde(deserialize_with = "lenient::parsed")]
    pub retries: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_URL.into(),
            api_key: None,
            timeout_secs: 15,
            retries: 2,
        }
    }
}

impl ProviderConfig {
    pub fn api_key(&self) -> Option<&str> {
        resolved_secret(self.api_key.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Upper bound on provider pages fetched per thread request.
    #[serde(deserialize_with = "lenient::parsed")]
    pub max_pages: u32,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_THREAD_PAGES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoConfig {
    #[serde(default = "default_key_id")]
    pub key_id: String,
    /// Base64 encoded 32-byte key.
    #[serde(deserialize_with = "lenient::text")]
    pub key: String,
}

fn default_key_id() -> String {
    "v1".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenGrant>,
}

/// Maps an opaque bearer token to the user id it authenticates.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    #[serde(deserialize_with = "lenient::text")]
    pub token: String,
    #[serde(deserialize_with = "lenient::text")]
    pub user_id: String,
}

/// Terminal client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub proxy_url: String,
    pub database_url: String,
    /// Provider key sent to the proxy as `X-API-Key`; overrides a pulled key.
    #[serde(deserialize_with = "lenient::text_opt")]
    pub api_key: Option<String>,
    /// Bearer token for the proxy's key sync routes.
    #[serde(deserialize_with = "lenient::text_opt")]
    pub auth_token: Option<String>,
    #[serde(deserialize_with = "lenient::parsed")]
    pub thread_cache_ttl_secs: u64,
    #[serde(deserialize_with = "lenient::parsed_opt")]
    pub max_pages: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: "http://127.0.0.1:8787".into(),
            database_url: "sqlite://threadkeep.db?mode=rwc".into(),
            api_key: None,
            auth_token: None,
            thread_cache_ttl_secs: 24 * 60 * 60,
            max_pages: None,
        }
    }
}

impl ClientConfig {
    pub fn api_key(&self) -> Option<&str> {
        resolved_secret(self.api_key.as_deref())
    }

    pub fn auth_token(&self) -> Option<&str> {
        resolved_secret(self.auth_token.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    #[serde(deserialize_with = "lenient::parsed")]
    pub emit_stderr: bool,
    pub filter: String,
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: false,
            filter: "info".into(),
            dir: None,
        }
    }
}

/// Empty strings and placeholders whose variable was never set count as absent.
fn resolved_secret(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && !s.contains("${"))
}

/// Field deserializers that accept both YAML-typed values and env text.
mod lenient {
    use serde::{Deserialize, Deserializer, de::DeserializeOwned, de::Error};
    use serde_json::Value;
    use std::{fmt::Display, str::FromStr};

    pub fn parsed<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + FromStr,
        T::Err: Display,
    {
        match Value::deserialize(d)? {
            Value::String(s) => s.trim().parse().map_err(D::Error::custom),
            other => T::deserialize(other).map_err(D::Error::custom),
        }
    }

    pub fn parsed_opt<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + FromStr,
        T::Err: Display,
    {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s.trim().parse().map(Some).map_err(D::Error::custom),
            other => T::deserialize(other).map(Some).map_err(D::Error::custom),
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        text_opt(d)?.ok_or_else(|| D::Error::custom("expected a string, found null"))
    }

    pub fn text_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            other => Err(D::Error::custom(format!("expected a string, found {other}"))),
        }
    }

    pub fn comma_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::String(s) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()),
            other => Vec::<String>::deserialize(other).map_err(D::Error::custom),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring (YAML + env overrides).
pub struct ThreadkeepConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for ThreadkeepConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadkeepConfigLoader {
    /// Start with an empty configuration; env overrides are applied last in [`load`](Self::load).
    ///
    /// ```
    /// use threadkeep_config::ThreadkeepConfigLoader;
    ///
    /// let config = ThreadkeepConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.server.thread.max_pages, 10);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist; format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is skipped when missing, for env-only deployments.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use threadkeep_config::ThreadkeepConfigLoader;
    ///
    /// let cfg = ThreadkeepConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// server:
    ///   bind: "0.0.0.0:9000"
    ///   auth:
    ///     tokens:
    ///       - token: "t-1"
    ///         user_id: "alice"
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.server.bind, "0.0.0.0:9000");
    /// assert_eq!(cfg.server.auth.tokens[0].user_id, "alice");
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Merge sources, expand `${VAR}` placeholders, and deserialize.
    ///
    /// ```
    /// use threadkeep_config::ThreadkeepConfigLoader;
    ///
    /// unsafe { std::env::set_var("TK_DOC_PROVIDER_KEY", "injected-from-env"); }
    ///
    /// let config = ThreadkeepConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// server:
    ///   provider:
    ///     api_key: "${TK_DOC_PROVIDER_KEY}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.server.provider.api_key(), Some("injected-from-env"));
    /// assert_eq!(config.server.provider.base_url, "https://api.twitterapi.io");
    ///
    /// unsafe { std::env::remove_var("TK_DOC_PROVIDER_KEY"); }
    /// ```
    pub fn load(self) -> Result<ThreadkeepConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("THREADKEEP").separator("__"),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: ThreadkeepConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}

impl ThreadkeepConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.thread.max_pages == 0 {
            return Err(ConfigError::Message(
                "server.thread.max_pages must be at least 1".into(),
            ));
        }
        if let Some(grant) = self
            .server
            .auth
            .tokens
            .iter()
            .find(|g| g.token.trim().is_empty() || g.user_id.trim().is_empty())
        {
            return Err(ConfigError::Message(format!(
                "server.auth.tokens entry for user `{}` has an empty token or user_id",
                grant.user_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("TK_FOO", Some("bar"), || {
            let mut v = json!("prefix-${TK_FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("TK_CITY", Some("Winston")), ("TK_STATE", Some("NC"))], || {
            let mut v = json!([
                "hello-$TK_CITY",
                { "loc": "${TK_CITY}-${TK_STATE}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["hello-Winston", { "loc": "Winston-NC" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("TK_BAZ", Some("qux")),
                ("TK_BAR", Some("mid-${TK_BAZ}")),
                ("TK_FOO", Some("start-${TK_BAR}-end")),
            ],
            || {
                let mut v = json!("X=${TK_FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("TK_A", Some("${TK_B}")), ("TK_B", Some("${TK_A}"))], || {
            let mut v = json!("x=${TK_A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unresolved_placeholders_are_not_secrets() {
        assert_eq!(resolved_secret(Some("${TK_MISSING}")), None);
        assert_eq!(resolved_secret(Some("   ")), None);
        assert_eq!(resolved_secret(Some(" key ")), Some("key"));
        assert_eq!(resolved_secret(None), None);
    }

    #[test]
    fn zero_max_pages_is_rejected() {
        let err = ThreadkeepConfigLoader::new()
            .with_yaml_str("server:\n  thread:\n    max_pages: 0\n")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("max_pages"));
    }
}
