use std::fmt;
use std::sync::OnceLock;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

/// Well-known secret variables and the config keys they override.
const SECRET_ENV: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "inference.api_key"),
    ("SUPABASE_URL", "store.url"),
    ("SUPABASE_SERVICE_ROLE_KEY", "store.service_key"),
    ("SUPABASE_ANON_KEY", "store.anon_key"),
    ("DATABASE_URL", "store.database.url"),
];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AidviseConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub symptoms: SymptomsConfig,
}

/// A credential read from configuration. `Debug` never prints the value.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Secret(<unset>)")
        } else {
            f.write_str("Secret(<redacted>)")
        }
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default)]
    pub api_key: Secret,
    #[serde(default = "default_inference_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: Secret::default(),
            base_url: default_inference_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgrest,
    Postgres,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Postgrest => "postgrest",
            StoreBackend::Postgres => "postgres",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Supabase project URL, e.g. `https://<ref>.supabase.co`
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub service_key: Secret,
    #[serde(default)]
    pub anon_key: Secret,
    #[serde(default = "default_symptom_table")]
    pub symptom_table: String,
    #[serde(default = "default_health_table")]
    pub health_table: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: String::new(),
            service_key: Secret::default(),
            anon_key: Secret::default(),
            symptom_table: default_symptom_table(),
            health_table: default_health_table(),
            timeout_seconds: default_timeout_seconds(),
            database: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Secret,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SymptomsConfig {
    pub min_length: usize,
}

impl Default for SymptomsConfig {
    fn default() -> Self {
        Self { min_length: 3 }
    }
}

fn default_inference_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.5
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_symptom_table() -> String {
    "symptom_logs".to_string()
}

fn default_health_table() -> String {
    "health_logs".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// True when `name` can be spliced into SQL and REST paths as a bare table name.
pub fn is_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"))
        .is_match(name)
}

impl AidviseConfig {
    /// Load from an optional TOML file, `AIDVISE__*` variables and the
    /// well-known secret variables, in increasing precedence.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("AIDVISE")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::finish(builder, |key| std::env::var(key).ok())
    }

    /// Load from TOML text with secrets resolved through `env`.
    pub fn from_toml_str(
        toml: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(builder, env)
    }

    fn finish(
        mut builder: ConfigBuilder<DefaultState>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        for (var, key) in SECRET_ENV {
            let value = env(var).filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inference.api_key.is_empty() {
            return Err(ConfigError::NotFound("inference.api_key".to_string()));
        }
        if !self.inference.base_url.starts_with("http://")
            && !self.inference.base_url.starts_with("https://")
        {
            return Err(ConfigError::Message(
                "inference.base_url must start with http:// or https://".to_string(),
            ));
        }
        if self.symptoms.min_length == 0 {
            return Err(ConfigError::Message(
                "symptoms.min_length must be at least 1".to_string(),
            ));
        }

        for table in [&self.store.symptom_table, &self.store.health_table] {
            if !is_identifier(table) {
                return Err(ConfigError::Message(format!(
                    "store table name '{}' is not a plain identifier",
                    table
                )));
            }
        }

        match self.store.backend {
            StoreBackend::Postgrest => {
                if self.store.url.trim().is_empty() {
                    return Err(ConfigError::NotFound("store.url".to_string()));
                }
                if self.store.service_key.is_empty() {
                    return Err(ConfigError::NotFound("store.service_key".to_string()));
                }
            }
            StoreBackend::Postgres => {
                let missing = self
                    .store
                    .database
                    .as_ref()
                    .map_or(true, |db| db.url.is_empty());
                if missing {
                    return Err(ConfigError::NotFound("store.database.url".to_string()));
                }
            }
        }

        Ok(())
    }
}
