use crate::core::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the module used when a table declares none.
pub const DEFAULT_MODULE: &str = "default";

/// Location SQLite treats as a private in-memory database.
pub const MEMORY_HOST: &str = ":memory:";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Fallback block for modules without their own settings.
    pub default: Option<ModuleConfig>,
    #[serde(default)]
    pub modules: HashMap<String, ModuleConfig>,
}

/// Settings for one module, as written in the config file.
///
/// Required fields are optional here so a missing one surfaces as a
/// configuration error naming the module rather than a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    #[serde(default)]
    pub log: bool,
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub row_shape: RowShape,
}

/// How rows are rendered for output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowShape {
    /// Column name to value objects.
    #[default]
    Map,
    /// Values in select order.
    List,
}

/// Fully resolved settings for one module. Immutable once built.
#[derive(Clone)]
pub struct ConnectionDescriptor {
    pub module: String,
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    password: String,
    pub database: Option<String>,
    pub log: bool,
    pub log_file: Option<PathBuf>,
    pub row_shape: RowShape,
}

impl ConnectionDescriptor {
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Where SQLite should open the database.
    pub fn location(&self) -> PathBuf {
        match &self.database {
            Some(name) if self.host != MEMORY_HOST => Path::new(&self.host).join(name),
            _ => PathBuf::from(&self.host),
        }
    }

    /// The query log path, falling back to the user cache directory.
    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("tablegate")
                .join(format!("{}-queries.log", self.module))
        })
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("module", &self.module)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("log", &self.log)
            .field("log_file", &self.log_file)
            .field("row_shape", &self.row_shape)
            .finish()
    }
}

impl Config {
    /// Loads configuration from a TOML file at the given path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Config::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// `<config dir>/tablegate/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tablegate").join("config.toml"))
    }

    /// Resolves the settings for `module`: its own block, else the default
    /// block. Host, user and password must all be present.
    pub fn resolve(&self, module: &str) -> Result<ConnectionDescriptor> {
        let block = self
            .modules
            .get(module)
            .or(self.default.as_ref())
            .ok_or_else(|| {
                GatewayError::Config(format!(
                    "no settings for module '{}' and no default block",
                    module
                ))
            })?;

        let required = |field: &Option<String>, name: &str| {
            field.clone().ok_or_else(|| {
                GatewayError::Config(format!("module '{}' is missing '{}'", module, name))
            })
        };

        Ok(ConnectionDescriptor {
            module: module.to_string(),
            host: required(&block.host, "host")?,
            port: block.port,
            user: required(&block.user, "user")?,
            password: required(&block.password, "password")?,
            database: block.database.clone(),
            log: block.log,
            log_file: block.log_file.clone(),
            row_shape: block.row_shape,
        })
    }

    /// Single-module configuration for an in-memory database.
    pub fn in_memory() -> Config {
        Config {
            default: Some(ModuleConfig {
                host: Some(MEMORY_HOST.to_string()),
                user: Some("tablegate".to_string()),
                password: Some(String::new()),
                ..ModuleConfig::default()
            }),
            modules: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
[default]
host = "app.db"
user = "app"
password = "secret"

[modules.billing]
host = "/var/lib/app"
database = "billing.db"
port = 3306
user = "billing"
password = "hunter2"
log = true
log_file = "/var/log/app/billing.log"
row_shape = "list"

[modules.broken]
host = "broken.db"
user = "nobody"
"#;

    #[test]
    fn test_load_config_from_str() {
        let config = Config::from_toml(SAMPLE_CONFIG).expect("Failed to parse sample config");
        assert!(config.default.is_some());
        assert_eq!(config.modules.len(), 2);

        let billing = config.resolve("billing").unwrap();
        assert_eq!(billing.port, Some(3306));
        assert!(billing.log);
        assert_eq!(billing.row_shape, RowShape::List);
        assert_eq!(billing.location(), PathBuf::from("/var/lib/app/billing.db"));
        assert_eq!(billing.log_path(), PathBuf::from("/var/log/app/billing.log"));
    }

    #[test]
    fn test_resolve_falls_back_to_default_block() {
        let config = Config::from_toml(SAMPLE_CONFIG).unwrap();
        let reports = config.resolve("reports").unwrap();
        assert_eq!(reports.module, "reports");
        assert_eq!(reports.host, "app.db");
        assert!(!reports.log);
        assert_eq!(reports.row_shape, RowShape::Map);
        assert!(reports.log_path().ends_with("tablegate/reports-queries.log"));
    }

    #[test]
    fn test_resolve_without_any_block_fails() {
        let config = Config::from_toml("[modules.only]\nhost = \"a\"\nuser = \"u\"\npassword = \"p\"\n").unwrap();
        let err = config.resolve("other").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        assert!(err.to_string().contains("'other'"));
    }

    #[test]
    fn test_missing_required_field_fails_fast() {
        let config = Config::from_toml(SAMPLE_CONFIG).unwrap();
        let err = config.resolve("broken").unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_descriptor_debug_hides_password() {
        let config = Config::from_toml(SAMPLE_CONFIG).unwrap();
        let billing = config.resolve("billing").unwrap();
        assert_eq!(billing.password(), "hunter2");
        assert!(!format!("{:?}", billing).contains("hunter2"));
    }

    #[test]
    fn test_memory_host_ignores_database_name() {
        let config = Config::from_toml(
            "[default]\nhost = \":memory:\"\ndatabase = \"x.db\"\nuser = \"u\"\npassword = \"\"\n",
        )
        .unwrap();
        assert_eq!(config.resolve("any").unwrap().location(), PathBuf::from(":memory:"));
    }
}
