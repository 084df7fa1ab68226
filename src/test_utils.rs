/// # Test Utilities Module
///
/// Fixtures shared by the unit and integration tests: managers over
/// isolated in-memory databases, a standard schema, and error assertions.

use crate::config::{Config, ModuleConfig, MEMORY_HOST};
use crate::core::db::{ConnectionManager, Database};
use crate::core::Result;
use std::path::Path;
use std::rc::Rc;

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub manager: ConnectionManager,
    pub db: Rc<Database>,
}

impl DatabaseFixture {
    /// A fresh in-memory database on the default module.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::in_memory())
    }

    /// An in-memory database whose queries are logged to `log_file`.
    pub fn logged(log_file: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.default = Some(ModuleConfig {
            host: Some(MEMORY_HOST.to_string()),
            user: Some("test".to_string()),
            password: Some("test".to_string()),
            log: true,
            log_file: Some(log_file.to_path_buf()),
            ..ModuleConfig::default()
        });
        Self::with_config(config)
    }

    fn with_config(config: Config) -> Result<Self> {
        let mut manager = ConnectionManager::new(config);
        let db = manager.connection(crate::config::DEFAULT_MODULE)?;
        Ok(DatabaseFixture { manager, db })
    }

    /// Create fixture with the standard schema
    pub fn with_schema() -> Result<Self> {
        let fixture = Self::new()?;
        fixture.setup_standard_schema()?;
        Ok(fixture)
    }

    /// Set up standard test schema
    pub fn setup_standard_schema(&self) -> Result<()> {
        for sql in [
            "CREATE TABLE items (
                pk INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT
            )",
            "CREATE TABLE accounts (
                pk INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                Active INTEGER NOT NULL DEFAULT 1,
                Deleted INTEGER NOT NULL DEFAULT 0,
                created TEXT,
                modified TEXT
            )",
        ] {
            self.db.execute(sql, &[])?;
        }
        Ok(())
    }
}

/// Error assertions
pub mod error_testing {
    /// Test that an error's message mentions `expected_message_fragment`
    pub fn assert_error_mentions<T, E>(
        result: &std::result::Result<T, E>,
        expected_message_fragment: &str,
        context: &str,
    ) where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => panic!("Expected an error but got Ok in {}", context),
            Err(e) => {
                let error_str = e.to_string();
                assert!(
                    error_str.to_lowercase().contains(&expected_message_fragment.to_lowercase()),
                    "Expected '{}' in error message '{}' context: {}",
                    expected_message_fragment,
                    error_str,
                    context
                );
            }
        }
    }
}
