/// Connection Management Module
///
/// One [`Database`] handle per named module, created lazily from
/// configuration by the [`ConnectionManager`] and shared behind `Rc`.
/// Each handle owns its driver connection, its statement cache, its query
/// log and its transaction depth counter.
///
/// Handles are single-threaded (`!Send`); a worker that needs its own
/// connections builds its own manager.

use super::query::{self, RawOutcome};
use super::schema::{TableSchema, COLUMNS_SQL, UNIQUE_INDEX_SQL};
use super::statement::{StatementCache, UNBOUNDED};
use crate::config::{Config, ConnectionDescriptor};
use crate::core::{GatewayError, Result};
use crate::query_log::{CallSite, Outcome, QueryLog};
use crate::value::{Row, Value};
use rusqlite::{CachedStatement, Connection};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// A live connection for one module.
pub struct Database {
    descriptor: ConnectionDescriptor,
    conn: Connection,
    statements: RefCell<StatementCache>,
    log: RefCell<Option<QueryLog>>,
    depth: Cell<usize>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("descriptor", &self.descriptor)
            .field("statements", &self.statement_count())
            .field("logging", &self.is_logging())
            .field("depth", &self.depth.get())
            .finish()
    }
}

impl Database {
    /// Opens the module's database and, when logging is requested, its
    /// query log.
    ///
    /// # Errors
    ///
    /// `GatewayError::Connection` with the driver's message if the database
    /// cannot be opened; `GatewayError::LogFile` if the log cannot be.
    pub fn open(descriptor: ConnectionDescriptor, force_logging: bool) -> Result<Self> {
        let connection_err = |e: rusqlite::Error| GatewayError::Connection {
            module: descriptor.module.clone(),
            message: e.to_string(),
        };
        let location = descriptor.location();
        let conn = Connection::open(&location).map_err(connection_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(connection_err)?;
        conn.set_prepared_statement_cache_capacity(UNBOUNDED);

        let log = if descriptor.log || force_logging {
            Some(QueryLog::open(&descriptor.log_path())?)
        } else {
            None
        };

        info!(
            module = %descriptor.module,
            location = %location.display(),
            logging = log.is_some(),
            "connected"
        );

        Ok(Database {
            descriptor,
            conn,
            statements: RefCell::new(StatementCache::new()),
            log: RefCell::new(log),
            depth: Cell::new(0),
        })
    }

    pub fn module(&self) -> &str {
        &self.descriptor.module
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Distinct statements prepared on this connection.
    pub fn statement_count(&self) -> usize {
        self.statements.borrow().len()
    }

    /// How many times `sql` was served from the statement cache.
    pub fn statement_hits(&self, sql: &str) -> u64 {
        self.statements.borrow().hits(sql)
    }

    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    // ---- query log ----

    /// Activates the query log, opening it on first use.
    pub fn start_logging(&self) -> Result<()> {
        let mut log = self.log.borrow_mut();
        match log.as_mut() {
            Some(log) => log.set_active(true),
            None => *log = Some(QueryLog::open(&self.descriptor.log_path())?),
        }
        info!(module = %self.module(), "query logging started");
        Ok(())
    }

    pub fn stop_logging(&self) {
        if let Some(log) = self.log.borrow_mut().as_mut() {
            log.set_active(false);
            info!(module = %self.module(), "query logging stopped");
        }
    }

    pub fn is_logging(&self) -> bool {
        self.log.borrow().as_ref().map_or(false, QueryLog::is_active)
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log.borrow().as_ref().map(|log| log.path().to_path_buf())
    }

    // ---- raw pass-through ----

    /// Runs a fully formed statement that produces rows, unmodified.
    #[track_caller]
    pub fn query(&self, sql: &str, values: &[Value]) -> Result<Vec<Row>> {
        self.fetch(CallSite::here("Database::query"), None, sql, values)
    }

    /// Runs a fully formed statement that changes data, unmodified.
    #[track_caller]
    pub fn execute(&self, sql: &str, values: &[Value]) -> Result<usize> {
        self.run(CallSite::here("Database::execute"), None, sql, values)
    }

    /// Runs any statement, returning rows when it has result columns and
    /// the affected count otherwise.
    #[track_caller]
    pub fn raw(&self, sql: &str, values: &[Value]) -> Result<RawOutcome> {
        let site = CallSite::here("Database::raw");
        let has_columns = match self.prepare(sql) {
            Ok(stmt) => stmt.column_count() > 0,
            Err(e) => {
                if let Err(log_err) = self.log_outcome(&site, None, sql, values, Err(&e)) {
                    warn!(module = %self.module(), error = %log_err, "query log write failed");
                }
                return Err(e);
            }
        };
        if has_columns {
            Ok(RawOutcome::Rows(self.fetch(site, None, sql, values)?))
        } else {
            let rows = self.run(site, None, sql, values)?;
            Ok(RawOutcome::Affected {
                rows,
                last_insert_id: self.last_insert_id(),
            })
        }
    }

    // ---- schema ----

    /// Column metadata for `table`.
    #[track_caller]
    pub fn table_schema(&self, table: &str) -> Result<TableSchema> {
        self.describe(CallSite::here("Database::table_schema"), table)
    }

    pub(crate) fn describe(&self, site: CallSite, table: &str) -> Result<TableSchema> {
        let name = [Value::from(table)];
        let columns = self.fetch(site, Some(table), COLUMNS_SQL, &name)?;
        if columns.is_empty() {
            return Err(GatewayError::statement(
                COLUMNS_SQL,
                format!("no such table: {}", table),
            ));
        }
        let unique = self.fetch(site, Some(table), UNIQUE_INDEX_SQL, &name)?;
        Ok(TableSchema::from_rows(table, &columns, &unique))
    }

    // ---- transactions ----

    /// Current nesting depth; 0 outside any transaction.
    pub fn transaction_depth(&self) -> usize {
        self.depth.get()
    }

    /// Whether a database-level transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Enters a transaction. Only the outermost call issues BEGIN.
    #[track_caller]
    pub fn begin(&self) -> Result<()> {
        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        if depth == 1 {
            if let Err(e) = self.run(CallSite::here("Database::begin"), None, "BEGIN", &[]) {
                self.depth.set(0);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Leaves a transaction. Only the outermost call issues COMMIT.
    #[track_caller]
    pub fn commit(&self) -> Result<()> {
        self.finish(CallSite::here("Database::commit"), "COMMIT")
    }

    /// Leaves a transaction. Only the outermost call issues ROLLBACK; an
    /// inner rollback just lowers the depth and cannot undo work on its own.
    #[track_caller]
    pub fn rollback(&self) -> Result<()> {
        self.finish(CallSite::here("Database::rollback"), "ROLLBACK")
    }

    /// Runs `f` inside a transaction, committing on `Ok` and rolling back
    /// on `Err`.
    #[track_caller]
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(module = %self.module(), error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn finish(&self, site: CallSite, sql: &str) -> Result<()> {
        let depth = self.depth.get();
        // the depth drops even if the statement fails
        self.depth.set(depth.saturating_sub(1));
        if depth == 1 {
            if let Err(e) = self.run(site, None, sql, &[]) {
                warn!(module = %self.module(), statement = sql, error = %e, "transaction end failed");
                return Err(e);
            }
        }
        Ok(())
    }

    // ---- execution ----

    fn prepare(&self, sql: &str) -> Result<CachedStatement<'_>> {
        self.statements.borrow_mut().prepare(&self.conn, sql)
    }

    pub(crate) fn fetch(
        &self,
        site: CallSite,
        table: Option<&str>,
        sql: &str,
        values: &[Value],
    ) -> Result<Vec<Row>> {
        debug!(module = %self.module(), sql, params = values.len(), "query");
        let result = self.prepare(sql).and_then(|mut stmt| {
            query::collect_rows(&mut stmt, values).map_err(|e| GatewayError::statement(sql, e))
        });
        let logged = self.log_outcome(&site, table, sql, values, result.as_ref().map(Vec::len));
        let rows = result?;
        logged?;
        Ok(rows)
    }

    pub(crate) fn run(
        &self,
        site: CallSite,
        table: Option<&str>,
        sql: &str,
        values: &[Value],
    ) -> Result<usize> {
        debug!(module = %self.module(), sql, params = values.len(), "execute");
        let result = self.prepare(sql).and_then(|mut stmt| {
            query::execute(&mut stmt, values).map_err(|e| GatewayError::statement(sql, e))
        });
        let logged = self.log_outcome(&site, table, sql, values, result.as_ref().copied());
        let affected = result?;
        logged?;
        Ok(affected)
    }

    fn log_outcome(
        &self,
        site: &CallSite,
        table: Option<&str>,
        sql: &str,
        values: &[Value],
        result: std::result::Result<usize, &GatewayError>,
    ) -> Result<()> {
        let mut log = self.log.borrow_mut();
        let Some(log) = log.as_mut() else {
            return Ok(());
        };
        match result {
            Ok(n) => log.record(self.module(), site, table, sql, values, Outcome::Rows(n)),
            Err(GatewayError::Statement { message, .. }) => {
                log.record(self.module(), site, table, sql, values, Outcome::Error(message))
            }
            Err(other) => {
                let message = other.to_string();
                log.record(self.module(), site, table, sql, values, Outcome::Error(&message))
            }
        }
    }
}

/// Owns one [`Database`] per module and the process-wide logging override.
#[derive(Debug)]
pub struct ConnectionManager {
    config: Config,
    databases: HashMap<String, Rc<Database>>,
    force_logging: bool,
}

impl ConnectionManager {
    pub fn new(config: Config) -> Self {
        ConnectionManager {
            config,
            databases: HashMap::new(),
            force_logging: false,
        }
    }

    /// Loads the TOML configuration at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(ConnectionManager::new(Config::load(path)?))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the module's handle, connecting on first use.
    pub fn connection(&mut self, module: &str) -> Result<Rc<Database>> {
        if let Some(db) = self.databases.get(module) {
            return Ok(Rc::clone(db));
        }
        let descriptor = self.config.resolve(module)?;
        let db = Rc::new(Database::open(descriptor, self.force_logging)?);
        self.databases.insert(module.to_string(), Rc::clone(&db));
        Ok(db)
    }

    /// Connected modules, sorted by name.
    pub fn modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.databases.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_connected(&self, module: &str) -> bool {
        self.databases.contains_key(module)
    }

    /// Starts query logging for one module (connecting it if needed), or
    /// for every connected module plus any connected later.
    pub fn start_logging(&mut self, module: Option<&str>) -> Result<()> {
        match module {
            Some(module) => self.connection(module)?.start_logging(),
            None => {
                self.force_logging = true;
                for db in self.databases.values() {
                    db.start_logging()?;
                }
                Ok(())
            }
        }
    }

    /// Stops query logging for one module, or for every connected module.
    /// Modules connected afterwards follow their own configuration.
    pub fn stop_logging(&mut self, module: Option<&str>) {
        match module {
            Some(module) => {
                if let Some(db) = self.databases.get(module) {
                    db.stop_logging();
                }
            }
            None => {
                self.force_logging = false;
                for db in self.databases.values() {
                    db.stop_logging();
                }
            }
        }
    }

    pub fn is_forcing_logging(&self) -> bool {
        self.force_logging
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleConfig;
    use std::fs;
    use tempfile::tempdir;

    fn module(host: &str, log_file: Option<PathBuf>, log: bool) -> ModuleConfig {
        ModuleConfig {
            host: Some(host.to_string()),
            user: Some("test".to_string()),
            password: Some("test".to_string()),
            log,
            log_file,
            ..ModuleConfig::default()
        }
    }

    #[test]
    fn test_connection_is_cached_per_module() {
        let mut manager = ConnectionManager::new(Config::in_memory());
        assert!(!manager.is_connected("default"));

        let first = manager.connection("default").unwrap();
        let again = manager.connection("default").unwrap();
        assert!(Rc::ptr_eq(&first, &again));

        let other = manager.connection("reports").unwrap();
        assert!(!Rc::ptr_eq(&first, &other));
        assert_eq!(other.module(), "reports");
        assert_eq!(manager.modules(), vec!["default", "reports"]);
    }

    #[test]
    fn test_unresolvable_module_is_config_error() {
        let mut manager = ConnectionManager::new(Config::default());
        match manager.connection("default").unwrap_err() {
            GatewayError::Config(_) => {}
            other => panic!("Expected Config error, got {:?}", other),
        }
        assert!(!manager.is_connected("default"));
    }

    #[test]
    fn test_connection_error_handling() {
        let mut config = Config::default();
        config.default = Some(module("/nonexistent/path/database.db", None, false));
        let mut manager = ConnectionManager::new(config);

        match manager.connection("default").unwrap_err() {
            GatewayError::Connection { module, message } => {
                assert_eq!(module, "default");
                assert!(!message.is_empty());
            }
            other => panic!("Expected Connection error, got {:?}", other),
        }
    }

    #[test]
    fn test_log_file_failure_is_distinct() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        let mut config = Config::default();
        config.default = Some(module(":memory:", Some(blocker.join("q.log")), true));
        let mut manager = ConnectionManager::new(config);

        match manager.connection("default").unwrap_err() {
            GatewayError::LogFile { .. } => {}
            other => panic!("Expected LogFile error, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_transactions_reach_database_once() {
        let mut manager = ConnectionManager::new(Config::in_memory());
        let db = manager.connection("default").unwrap();
        db.execute("CREATE TABLE t (pk INTEGER PRIMARY KEY)", &[]).unwrap();

        db.begin().unwrap();
        db.begin().unwrap();
        assert_eq!(db.transaction_depth(), 2);
        db.execute("INSERT INTO t DEFAULT VALUES", &[]).unwrap();

        db.rollback().unwrap();
        assert_eq!(db.transaction_depth(), 1);
        assert!(db.in_transaction(), "inner rollback must not end the transaction");

        db.rollback().unwrap();
        assert_eq!(db.transaction_depth(), 0);
        assert!(!db.in_transaction());

        // the one real ROLLBACK discarded the insert
        assert!(db.query("SELECT * FROM t", &[]).unwrap().is_empty());
        // BEGIN and ROLLBACK each reached the database exactly once
        assert_eq!(db.statement_hits("BEGIN"), 0);
        assert_eq!(db.statement_hits("ROLLBACK"), 0);
    }

    #[test]
    fn test_depth_never_goes_negative() {
        let mut manager = ConnectionManager::new(Config::in_memory());
        let db = manager.connection("default").unwrap();
        db.commit().unwrap();
        db.rollback().unwrap();
        assert_eq!(db.transaction_depth(), 0);
    }

    #[test]
    fn test_failed_commit_still_decrements() {
        let mut manager = ConnectionManager::new(Config::in_memory());
        let db = manager.connection("default").unwrap();
        db.execute("CREATE TABLE parent (pk INTEGER PRIMARY KEY)", &[]).unwrap();
        db.execute(
            "CREATE TABLE child (pk INTEGER PRIMARY KEY,
                 parent INTEGER REFERENCES parent (pk) DEFERRABLE INITIALLY DEFERRED)",
            &[],
        )
        .unwrap();

        db.begin().unwrap();
        db.execute("INSERT INTO child (parent) VALUES (99)", &[]).unwrap();
        let err = db.commit().unwrap_err();
        assert!(matches!(err, GatewayError::Statement { .. }));
        assert_eq!(db.transaction_depth(), 0);
        db.execute("ROLLBACK", &[]).unwrap();
    }

    #[test]
    fn test_transaction_helper() {
        let mut manager = ConnectionManager::new(Config::in_memory());
        let db = manager.connection("default").unwrap();
        db.execute("CREATE TABLE t (pk INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();

        let result: Result<()> = db.transaction(|db| {
            db.execute("INSERT INTO t (name) VALUES (?)", &[Value::from("gone")])?;
            Err(GatewayError::Argument("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(db.transaction_depth(), 0);

        let id = db
            .transaction(|db| {
                db.execute("INSERT INTO t (name) VALUES (?)", &[Value::from("kept")])?;
                Ok(db.last_insert_id())
            })
            .unwrap();
        let rows = db.query("SELECT name FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("kept")));
        assert!(id > 0);
    }

    #[test]
    fn test_raw_dispatches_on_result_columns() {
        let mut manager = ConnectionManager::new(Config::in_memory());
        let db = manager.connection("default").unwrap();
        db.execute("CREATE TABLE t (pk INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();

        let outcome = db.raw("INSERT INTO t (name) VALUES (?)", &[Value::from("x")]).unwrap();
        assert_eq!(outcome, RawOutcome::Affected { rows: 1, last_insert_id: 1 });

        match db.raw("SELECT name FROM t", &[]).unwrap() {
            RawOutcome::Rows(rows) => assert_eq!(rows[0].get("name"), Some(&Value::from("x"))),
            other => panic!("Expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_table_schema_of_missing_table() {
        let mut manager = ConnectionManager::new(Config::in_memory());
        let db = manager.connection("default").unwrap();
        let err = db.table_schema("missing").unwrap_err();
        assert!(err.to_string().contains("no such table: missing"));
    }

    #[test]
    fn test_logging_toggles() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.default = Some(module(":memory:", None, false));
        config
            .modules
            .insert("audit".to_string(), module(":memory:", Some(dir.path().join("audit.log")), false));
        config
            .modules
            .insert("late".to_string(), module(":memory:", Some(dir.path().join("late.log")), false));
        let mut manager = ConnectionManager::new(config);

        // one module
        manager.start_logging(Some("audit")).unwrap();
        let audit = manager.connection("audit").unwrap();
        assert!(audit.is_logging());
        audit.query("SELECT 1 AS one", &[]).unwrap();
        let content = fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert!(content.contains("SELECT 1 AS one"));
        assert!(content.contains("connection.rs"));

        manager.stop_logging(Some("audit"));
        assert!(!audit.is_logging());

        // the blanket override reaches modules connected later
        manager.start_logging(None).unwrap();
        assert!(manager.is_forcing_logging());
        assert!(audit.is_logging());
        let late = manager.connection("late").unwrap();
        assert!(late.is_logging());

        // stopping everything clears the override
        manager.stop_logging(None);
        assert!(!audit.is_logging());
        assert!(!late.is_logging());
        assert!(!manager.is_forcing_logging());
    }

    #[test]
    fn test_failed_statement_is_logged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.log");
        let mut config = Config::default();
        config.default = Some(module(":memory:", Some(path.clone()), true));
        let mut manager = ConnectionManager::new(config);
        let db = manager.connection("default").unwrap();

        assert!(db.query("SELECT * FROM nowhere", &[]).is_err());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("SELECT * FROM nowhere"));
        assert!(content.contains("error: no such table: nowhere"));
    }

    #[test]
    fn test_raw_statement_rejected_at_prepare_is_logged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.log");
        let mut config = Config::default();
        config.default = Some(module(":memory:", Some(path.clone()), true));
        let mut manager = ConnectionManager::new(config);
        let db = manager.connection("default").unwrap();

        let err = db.raw("SELEC oops", &[]).unwrap_err();
        assert!(matches!(err, GatewayError::Statement { .. }));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("(Database::raw)\nSELEC oops\n   error: "));
        assert!(content.contains("syntax error"));
    }
}
