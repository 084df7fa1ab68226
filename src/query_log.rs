//! Append-only file log of executed statements.
//!
//! Each statement becomes one block:
//!
//! ```text
//! -- 2026-10-18T12:00:00.000+00:00 [default]
//!    at src/app.rs:42:9 (Gateway::insert users)
//! INSERT INTO "users" ("name") VALUES (?)
//!    values: ["insert"]
//!    rows: 1
//! ```
//!
//! The `at` line is the call trace trimmed to a single frame: whoever
//! called the public gateway or database method, captured through
//! `#[track_caller]`. Frames inside the crate are never recorded.
use crate::core::{GatewayError, Result};
use crate::value::Value;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::panic::Location;
use std::path::{Path, PathBuf};

/// Where a statement was issued from, most specific first.
#[derive(Debug, Clone, Copy)]
pub struct CallSite {
    pub location: &'static Location<'static>,
    pub operation: &'static str,
}

impl CallSite {
    #[track_caller]
    pub fn here(operation: &'static str) -> Self {
        CallSite {
            location: Location::caller(),
            operation,
        }
    }
}

/// What happened to a logged statement.
#[derive(Debug)]
pub enum Outcome<'a> {
    Rows(usize),
    Error(&'a str),
}

#[derive(Debug)]
pub struct QueryLog {
    path: PathBuf,
    file: File,
    active: bool,
}

impl QueryLog {
    /// Opens `path` for appending, creating it and its parent directory.
    pub fn open(path: &Path) -> Result<Self> {
        let log_err = |source| GatewayError::LogFile {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(log_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(log_err)?;

        Ok(QueryLog {
            path: path.to_path_buf(),
            file,
            active: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Appends one statement block. Does nothing while inactive.
    pub fn record(
        &mut self,
        module: &str,
        site: &CallSite,
        table: Option<&str>,
        sql: &str,
        values: &[Value],
        outcome: Outcome<'_>,
    ) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let block = format_block(module, site, table, sql, values, outcome);
        self.file
            .write_all(block.as_bytes())
            .map_err(|source| GatewayError::LogFile {
                path: self.path.clone(),
                source,
            })
    }
}

fn format_block(
    module: &str,
    site: &CallSite,
    table: Option<&str>,
    sql: &str,
    values: &[Value],
    outcome: Outcome<'_>,
) -> String {
    let mut block = format!(
        "-- {} [{}]\n   at {}:{}:{} ({}",
        chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false),
        module,
        site.location.file(),
        site.location.line(),
        site.location.column(),
        site.operation,
    );
    if let Some(table) = table {
        block.push(' ');
        block.push_str(table);
    }
    block.push_str(")\n");
    block.push_str(sql.trim());
    block.push('\n');
    if !values.is_empty() {
        let rendered = serde_json::to_string(values).unwrap_or_else(|_| format!("{:?}", values));
        block.push_str(&format!("   values: {}\n", rendered));
    }
    match outcome {
        Outcome::Rows(n) => block.push_str(&format!("   rows: {}\n", n)),
        Outcome::Error(message) => block.push_str(&format!("   error: {}\n", message)),
    }
    block
}
