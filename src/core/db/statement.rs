/// Statement Cache Module
///
/// Memoizes prepared statements per connection, keyed by a hash of the SQL
/// text. The prepared handles live in the connection's own statement store,
/// whose eviction is switched off when the connection is opened; this cache
/// records which statements have been prepared and how often they are
/// reused.
///
/// Entries are never evicted or invalidated. The cache grows for the life
/// of the connection so a statement that was bound once keeps the same
/// prepared plan.

use crate::core::{GatewayError, Result};
use rusqlite::{CachedStatement, Connection};
use std::collections::HashMap;
use tracing::debug;

/// Capacity handed to the driver's statement store; effectively unbounded.
pub(crate) const UNBOUNDED: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Entry {
    sql: String,
    hits: u64,
}

#[derive(Debug, Default)]
pub struct StatementCache {
    entries: HashMap<u64, Entry>,
}

impl StatementCache {
    pub fn new() -> Self {
        StatementCache::default()
    }

    /// Returns the prepared statement for `sql`, preparing it on first use.
    pub fn prepare<'c>(&mut self, conn: &'c Connection, sql: &str) -> Result<CachedStatement<'c>> {
        let hash = hash_sql(sql);
        let hit = match self.entries.get_mut(&hash) {
            Some(entry) if entry.sql == sql => {
                entry.hits += 1;
                debug!(hash, hits = entry.hits, "statement cache hit");
                true
            }
            _ => false,
        };

        let stmt = conn
            .prepare_cached(sql)
            .map_err(|e| GatewayError::statement(sql, e))?;
        if !hit {
            debug!(hash, sql, "statement cache miss");
            self.entries.insert(
                hash,
                Entry {
                    sql: sql.to_string(),
                    hits: 0,
                },
            );
        }
        Ok(stmt)
    }

    /// Number of distinct statements prepared so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, sql: &str) -> bool {
        self.entries
            .get(&hash_sql(sql))
            .map_or(false, |entry| entry.sql == sql)
    }

    /// How many times `sql` was served from the cache.
    pub fn hits(&self, sql: &str) -> u64 {
        self.entries
            .get(&hash_sql(sql))
            .filter(|entry| entry.sql == sql)
            .map_or(0, |entry| entry.hits)
    }
}

/// FNV-1a over the SQL bytes.
fn hash_sql(sql: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
