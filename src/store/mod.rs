pub mod loader;
pub mod query;

pub use loader::{BatchResult, Loader};
pub use query::{
    run_query, AggregateFn, Aggregation, FilterOp, FilterPredicate, QuerySpec, ResultRow,
};

use std::path::PathBuf;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EtlError, Result};

/// Backend selection for the persisted table, as supplied by the request
/// envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// File-backed embedded engine.
    Embedded { path: PathBuf },
    /// A networked server. Recognized so envelopes stay portable across
    /// deployments, but this build bundles only the embedded engine; see
    /// DESIGN.md.
    Networked {
        endpoint: String,
        database: String,
        user: String,
        #[serde(default)]
        password: String,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Embedded {
            path: PathBuf::from("transformed_data.db"),
        }
    }
}

/// A per-invocation handle on the persisted table.
///
/// Acquired for the duration of one call and released when dropped, on every
/// exit path; never held across invocations. The underlying engine owns
/// locking, so no locking happens here.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::Embedded { path } => {
                let conn = Connection::open(path).map_err(|e| {
                    EtlError::Storage(format!("opening embedded store `{}`: {e}", path.display()))
                })?;
                debug!(path = %path.display(), "opened embedded store");
                Ok(Self { conn })
            }
            StoreConfig::Networked { endpoint, .. } => Err(EtlError::Storage(format!(
                "networked backend `{endpoint}` requires an external connection provider; \
                 this build bundles the embedded engine"
            ))),
        }
    }

    /// In-memory store, for tests.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
