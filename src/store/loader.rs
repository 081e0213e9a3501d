use rusqlite::{params, Statement};
use serde::Serialize;
use tracing::info;

use super::Store;
use crate::error::{EtlError, Result};
use crate::schema::{self, CanonicalRecord};

/// Outcome of a batch upsert. Duplicate-key conflicts are expected and
/// counted, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub inserted: usize,
    pub skipped: usize,
}

/// The single writer of the persisted table.
///
/// Conflict policy is insert-or-ignore: the first writer for a given order
/// id wins for the lifetime of the table, matching the transformer's
/// first-occurrence dedup. See DESIGN.md for the policy decision.
pub struct Loader<'a> {
    store: &'a mut Store,
}

impl<'a> Loader<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// Apply the table definition if it is not already present. Safe to call
    /// on every invocation.
    pub fn ensure_schema(&self) -> Result<()> {
        self.store
            .conn()
            .execute_batch(schema::create_table_sql())
            .map_err(|e| EtlError::Schema(format!("applying `{}`: {e}", schema::TABLE_NAME)))
    }

    /// Insert one record; returns whether a row was actually inserted
    /// (`false` when the order id already exists).
    pub fn upsert(&self, record: &CanonicalRecord) -> Result<bool> {
        let mut stmt = self.store.conn().prepare(schema::insert_or_ignore_sql())?;
        Ok(execute_upsert(&mut stmt, record)? == 1)
    }

    /// Insert a batch inside a single transaction, so a failed batch rolls
    /// back instead of half-committing. Individual duplicate conflicts are
    /// counted in the result; statement or connectivity failures abort the
    /// whole batch with a storage error.
    pub fn upsert_batch(&mut self, records: &[CanonicalRecord]) -> Result<BatchResult> {
        let tx = self.store.conn_mut().transaction()?;
        let mut result = BatchResult { inserted: 0, skipped: 0 };
        {
            let mut stmt = tx.prepare(schema::insert_or_ignore_sql())?;
            for record in records {
                if execute_upsert(&mut stmt, record)? == 1 {
                    result.inserted += 1;
                } else {
                    result.skipped += 1;
                }
            }
        }
        tx.commit()?;

        info!(
            inserted = result.inserted,
            skipped = result.skipped,
            "batch upsert committed"
        );
        Ok(result)
    }
}

fn execute_upsert(stmt: &mut Statement<'_>, rec: &CanonicalRecord) -> Result<usize> {
    // parameter order is the schema's DDL order
    let changed = stmt.execute(params![
        rec.order_id,
        rec.region,
        rec.country,
        rec.item_type,
        rec.sales_channel,
        rec.order_priority.as_str(),
        rec.order_date.format(schema::record::STORED_DATE_FMT).to_string(),
        rec.ship_date.format(schema::record::STORED_DATE_FMT).to_string(),
        rec.units_sold,
        rec.unit_price,
        rec.unit_cost,
        rec.total_revenue,
        rec.order_processing_time,
        rec.gross_margin,
    ])?;
    Ok(changed)
}
