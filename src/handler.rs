//! Request handlers: the boundary between the invocation wrapper and the
//! core. Each handler decodes a plain parameter structure, calls the pure
//! core, and returns a plain value or a terminal error; the wrapper owns
//! timing, logging setup, and envelope formatting.

use std::fs;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EtlError, Result};
use crate::schema;
use crate::source::BlobStore;
use crate::store::{self, Loader, QuerySpec, ResultRow, Store, StoreConfig};
use crate::transform::{self, RowError};

/// Transform raw order data: inline text, or a locator to fetch it from.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    #[serde(default)]
    pub raw_data: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Where to put the processed stream; returned inline when absent.
    #[serde(default)]
    pub sink: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub records: usize,
    pub duplicates_skipped: usize,
    /// Row-level failures: the batch succeeded, these rows were dropped.
    pub row_errors: Vec<RowError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<String>,
}

pub fn handle_transform(
    req: &TransformRequest,
    blobs: &dyn BlobStore,
) -> Result<TransformResponse> {
    let text = match (&req.raw_data, &req.source) {
        (Some(data), _) if !data.is_empty() => data.clone(),
        (_, Some(locator)) => into_text(blobs.fetch(locator)?, locator)?,
        _ => {
            return Err(EtlError::Validation(
                "either rawData or a source locator must be provided".to_string(),
            ))
        }
    };

    let outcome = transform::transform_text(&text)?;
    if !outcome.errors.is_empty() {
        warn!(dropped = outcome.errors.len(), "rows dropped during transform");
    }
    info!(
        records = outcome.records.len(),
        duplicates = outcome.duplicates_skipped,
        "transform complete"
    );

    let processed = schema::records_to_csv(&outcome.records)?;
    let (data, sink) = match &req.sink {
        Some(locator) => {
            blobs.put(locator, processed.as_bytes())?;
            (None, Some(locator.clone()))
        }
        None => (Some(processed), None),
    };

    Ok(TransformResponse {
        records: outcome.records.len(),
        duplicates_skipped: outcome.duplicates_skipped,
        row_errors: outcome.errors,
        data,
        sink,
    })
}

/// Load a processed stream into the persisted table.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub source: String,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub inserted: usize,
    pub skipped: usize,
    pub message: String,
}

pub fn handle_load(req: &LoadRequest, blobs: &dyn BlobStore) -> Result<LoadResponse> {
    let text = into_text(blobs.fetch(&req.source)?, &req.source)?;
    let records = schema::records_from_csv(&text)?;

    let mut store = Store::connect(&req.store)?;
    let mut loader = Loader::new(&mut store);
    loader.ensure_schema()?;
    let result = loader.upsert_batch(&records)?;

    Ok(LoadResponse {
        inserted: result.inserted,
        skipped: result.skipped,
        message: format!(
            "loaded {} records into {} ({} already present)",
            result.inserted,
            schema::TABLE_NAME,
            result.skipped
        ),
    })
}

/// Run an aggregate query, optionally materializing the embedded database
/// from a locator first.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(flatten)]
    pub spec: QuerySpec,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub source: Option<String>,
}

pub fn handle_query(req: &QueryRequest, blobs: &dyn BlobStore) -> Result<Vec<ResultRow>> {
    if let (StoreConfig::Embedded { path }, Some(locator)) = (&req.store, &req.source) {
        if !path.exists() {
            info!(locator, path = %path.display(), "materializing store from source");
            let bytes = blobs.fetch(locator)?;
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, &bytes)?;
        }
    }

    let store = Store::connect(&req.store)?;
    store::run_query(&store, &req.spec)
}

fn into_text(bytes: Vec<u8>, locator: &str) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|_| EtlError::Validation(format!("source `{locator}` is not valid UTF-8 text")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RAW: &str = "Region,Country,Item Type,Sales Channel,Order Priority,Order ID,Order Date,\
Ship Date,Units Sold,Unit Price,Unit Cost,Total Revenue,Total Cost\n\
Europe,France,Snacks,Online,L,ORD-1,01/01/2024,01/05/2024,10,5.00,3.00,50.00,20.00\n\
Asia,Japan,Fruit,Offline,H,ORD-2,02/01/2024,02/03/2024,7,2.00,1.00,14.00,7.00\n";

    struct NoBlobs;
    impl BlobStore for NoBlobs {
        fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
            Err(EtlError::Storage(format!("no such blob `{locator}`")))
        }
        fn put(&self, locator: &str, _bytes: &[u8]) -> Result<()> {
            Err(EtlError::Storage(format!("no such sink `{locator}`")))
        }
    }

    #[test]
    fn transform_requires_some_input() {
        let req = TransformRequest { raw_data: None, source: None, sink: None };
        let err = handle_transform(&req, &NoBlobs).unwrap_err();
        assert!(matches!(err, EtlError::Validation(_)));
    }

    #[test]
    fn transform_returns_the_processed_stream_inline() -> Result<()> {
        let req = TransformRequest {
            raw_data: Some(RAW.to_string()),
            source: None,
            sink: None,
        };
        let resp = handle_transform(&req, &NoBlobs)?;

        assert_eq!(resp.records, 2);
        assert_eq!(resp.duplicates_skipped, 0);
        assert!(resp.row_errors.is_empty());
        let data = resp.data.expect("inline data");
        assert!(data.contains("Order Processing Time"));
        assert!(data.contains("ORD-1"));
        Ok(())
    }

    #[test]
    fn transform_then_load_through_the_filesystem() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("processed.csv").display().to_string();
        let db_path = dir.path().join("orders.db");
        let blobs = crate::source::FsBlobStore;

        let resp = handle_transform(
            &TransformRequest {
                raw_data: Some(RAW.to_string()),
                source: None,
                sink: Some(processed.clone()),
            },
            &blobs,
        )?;
        assert_eq!(resp.sink.as_deref(), Some(processed.as_str()));
        assert!(resp.data.is_none());

        let store_config = StoreConfig::Embedded { path: db_path.clone() };
        let resp = handle_load(
            &LoadRequest { source: processed.clone(), store: store_config.clone() },
            &blobs,
        )?;
        assert_eq!((resp.inserted, resp.skipped), (2, 0));

        // loading the same stream again is a no-op
        let resp = handle_load(
            &LoadRequest { source: processed, store: store_config.clone() },
            &blobs,
        )?;
        assert_eq!((resp.inserted, resp.skipped), (0, 2));

        let rows = handle_query(
            &QueryRequest {
                spec: QuerySpec {
                    filters: vec![],
                    aggregations: vec![store::Aggregation {
                        function: store::AggregateFn::Count,
                        column: "*".to_string(),
                        label: None,
                    }],
                    group_by: "Order_ID".to_string(),
                },
                store: store_config,
                source: None,
            },
            &blobs,
        )?;
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.get("count(*)"), Some(&json!(1)));
        }
        Ok(())
    }

    #[test]
    fn query_request_decodes_the_envelope_shape() {
        let req: QueryRequest = serde_json::from_value(json!({
            "filters": [{"column": "Region", "op": "=", "value": "Europe"}],
            "aggregations": [{"function": "count", "column": "*"}],
            "groupBy": "Region",
            "store": {"backend": "embedded", "path": "orders.db"}
        }))
        .unwrap();
        assert_eq!(req.spec.group_by, "Region");
        assert_eq!(req.spec.filters.len(), 1);

        // unknown aggregate functions fail at decode, before validation
        let bad = serde_json::from_value::<QueryRequest>(json!({
            "aggregations": [{"function": "load_extension", "column": "*"}],
            "groupBy": "Region"
        }));
        assert!(bad.is_err());
    }
}
