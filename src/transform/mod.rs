pub mod dates;

pub use dates::{parse_raw_date, RAW_DATE_FMT};

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::schema::{CanonicalRecord, OrderPriority, RawField, RawLayout};

/// Machine-readable reason a raw row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowErrorKind {
    MissingField,
    InvalidDate,
    InvalidDateOrder,
    InvalidNumber,
    InvalidRevenue,
}

/// A per-row data-quality failure. Collected, never fatal: the batch
/// continues and the offending row is dropped from output. `row` is the
/// 1-based position of the row within the batch, header excluded.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row: usize,
    pub kind: RowErrorKind,
    pub detail: String,
}

/// Everything one transform pass produces. Duplicate skips are intentional
/// (first occurrence wins) and therefore counted separately from errors.
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub records: Vec<CanonicalRecord>,
    pub errors: Vec<RowError>,
    pub duplicates_skipped: usize,
}

/// Trim whitespace and strip one layer of outer quotes.
fn clean_field(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

type RowResult<T> = std::result::Result<T, (RowErrorKind, String)>;

fn raw_field<'a>(layout: &RawLayout, row: &'a [String], field: RawField) -> RowResult<&'a str> {
    layout.field(row, field).map(clean_field).ok_or_else(|| {
        (
            RowErrorKind::MissingField,
            format!("row has no `{}` field at position {}", field.name(), layout.position(field)),
        )
    })
}

fn parse_real(layout: &RawLayout, row: &[String], field: RawField) -> RowResult<f64> {
    let raw = raw_field(layout, row, field)?;
    raw.parse().map_err(|_| {
        (
            RowErrorKind::InvalidNumber,
            format!("`{raw}` is not a number for `{}`", field.name()),
        )
    })
}

fn convert_row(layout: &RawLayout, row: &[String]) -> RowResult<CanonicalRecord> {
    let parse_date = |field: RawField| -> RowResult<chrono::NaiveDate> {
        let raw = raw_field(layout, row, field)?;
        parse_raw_date(raw).ok_or_else(|| {
            (
                RowErrorKind::InvalidDate,
                format!("`{raw}` is not a {RAW_DATE_FMT} date for `{}`", field.name()),
            )
        })
    };

    let order_date = parse_date(RawField::OrderDate)?;
    let ship_date = parse_date(RawField::ShipDate)?;
    let order_processing_time = (ship_date - order_date).num_days();
    if order_processing_time < 0 {
        return Err((
            RowErrorKind::InvalidDateOrder,
            format!("ship date {ship_date} precedes order date {order_date}"),
        ));
    }

    let order_priority =
        OrderPriority::normalize(raw_field(layout, row, RawField::OrderPriority)?);

    let raw_units = raw_field(layout, row, RawField::UnitsSold)?;
    let units_sold: i64 = raw_units.parse().map_err(|_| {
        (
            RowErrorKind::InvalidNumber,
            format!("`{raw_units}` is not an integer for `Units Sold`"),
        )
    })?;
    if units_sold < 0 {
        return Err((
            RowErrorKind::InvalidNumber,
            format!("negative units sold ({units_sold})"),
        ));
    }

    let unit_price = parse_real(layout, row, RawField::UnitPrice)?;
    let unit_cost = parse_real(layout, row, RawField::UnitCost)?;
    let total_revenue = parse_real(layout, row, RawField::TotalRevenue)?;
    let total_cost = parse_real(layout, row, RawField::TotalCost)?;

    if total_revenue == 0.0 {
        return Err((
            RowErrorKind::InvalidRevenue,
            "gross margin is undefined for zero total revenue".to_string(),
        ));
    }
    let gross_margin = (total_revenue - total_cost) / total_revenue;

    Ok(CanonicalRecord {
        order_id: raw_field(layout, row, RawField::OrderId)?.to_string(),
        region: raw_field(layout, row, RawField::Region)?.to_string(),
        country: raw_field(layout, row, RawField::Country)?.to_string(),
        item_type: raw_field(layout, row, RawField::ItemType)?.to_string(),
        sales_channel: raw_field(layout, row, RawField::SalesChannel)?.to_string(),
        order_priority,
        order_date,
        ship_date,
        units_sold,
        unit_price,
        unit_cost,
        total_revenue,
        gross_margin,
        order_processing_time,
    })
}

/// Transform raw rows into canonical records.
///
/// Positions come from `header` when one is supplied, else from the fixed
/// default layout. Rows are processed independently: a bad row becomes a
/// [`RowError`] and the batch continues. Duplicate order ids keep the first
/// occurrence (in input order) and skip the rest silently. Pure function; no
/// I/O happens here.
pub fn transform(rows: &[Vec<String>], header: Option<&[String]>) -> Result<TransformOutcome> {
    let layout = match header {
        Some(names) => RawLayout::from_header(names)?,
        None => RawLayout::default_order(),
    };

    let mut outcome = TransformOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (i, row) in rows.iter().enumerate() {
        match convert_row(&layout, row) {
            Ok(record) => {
                if seen.insert(record.order_id.clone()) {
                    outcome.records.push(record);
                } else {
                    debug!(row = i + 1, order_id = %record.order_id, "duplicate order id skipped");
                    outcome.duplicates_skipped += 1;
                }
            }
            Err((kind, detail)) => {
                debug!(row = i + 1, ?kind, %detail, "row dropped");
                outcome.errors.push(RowError { row: i + 1, kind, detail });
            }
        }
    }

    Ok(outcome)
}

/// Transform delimited text. The first line is treated as a header iff its
/// fields cover every required raw column; otherwise every line is data
/// under the fixed default layout.
pub fn transform_text(text: &str) -> Result<TransformOutcome> {
    let rows = parse_delimited(text)?;
    if let Some(first) = rows.first() {
        if RawLayout::header_candidate(first) {
            return transform(&rows[1..], Some(first.as_slice()));
        }
    }
    transform(&rows, None)
}

fn parse_delimited(text: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| EtlError::Validation(format!("malformed delimited input: {e}")))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RAW_COLUMNS;

    const SAMPLE_ROW: &str =
        "Europe,France,Snacks,Online,L,ORD-1,01/01/2024,01/05/2024,10,5.00,3.00,50.00,20.00,";

    fn rows_of(lines: &[&str]) -> Vec<Vec<String>> {
        lines
            .iter()
            .map(|l| l.split(',').map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn derives_the_worked_example() -> Result<()> {
        let outcome = transform(&rows_of(&[SAMPLE_ROW]), None)?;
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.records.len(), 1);

        let rec = &outcome.records[0];
        assert_eq!(rec.order_id, "ORD-1");
        assert_eq!(rec.order_priority, OrderPriority::Low);
        assert_eq!(rec.order_processing_time, 4);
        assert!((rec.gross_margin - 0.60).abs() < 1e-9);
        assert_eq!(rec.units_sold, 10);
        Ok(())
    }

    #[test]
    fn ship_before_order_is_invalid_date_order() -> Result<()> {
        let row = "Europe,France,Snacks,Online,L,ORD-1,01/05/2024,01/01/2024,10,5,3,50,20";
        let outcome = transform(&rows_of(&[row]), None)?;
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, RowErrorKind::InvalidDateOrder);
        assert_eq!(outcome.errors[0].row, 1);
        Ok(())
    }

    #[test]
    fn malformed_date_is_invalid_date() -> Result<()> {
        let row = "Europe,France,Snacks,Online,L,ORD-1,2024-01-01,01/05/2024,10,5,3,50,20";
        let outcome = transform(&rows_of(&[row]), None)?;
        assert_eq!(outcome.errors[0].kind, RowErrorKind::InvalidDate);
        assert!(outcome.records.is_empty());
        Ok(())
    }

    #[test]
    fn zero_revenue_is_invalid_revenue_never_nan() -> Result<()> {
        let row = "Europe,France,Snacks,Online,L,ORD-1,01/01/2024,01/05/2024,10,5,3,0,20";
        let outcome = transform(&rows_of(&[row]), None)?;
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.errors[0].kind, RowErrorKind::InvalidRevenue);
        Ok(())
    }

    #[test]
    fn short_row_is_missing_field() -> Result<()> {
        let outcome = transform(&rows_of(&["Europe,France,Snacks"]), None)?;
        assert_eq!(outcome.errors[0].kind, RowErrorKind::MissingField);
        Ok(())
    }

    #[test]
    fn unparsable_numbers_are_invalid_number() -> Result<()> {
        let row = "Europe,France,Snacks,Online,L,ORD-1,01/01/2024,01/05/2024,ten,5,3,50,20";
        let outcome = transform(&rows_of(&[row]), None)?;
        assert_eq!(outcome.errors[0].kind, RowErrorKind::InvalidNumber);

        let row = "Europe,France,Snacks,Online,L,ORD-2,01/01/2024,01/05/2024,-4,5,3,50,20";
        let outcome = transform(&rows_of(&[row]), None)?;
        assert_eq!(outcome.errors[0].kind, RowErrorKind::InvalidNumber);
        Ok(())
    }

    #[test]
    fn duplicates_keep_first_occurrence_silently() -> Result<()> {
        let second = "Asia,Japan,Fruit,Offline,H,ORD-1,02/01/2024,02/03/2024,7,2,1,14,7";
        let outcome = transform(&rows_of(&[SAMPLE_ROW, second]), None)?;

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].region, "Europe");
        assert_eq!(outcome.duplicates_skipped, 1);
        assert!(outcome.errors.is_empty(), "dedup skips are not row errors");
        Ok(())
    }

    #[test]
    fn transforming_a_duplicate_batch_is_idempotent() -> Result<()> {
        let once = transform(&rows_of(&[SAMPLE_ROW]), None)?;
        let twice = transform(&rows_of(&[SAMPLE_ROW, SAMPLE_ROW]), None)?;
        assert_eq!(twice.records, once.records);
        assert_eq!(twice.duplicates_skipped, 1);
        Ok(())
    }

    #[test]
    fn output_preserves_first_occurrence_input_order() -> Result<()> {
        let a = "Europe,France,Snacks,Online,L,ORD-A,01/01/2024,01/02/2024,1,1,1,10,5";
        let b = "Asia,Japan,Fruit,Offline,M,ORD-B,01/01/2024,01/03/2024,2,2,2,20,8";
        let outcome = transform(&rows_of(&[a, b, a]), None)?;
        let ids: Vec<&str> = outcome.records.iter().map(|r| r.order_id.as_str()).collect();
        assert_eq!(ids, ["ORD-A", "ORD-B"]);
        Ok(())
    }

    #[test]
    fn header_driven_layout_reorders_fields() -> Result<()> {
        let header: Vec<String> = RAW_COLUMNS.iter().rev().map(|s| s.to_string()).collect();
        let row = "20.00,50.00,3.00,5.00,10,01/05/2024,01/01/2024,ORD-9,m,Online,Snacks,France,Europe";
        let outcome = transform(&rows_of(&[row]), Some(&header))?;

        assert_eq!(outcome.records.len(), 1);
        let rec = &outcome.records[0];
        assert_eq!(rec.order_id, "ORD-9");
        assert_eq!(rec.order_priority, OrderPriority::Medium);
        assert_eq!(rec.region, "Europe");
        assert_eq!(rec.order_processing_time, 4);
        Ok(())
    }

    #[test]
    fn transform_text_detects_a_header_line() -> Result<()> {
        let text = format!("{}\n{}\n", RAW_COLUMNS.join(","), SAMPLE_ROW);
        let outcome = transform_text(&text)?;
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].order_id, "ORD-1");

        // headerless input: line 1 is data
        let outcome = transform_text(SAMPLE_ROW)?;
        assert_eq!(outcome.records.len(), 1);
        Ok(())
    }

    #[test]
    fn one_bad_row_does_not_sink_the_batch() -> Result<()> {
        let bad = "Europe,France,Snacks,Online,L,ORD-X,bogus,01/05/2024,10,5,3,50,20";
        let good = "Asia,Japan,Fruit,Offline,H,ORD-Y,02/01/2024,02/03/2024,7,2,1,14,7";
        let outcome = transform(&rows_of(&[bad, good]), None)?;
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].order_id, "ORD-Y");
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row, 1);
        Ok(())
    }
}
