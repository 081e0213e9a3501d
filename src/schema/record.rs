use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::{EtlError, Result};

/// ISO calendar-date form used for persisted and processed-stream dates.
pub const STORED_DATE_FMT: &str = "%Y-%m-%d";

/// Normalized order priority. Normalization is total: every input string
/// lands on one of these five values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPriority {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl OrderPriority {
    /// Map a raw priority code. Single-letter codes L/M/H/C are recognized
    /// case-insensitively; anything else is `Unknown` rather than rejected.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "L" => OrderPriority::Low,
            "M" => OrderPriority::Medium,
            "H" => OrderPriority::High,
            "C" => OrderPriority::Critical,
            _ => OrderPriority::Unknown,
        }
    }

    /// Parse a normalized label back out of the processed stream.
    pub fn parse_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => OrderPriority::Low,
            "medium" => OrderPriority::Medium,
            "high" => OrderPriority::High,
            "critical" => OrderPriority::Critical,
            _ => OrderPriority::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderPriority::Low => "Low",
            OrderPriority::Medium => "Medium",
            OrderPriority::High => "High",
            OrderPriority::Critical => "Critical",
            OrderPriority::Unknown => "Unknown",
        }
    }
}

/// A cleaned, schema-conformant order row ready for persistence. `order_id`
/// is the business key; `order_processing_time` and `gross_margin` are
/// derived during transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub order_id: String,
    pub region: String,
    pub country: String,
    pub item_type: String,
    pub sales_channel: String,
    pub order_priority: OrderPriority,
    pub order_date: NaiveDate,
    pub ship_date: NaiveDate,
    pub units_sold: i64,
    pub unit_price: f64,
    pub unit_cost: f64,
    pub total_revenue: f64,
    pub gross_margin: f64,
    pub order_processing_time: i64,
}

/// Column order of the processed byte stream: the raw layout with the
/// derived columns appended, as the upstream transform emits it.
const PROCESSED_HEADER: [&str; 14] = [
    "Region",
    "Country",
    "Item Type",
    "Sales Channel",
    "Order Priority",
    "Order ID",
    "Order Date",
    "Ship Date",
    "Units Sold",
    "Unit Price",
    "Unit Cost",
    "Total Revenue",
    "Order Processing Time",
    "Gross Margin",
];

/// Serialize canonical records to the processed CSV stream.
pub fn records_to_csv(records: &[CanonicalRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(PROCESSED_HEADER)
        .map_err(|e| EtlError::Storage(format!("writing processed header: {e}")))?;

    for rec in records {
        let row: [String; 14] = [
            rec.region.clone(),
            rec.country.clone(),
            rec.item_type.clone(),
            rec.sales_channel.clone(),
            rec.order_priority.as_str().to_string(),
            rec.order_id.clone(),
            rec.order_date.format(STORED_DATE_FMT).to_string(),
            rec.ship_date.format(STORED_DATE_FMT).to_string(),
            rec.units_sold.to_string(),
            rec.unit_price.to_string(),
            rec.unit_cost.to_string(),
            rec.total_revenue.to_string(),
            rec.order_processing_time.to_string(),
            rec.gross_margin.to_string(),
        ];
        writer
            .write_record(&row)
            .map_err(|e| EtlError::Storage(format!("writing processed row: {e}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| EtlError::Storage(format!("flushing processed stream: {e}")))?;
    String::from_utf8(bytes).map_err(|e| EtlError::Storage(format!("processed stream: {e}")))
}

/// Decode a processed CSV stream back into canonical records.
///
/// The stream is machine-written, so any defect here is a caller input
/// problem: decode failures are `Validation` errors fatal to the request,
/// unlike the per-row recovery applied to raw input.
pub fn records_from_csv(text: &str) -> Result<Vec<CanonicalRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| EtlError::Validation(format!("processed stream has no header: {e}")))?
        .clone();

    let mut index: HashMap<String, usize> = HashMap::with_capacity(headers.len());
    for (i, name) in headers.iter().enumerate() {
        index.entry(name.trim().to_ascii_lowercase()).or_insert(i);
    }
    let mut positions = [0usize; PROCESSED_HEADER.len()];
    for (slot, name) in positions.iter_mut().zip(PROCESSED_HEADER.iter()) {
        match index.get(&name.to_ascii_lowercase()) {
            Some(&i) => *slot = i,
            None => {
                return Err(EtlError::Validation(format!(
                    "processed stream is missing column `{name}`"
                )))
            }
        }
    }

    let mut records = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let row = result.map_err(|e| {
            EtlError::Validation(format!("processed stream row {}: {e}", row_no + 1))
        })?;
        records.push(decode_row(&row, &positions, row_no + 1)?);
    }

    Ok(records)
}

fn cell<'r>(
    row: &'r csv::StringRecord,
    positions: &[usize; PROCESSED_HEADER.len()],
    slot: usize,
    row_no: usize,
) -> Result<&'r str> {
    row.get(positions[slot]).map(str::trim).ok_or_else(|| {
        EtlError::Validation(format!(
            "processed stream row {row_no} is missing `{}`",
            PROCESSED_HEADER[slot]
        ))
    })
}

fn decode_row(
    row: &csv::StringRecord,
    positions: &[usize; PROCESSED_HEADER.len()],
    row_no: usize,
) -> Result<CanonicalRecord> {
    let date = |slot: usize| -> Result<NaiveDate> {
        let raw = cell(row, positions, slot, row_no)?;
        NaiveDate::parse_from_str(raw, STORED_DATE_FMT).map_err(|_| {
            EtlError::Validation(format!(
                "processed stream row {row_no}: `{raw}` is not a {STORED_DATE_FMT} date"
            ))
        })
    };
    let int = |slot: usize| -> Result<i64> {
        let raw = cell(row, positions, slot, row_no)?;
        raw.parse().map_err(|_| {
            EtlError::Validation(format!(
                "processed stream row {row_no}: `{raw}` is not an integer"
            ))
        })
    };
    let real = |slot: usize| -> Result<f64> {
        let raw = cell(row, positions, slot, row_no)?;
        raw.parse().map_err(|_| {
            EtlError::Validation(format!(
                "processed stream row {row_no}: `{raw}` is not a number"
            ))
        })
    };

    Ok(CanonicalRecord {
        region: cell(row, positions, 0, row_no)?.to_string(),
        country: cell(row, positions, 1, row_no)?.to_string(),
        item_type: cell(row, positions, 2, row_no)?.to_string(),
        sales_channel: cell(row, positions, 3, row_no)?.to_string(),
        order_priority: OrderPriority::parse_label(cell(row, positions, 4, row_no)?),
        order_id: cell(row, positions, 5, row_no)?.to_string(),
        order_date: date(6)?,
        ship_date: date(7)?,
        units_sold: int(8)?,
        unit_price: real(9)?,
        unit_cost: real(10)?,
        total_revenue: real(11)?,
        order_processing_time: int(12)?,
        gross_margin: real(13)?,
    })
}
