use std::collections::HashMap;

use crate::error::{EtlError, Result};

/// Raw input columns the transformer requires, in the documented default
/// order. Position-addressed when no header line is supplied.
pub const RAW_COLUMNS: [&str; 13] = [
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
    "Total Cost",
];

/// Typed handle on a required raw column. Discriminants index both
/// [`RAW_COLUMNS`] and the default positional layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawField {
    Region = 0,
    Country,
    ItemType,
    SalesChannel,
    OrderPriority,
    OrderId,
    OrderDate,
    ShipDate,
    UnitsSold,
    UnitPrice,
    UnitCost,
    TotalRevenue,
    TotalCost,
}

impl RawField {
    /// The header name this field carries in raw exports.
    pub fn name(self) -> &'static str {
        RAW_COLUMNS[self as usize]
    }
}

/// Resolved positions of the required raw columns within a row.
///
/// Built from a header line when one is available, so transformation is
/// name-driven rather than coupled to column order; the fixed default order
/// applies only to headerless input.
#[derive(Debug, Clone)]
pub struct RawLayout {
    positions: [usize; RAW_COLUMNS.len()],
}

impl RawLayout {
    /// The documented default order: each required column at its own index.
    pub fn default_order() -> Self {
        let mut positions = [0usize; RAW_COLUMNS.len()];
        for (i, slot) in positions.iter_mut().enumerate() {
            *slot = i;
        }
        Self { positions }
    }

    /// Resolve positions from a header line. Header names are matched after
    /// trimming, case-insensitively. Fails when a required column is absent.
    pub fn from_header(header: &[String]) -> Result<Self> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(header.len());
        for (i, name) in header.iter().enumerate() {
            // first occurrence wins for duplicated header names
            index.entry(name.trim().to_ascii_lowercase()).or_insert(i);
        }

        let mut positions = [0usize; RAW_COLUMNS.len()];
        for (slot, required) in positions.iter_mut().zip(RAW_COLUMNS.iter()) {
            match index.get(&required.to_ascii_lowercase()) {
                Some(&pos) => *slot = pos,
                None => {
                    return Err(EtlError::Schema(format!(
                        "required column `{required}` missing from supplied header"
                    )))
                }
            }
        }
        Ok(Self { positions })
    }

    /// True when `fields` could serve as a header for this layout.
    pub fn header_candidate(fields: &[String]) -> bool {
        Self::from_header(fields).is_ok()
    }

    /// Position of `field` within a raw row under this layout.
    pub fn position(&self, field: RawField) -> usize {
        self.positions[field as usize]
    }

    /// Borrow `field` out of `row`, or `None` when the row is too short.
    pub fn field<'a>(&self, row: &'a [String], field: RawField) -> Option<&'a str> {
        row.get(self.position(field)).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_order_is_positional() {
        let layout = RawLayout::default_order();
        assert_eq!(layout.position(RawField::Region), 0);
        assert_eq!(layout.position(RawField::OrderId), 5);
        assert_eq!(layout.position(RawField::TotalCost), 12);
    }

    #[test]
    fn header_resolution_handles_reordered_columns() -> crate::error::Result<()> {
        let mut names: Vec<&str> = RAW_COLUMNS.to_vec();
        names.reverse();
        let layout = RawLayout::from_header(&to_strings(&names))?;
        assert_eq!(layout.position(RawField::TotalCost), 0);
        assert_eq!(layout.position(RawField::Region), 12);
        Ok(())
    }

    #[test]
    fn header_resolution_is_trimmed_and_case_insensitive() -> crate::error::Result<()> {
        let names = to_strings(&[
            " region ",
            "COUNTRY",
            "item type",
            "sales channel",
            "ORDER PRIORITY",
            "order id",
            "Order Date",
            "ship date",
            "units sold",
            "unit price",
            "unit cost",
            "total revenue",
            "total cost",
        ]);
        let layout = RawLayout::from_header(&names)?;
        assert_eq!(layout.position(RawField::OrderId), 5);
        Ok(())
    }

    #[test]
    fn missing_required_column_is_a_schema_error() {
        let names = to_strings(&["Region", "Country", "Item Type"]);
        let err = RawLayout::from_header(&names).unwrap_err();
        match err {
            EtlError::Schema(msg) => assert!(msg.contains("Sales Channel")),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn header_candidate_rejects_data_rows() {
        let row = to_strings(&[
            "Europe", "France", "Snacks", "Online", "L", "ORD-1", "01/01/2024", "01/05/2024",
            "10", "5.00", "3.00", "50.00", "20.00",
        ]);
        assert!(!RawLayout::header_candidate(&row));
        assert!(RawLayout::header_candidate(&to_strings(&RAW_COLUMNS)));
    }
}
