pub mod layout;
pub mod record;

pub use layout::{RawField, RawLayout, RAW_COLUMNS};
pub use record::{records_from_csv, records_to_csv, CanonicalRecord, OrderPriority};

use once_cell::sync::Lazy;

/// SQL name of the persisted table.
pub const TABLE_NAME: &str = "transformed_data";

/// Storage type of a persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Date,
    Integer,
    Real,
}

impl ColumnType {
    /// The DDL type keyword, reproduced exactly for interoperability with
    /// pre-existing tables.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "VARCHAR(255)",
            ColumnType::Date => "DATE",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "FLOAT",
        }
    }
}

/// A single persisted column: its SQL identifier, the header name it carries
/// in CSV form, and its storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub sql_name: &'static str,
    pub csv_name: &'static str,
    pub ty: ColumnType,
}

/// The persisted table definition, in DDL order. The first column is the
/// primary key (`Order_ID`, the business key). Transformer, Loader, and
/// query assembly all read column names and order from here; nothing else
/// hardcodes offsets.
pub const COLUMNS: [ColumnDef; 14] = [
    ColumnDef { sql_name: "Order_ID", csv_name: "Order ID", ty: ColumnType::Text },
    ColumnDef { sql_name: "Region", csv_name: "Region", ty: ColumnType::Text },
    ColumnDef { sql_name: "Country", csv_name: "Country", ty: ColumnType::Text },
    ColumnDef { sql_name: "Item_Type", csv_name: "Item Type", ty: ColumnType::Text },
    ColumnDef { sql_name: "Sales_Channel", csv_name: "Sales Channel", ty: ColumnType::Text },
    ColumnDef { sql_name: "Order_Priority", csv_name: "Order Priority", ty: ColumnType::Text },
    ColumnDef { sql_name: "Order_Date", csv_name: "Order Date", ty: ColumnType::Date },
    ColumnDef { sql_name: "Ship_Date", csv_name: "Ship Date", ty: ColumnType::Date },
    ColumnDef { sql_name: "Units_Sold", csv_name: "Units Sold", ty: ColumnType::Integer },
    ColumnDef { sql_name: "Unit_Price", csv_name: "Unit Price", ty: ColumnType::Real },
    ColumnDef { sql_name: "Unit_Cost", csv_name: "Unit Cost", ty: ColumnType::Real },
    ColumnDef { sql_name: "Total_Revenue", csv_name: "Total Revenue", ty: ColumnType::Real },
    ColumnDef { sql_name: "Order_Processing_Time", csv_name: "Order Processing Time", ty: ColumnType::Integer },
    ColumnDef { sql_name: "Gross_Margin", csv_name: "Gross Margin", ty: ColumnType::Real },
];

static CREATE_TABLE_SQL: Lazy<String> = Lazy::new(|| {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {TABLE_NAME} (\n");
    for (i, col) in COLUMNS.iter().enumerate() {
        sql.push_str("    ");
        sql.push_str(col.sql_name);
        sql.push(' ');
        sql.push_str(col.ty.sql_type());
        if i == 0 {
            sql.push_str(" PRIMARY KEY");
        }
        if i + 1 < COLUMNS.len() {
            sql.push(',');
        }
        sql.push('\n');
    }
    sql.push(')');
    sql
});

static INSERT_OR_IGNORE_SQL: Lazy<String> = Lazy::new(|| {
    let names: Vec<&str> = COLUMNS.iter().map(|c| c.sql_name).collect();
    let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT OR IGNORE INTO {TABLE_NAME} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    )
});

/// DDL for the persisted table. Exposed as plain text so an external
/// connection provider can apply the same shape to any backend.
pub fn create_table_sql() -> &'static str {
    &CREATE_TABLE_SQL
}

/// The insert-or-ignore DML shape, one positional parameter per column in
/// DDL order.
pub fn insert_or_ignore_sql() -> &'static str {
    &INSERT_OR_IGNORE_SQL
}

/// Look up a persisted column by SQL name, case-insensitively. Returns the
/// canonical definition so callers can compose queries with the exact
/// identifier.
pub fn canonical_column(name: &str) -> Option<&'static ColumnDef> {
    let name = name.trim();
    COLUMNS.iter().find(|c| c.sql_name.eq_ignore_ascii_case(name))
}

/// Whether `name` refers to a persisted column.
pub fn is_known_column(name: &str) -> bool {
    canonical_column(name).is_some()
}
