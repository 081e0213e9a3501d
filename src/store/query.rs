use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::Store;
use crate::error::{EtlError, Result};
use crate::schema;

/// Comparison operators permitted in filter predicates. Serialized as the
/// operator token itself, so envelopes read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "like")]
    Like,
}

impl FilterOp {
    fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Like => "LIKE",
        }
    }
}

/// A structured filter condition. The value is bound as a parameter; no
/// caller text is ever spliced into the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Aggregate functions permitted in a query. Anything outside this
/// allow-list fails at envelope decode, before any SQL exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    fn sql(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// One aggregate expression: a function over a column (`*` is permitted for
/// `count`), keyed in the result by `label` when supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub function: AggregateFn,
    pub column: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl Aggregation {
    /// Result key for this expression, e.g. `count(*)` or a caller label.
    pub fn result_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("{}({})", self.function.sql().to_ascii_lowercase(), self.column),
        }
    }
}

/// An ad-hoc aggregate query: filters ANDed together, one grouping column,
/// one or more aggregate expressions. Ephemeral; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    #[serde(default)]
    pub filters: Vec<FilterPredicate>,
    pub aggregations: Vec<Aggregation>,
    pub group_by: String,
}

/// One grouped result: the grouping value plus each aggregation's value,
/// keyed by label in select order.
pub type ResultRow = Map<String, Value>;

/// Reject anything that would reference outside the schema model. Runs in
/// full before any query text is composed.
fn validate(spec: &QuerySpec) -> Result<()> {
    if spec.group_by.trim().is_empty() {
        return Err(EtlError::Validation(
            "a groupBy column must be specified".to_string(),
        ));
    }
    if spec.aggregations.is_empty() {
        return Err(EtlError::Validation(
            "at least one aggregation must be specified".to_string(),
        ));
    }
    if !schema::is_known_column(&spec.group_by) {
        return Err(EtlError::UnknownColumn(spec.group_by.clone()));
    }
    for agg in &spec.aggregations {
        if agg.column == "*" {
            if agg.function != AggregateFn::Count {
                return Err(EtlError::Validation(format!(
                    "only count may aggregate over `*`, not {}",
                    agg.function.sql().to_ascii_lowercase()
                )));
            }
        } else if !schema::is_known_column(&agg.column) {
            return Err(EtlError::UnknownColumn(agg.column.clone()));
        }
    }
    for filter in &spec.filters {
        if !schema::is_known_column(&filter.column) {
            return Err(EtlError::UnknownColumn(filter.column.clone()));
        }
    }
    Ok(())
}

/// Quote an identifier for SQL text. Column identifiers are already
/// schema-validated; labels are caller text and get their quotes doubled.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn canonical_name(name: &str) -> &'static str {
    // validate() ran first, so the lookup cannot miss
    schema::canonical_column(name).expect("validated column").sql_name
}

fn build_sql(spec: &QuerySpec) -> String {
    let group = canonical_name(&spec.group_by);
    let mut sql = format!("SELECT {}", quote_ident(group));

    for agg in &spec.aggregations {
        let target = if agg.column == "*" {
            "*".to_string()
        } else {
            quote_ident(canonical_name(&agg.column))
        };
        sql.push_str(&format!(
            ", {}({}) AS {}",
            agg.function.sql(),
            target,
            quote_ident(&agg.result_label())
        ));
    }

    sql.push_str(" FROM ");
    sql.push_str(schema::TABLE_NAME);

    for (i, filter) in spec.filters.iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.push_str(&format!(
            "{} {} ?{}",
            quote_ident(canonical_name(&filter.column)),
            filter.op.sql(),
            i + 1
        ));
    }

    sql.push_str(&format!(" GROUP BY {}", quote_ident(group)));
    sql
}

fn bind_value(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(*b as i64)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(EtlError::Validation(format!("unrepresentable number {n}")))
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        _ => Err(EtlError::Validation(
            "filter values must be scalars".to_string(),
        )),
    }
}

fn scalar_value(raw: ValueRef<'_>) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(Number::from(i)),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Run an aggregate query against the persisted table. Returns one row per
/// distinct grouping value, in the store's order; an empty match is an
/// empty sequence, not an error. Execution failures surface as storage
/// errors and are not retried.
pub fn run_query(store: &Store, spec: &QuerySpec) -> Result<Vec<ResultRow>> {
    validate(spec)?;

    let sql = build_sql(spec);
    debug!(%sql, filters = spec.filters.len(), "running aggregate query");

    let params: Vec<SqlValue> = spec
        .filters
        .iter()
        .map(|f| bind_value(&f.value))
        .collect::<Result<_>>()?;

    let mut labels = Vec::with_capacity(spec.aggregations.len() + 1);
    labels.push(canonical_name(&spec.group_by).to_string());
    labels.extend(spec.aggregations.iter().map(Aggregation::result_label));

    let mut stmt = store.conn().prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut result = ResultRow::new();
        for (i, label) in labels.iter().enumerate() {
            result.insert(label.clone(), scalar_value(row.get_ref(i)?));
        }
        out.push(result);
    }
    Ok(out)
}
