//! Collection query refinement: the `CollectionRef` handed to a binding's
//! `query` hook and the `Query` it returns.
//!
//! Range comparisons never match `null` or a value of a different JSON type.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Filter / sort types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    ArrayContains,
    ArrayContainsAny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Dot-separated field path.
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

// ============================================================================
// CollectionRef
// ============================================================================

/// Reference to a resolved collection path. Refine it with `where_field`,
/// `order_by` and `limit`, or turn it into an unrefined query.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRef {
    path: String,
}

impl CollectionRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn into_query(self) -> Query {
        Query {
            collection: self.path,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn where_field(self, field: impl Into<String>, op: FilterOp, value: Value) -> Query {
        self.into_query().where_field(field, op, value)
    }

    pub fn order_by(self, field: impl Into<String>, direction: SortDirection) -> Query {
        self.into_query().order_by(field, direction)
    }

    pub fn limit(self, n: usize) -> Query {
        self.into_query().limit(n)
    }
}

// ============================================================================
// Query
// ============================================================================

/// A collection read: path plus filters, ordering and an optional limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    pub fn where_field(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether `record` passes every filter.
    pub fn matches(&self, record: &Value) -> bool {
        self.filters.iter().all(|f| {
            let value = get_field_value(record, &f.field).unwrap_or(&Value::Null);
            evaluate(value, f.op, &f.value)
        })
    }

    /// Filter, sort (stable) and truncate `records`.
    pub fn apply(&self, records: Vec<Value>) -> Vec<Value> {
        let mut out: Vec<Value> = records.into_iter().filter(|r| self.matches(r)).collect();

        if !self.order_by.is_empty() {
            out.sort_by(|a, b| {
                for entry in &self.order_by {
                    let va = get_field_value(a, &entry.field).unwrap_or(&Value::Null);
                    let vb = get_field_value(b, &entry.field).unwrap_or(&Value::Null);
                    let ord = compare_values(va, vb);
                    let ord = match entry.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

// ============================================================================
// Value comparison
// ============================================================================

/// Compare two JSON values for ordering.
///
/// - Both Null → Equal; Null sorts after everything else
/// - Both numbers → f64 comparison (NaN treated as Equal)
/// - Both strings → lexicographic (codepoint order)
/// - Both booleans → false < true
/// - Cross-type → type rank: number(0), string(1), bool(2), other(3)
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(na), Value::Number(nb)) => {
            let fa = na.as_f64().unwrap_or(f64::NAN);
            let fb = nb.as_f64().unwrap_or(f64::NAN);
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        }
        (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        _ => 3,
    }
}

/// Get a nested value using a dot-separated path.
pub fn get_field_value<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn same_type(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn evaluate(value: &Value, op: FilterOp, operand: &Value) -> bool {
    match op {
        FilterOp::Eq => value == operand,
        FilterOp::Ne => !value.is_null() && value != operand,
        FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
            if value.is_null() || operand.is_null() || !same_type(value, operand) {
                return false;
            }
            let ord = compare_values(value, operand);
            match op {
                FilterOp::Lt => ord == Ordering::Less,
                FilterOp::Lte => ord != Ordering::Greater,
                FilterOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }
        }
        FilterOp::In => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| item == value)),
        FilterOp::NotIn => {
            !value.is_null()
                && operand
                    .as_array()
                    .is_some_and(|items| !items.iter().any(|item| item == value))
        }
        FilterOp::ArrayContains => value
            .as_array()
            .is_some_and(|arr| arr.iter().any(|elem| elem == operand)),
        FilterOp::ArrayContainsAny => match (value.as_array(), operand.as_array()) {
            (Some(arr), Some(candidates)) => arr.iter().any(|elem| candidates.contains(elem)),
            _ => false,
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
