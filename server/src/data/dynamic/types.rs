//! Storage types for dynamically discovered columns
//!
//! Every object-shape column holds one of five types. Columns only ever move
//! up the lattice (`bigint -> double precision`, anything -> `text`), so the
//! `USING col::new_type` conversion is always defined for stored data.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Physical layout of a topic's backing table, fixed at first sight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicShape {
    /// Flat key/value payloads, one column per key
    Object,
    /// Bare values, stored in the fixed tagged-union table
    Scalar,
}

impl TopicShape {
    /// Classify a decoded payload
    pub fn of(value: &Value) -> Self {
        if value.is_object() {
            Self::Object
        } else {
            Self::Scalar
        }
    }

    /// Registry encoding (`topic_registry.is_json`)
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Object)
    }

    pub fn from_is_json(is_json: bool) -> Self {
        if is_json { Self::Object } else { Self::Scalar }
    }
}

impl fmt::Display for TopicShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => write!(f, "object"),
            Self::Scalar => write!(f, "scalar"),
        }
    }
}

/// Column type lattice for object-shape tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnType {
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "bigint")]
    BigInt,
    #[serde(rename = "double precision")]
    DoublePrecision,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "jsonb")]
    Jsonb,
}

impl ColumnType {
    pub const ALL: [ColumnType; 5] = [
        Self::Boolean,
        Self::BigInt,
        Self::DoublePrecision,
        Self::Text,
        Self::Jsonb,
    ];

    /// SQL type name, as used in DDL and reported by `information_schema`
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::BigInt => "bigint",
            Self::DoublePrecision => "double precision",
            Self::Text => "text",
            Self::Jsonb => "jsonb",
        }
    }

    /// Parse an `information_schema.columns.data_type` value
    ///
    /// Returns `None` for types outside the lattice (bootstrap columns such as
    /// `ts`, or columns altered outside the engine).
    pub fn from_sql(data_type: &str) -> Option<Self> {
        match data_type.trim().to_lowercase().as_str() {
            "boolean" | "bool" => Some(Self::Boolean),
            "bigint" | "int8" => Some(Self::BigInt),
            "double precision" | "float8" => Some(Self::DoublePrecision),
            "text" => Some(Self::Text),
            "jsonb" => Some(Self::Jsonb),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::BigInt | Self::DoublePrecision)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Infer the storage type of a decoded value
///
/// `null` maps to `text`; callers defer column creation for null values so
/// the real type is decided by the first non-null value. Integers outside the
/// `bigint` range map to `text` to avoid silent precision loss.
pub fn infer_type(value: &Value) -> ColumnType {
    match value {
        Value::Null => ColumnType::Text,
        Value::Bool(_) => ColumnType::Boolean,
        Value::Number(n) if n.is_i64() => ColumnType::BigInt,
        Value::Number(n) if n.is_u64() => ColumnType::Text,
        Value::Number(_) => ColumnType::DoublePrecision,
        Value::String(_) => ColumnType::Text,
        Value::Array(_) | Value::Object(_) => ColumnType::Jsonb,
    }
}

/// Compute the type a column must move to before storing `incoming`
///
/// Returns `None` when the current type already accepts the value. The rule
/// is deliberately asymmetric: a `bigint` value fits a `double precision`
/// column, but a fractional value forces `bigint` up to `double precision`.
pub fn widen(current: ColumnType, incoming: ColumnType) -> Option<ColumnType> {
    use ColumnType::*;

    if current == incoming {
        return None;
    }
    match (current, incoming) {
        (BigInt, DoublePrecision) => Some(DoublePrecision),
        (DoublePrecision, BigInt) => None,
        (Boolean, Text) => Some(Text),
        (Text, _) => None,
        _ => Some(Text),
    }
}

/// A value coerced to the literal form of its target column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Typed NULL, bound with the column's own type
    Null(ColumnType),
    Bool(bool),
    BigInt(i64),
    Double(f64),
    Text(String),
    Json(Value),
}

impl ColumnValue {
    /// The SQL type this value binds as
    pub fn bind_type(&self) -> ColumnType {
        match self {
            Self::Null(t) => *t,
            Self::Bool(_) => ColumnType::Boolean,
            Self::BigInt(_) => ColumnType::BigInt,
            Self::Double(_) => ColumnType::DoublePrecision,
            Self::Text(_) => ColumnType::Text,
            Self::Json(_) => ColumnType::Jsonb,
        }
    }

    /// JSON rendering of the stored value
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null(_) => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::BigInt(i) => Value::from(*i),
            Self::Double(f) => Value::from(*f),
            Self::Text(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
        }
    }
}

/// String form used whenever a value lands in a `text` column
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn integral_f64_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Coerce a decoded value into the literal form for the column's current type
///
/// Must be called after widening for the same insert. Combinations the lattice
/// never produces fall back to the value's string form.
pub fn normalize_for_column(value: &Value, column: ColumnType) -> ColumnValue {
    if value.is_null() {
        return ColumnValue::Null(column);
    }

    let fallback = || ColumnValue::Text(value_to_text(value));

    match column {
        ColumnType::BigInt => match value {
            Value::Bool(b) => ColumnValue::BigInt(i64::from(*b)),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral_f64_to_i64))
                .map(ColumnValue::BigInt)
                .unwrap_or_else(fallback),
            _ => fallback(),
        },
        ColumnType::DoublePrecision => match value {
            Value::Bool(b) => ColumnValue::Double(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => n
                .as_f64()
                .map(ColumnValue::Double)
                .unwrap_or_else(fallback),
            _ => fallback(),
        },
        ColumnType::Boolean => match value {
            Value::Bool(b) => ColumnValue::Bool(*b),
            _ => fallback(),
        },
        ColumnType::Jsonb => ColumnValue::Json(value.clone()),
        ColumnType::Text => fallback(),
    }
}

/// Tag stored in a scalar table's `value_type` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Json,
}

impl ScalarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a scalar-shape table: exactly one value column is populated
/// (none for `null`), and `kind` names it
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRow {
    pub kind: ScalarKind,
    pub value_int: Option<i64>,
    pub value_float: Option<f64>,
    pub value_bool: Option<bool>,
    pub value_text: Option<String>,
    pub value_json: Option<Value>,
}

impl ScalarRow {
    fn empty(kind: ScalarKind) -> Self {
        Self {
            kind,
            value_int: None,
            value_float: None,
            value_bool: None,
            value_text: None,
            value_json: None,
        }
    }

    /// Classify a decoded value into its tagged-union row
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::empty(ScalarKind::Null),
            Value::Bool(b) => Self {
                value_bool: Some(b),
                ..Self::empty(ScalarKind::Bool)
            },
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self {
                        value_int: Some(i),
                        ..Self::empty(ScalarKind::Int)
                    }
                } else if n.is_u64() {
                    Self {
                        value_text: Some(n.to_string()),
                        ..Self::empty(ScalarKind::String)
                    }
                } else {
                    Self {
                        value_float: n.as_f64(),
                        ..Self::empty(ScalarKind::Float)
                    }
                }
            }
            Value::String(s) => Self {
                value_text: Some(s),
                ..Self::empty(ScalarKind::String)
            },
            composite @ (Value::Array(_) | Value::Object(_)) => Self {
                value_json: Some(composite),
                ..Self::empty(ScalarKind::Json)
            },
        }
    }

    /// Numeric view used by scalar aggregates (int or float column)
    pub fn numeric(&self) -> Option<f64> {
        match self.kind {
            ScalarKind::Int => self.value_int.map(|i| i as f64),
            ScalarKind::Float => self.value_float,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn samples() -> Vec<Value> {
        vec![
            json!(true),
            json!(false),
            json!(0),
            json!(-17),
            json!(22),
            json!(22.0),
            json!(21.5),
            json!(1e300),
            json!(u64::MAX),
            json!("40%"),
            json!(""),
            json!([1, 2, 3]),
            json!({"nested": {"a": 1}}),
        ]
    }

    #[test]
    fn test_infer_type() {
        assert_eq!(infer_type(&Value::Null), ColumnType::Text);
        assert_eq!(infer_type(&json!(true)), ColumnType::Boolean);
        assert_eq!(infer_type(&json!(40)), ColumnType::BigInt);
        assert_eq!(infer_type(&json!(21.5)), ColumnType::DoublePrecision);
        assert_eq!(infer_type(&json!(22.0)), ColumnType::DoublePrecision);
        assert_eq!(infer_type(&json!("x")), ColumnType::Text);
        assert_eq!(infer_type(&json!([1])), ColumnType::Jsonb);
        assert_eq!(infer_type(&json!({"a": 1})), ColumnType::Jsonb);
        assert_eq!(infer_type(&json!(u64::MAX)), ColumnType::Text);
    }

    #[test]
    fn test_widen_table() {
        use ColumnType::*;
        for t in ColumnType::ALL {
            assert_eq!(widen(t, t), None);
        }
        assert_eq!(widen(BigInt, DoublePrecision), Some(DoublePrecision));
        assert_eq!(widen(DoublePrecision, BigInt), None);
        assert_eq!(widen(Boolean, Text), Some(Text));
        for t in ColumnType::ALL {
            assert_eq!(widen(Text, t), None);
        }
        assert_eq!(widen(BigInt, Boolean), Some(Text));
        assert_eq!(widen(Boolean, BigInt), Some(Text));
        assert_eq!(widen(BigInt, Text), Some(Text));
        assert_eq!(widen(DoublePrecision, Jsonb), Some(Text));
        assert_eq!(widen(Jsonb, Text), Some(Text));
        assert_eq!(widen(Jsonb, BigInt), Some(Text));
    }

    #[test]
    fn test_widen_is_monotonic_towards_text() {
        // Repeated widening converges: applying any sequence of incoming types
        // never leaves text once reached.
        let mut current = ColumnType::Boolean;
        for incoming in [
            ColumnType::Boolean,
            ColumnType::Text,
            ColumnType::BigInt,
            ColumnType::DoublePrecision,
            ColumnType::Jsonb,
        ] {
            if let Some(next) = widen(current, incoming) {
                current = next;
            }
        }
        assert_eq!(current, ColumnType::Text);
    }

    #[test]
    fn test_normalize_never_mismatches_after_widening() {
        for value in samples() {
            for prior in ColumnType::ALL {
                let final_type = widen(prior, infer_type(&value)).unwrap_or(prior);
                let normalized = normalize_for_column(&value, final_type);
                assert_eq!(
                    normalized.bind_type(),
                    final_type,
                    "value {} into {} (prior {})",
                    value,
                    final_type,
                    prior
                );
            }
        }
    }

    #[test]
    fn test_normalize_bigint() {
        assert_eq!(
            normalize_for_column(&json!(22.0), ColumnType::BigInt),
            ColumnValue::BigInt(22)
        );
        assert_eq!(
            normalize_for_column(&json!(true), ColumnType::BigInt),
            ColumnValue::BigInt(1)
        );
        assert_eq!(
            normalize_for_column(&json!(22.5), ColumnType::BigInt),
            ColumnValue::Text("22.5".to_string())
        );
    }

    #[test]
    fn test_normalize_double_accepts_integers() {
        assert_eq!(
            normalize_for_column(&json!(22), ColumnType::DoublePrecision),
            ColumnValue::Double(22.0)
        );
    }

    #[test]
    fn test_normalize_text_and_json() {
        assert_eq!(
            normalize_for_column(&json!("40%"), ColumnType::Text),
            ColumnValue::Text("40%".to_string())
        );
        assert_eq!(
            normalize_for_column(&json!(40), ColumnType::Text),
            ColumnValue::Text("40".to_string())
        );
        assert_eq!(
            normalize_for_column(&json!(true), ColumnType::Text),
            ColumnValue::Text("true".to_string())
        );
        assert_eq!(
            normalize_for_column(&json!({"a": [1]}), ColumnType::Text),
            ColumnValue::Text(r#"{"a":[1]}"#.to_string())
        );
        assert_eq!(
            normalize_for_column(&json!("s"), ColumnType::Jsonb),
            ColumnValue::Json(json!("s"))
        );
    }

    #[test]
    fn test_normalize_null_is_typed() {
        assert_eq!(
            normalize_for_column(&Value::Null, ColumnType::BigInt),
            ColumnValue::Null(ColumnType::BigInt)
        );
    }

    #[test]
    fn test_column_type_from_sql() {
        for t in ColumnType::ALL {
            assert_eq!(ColumnType::from_sql(t.as_sql()), Some(t));
        }
        assert_eq!(ColumnType::from_sql("DOUBLE PRECISION"), Some(ColumnType::DoublePrecision));
        assert_eq!(ColumnType::from_sql("timestamp with time zone"), None);
        assert_eq!(ColumnType::from_sql("integer"), None);
    }

    #[test]
    fn test_scalar_row_classification() {
        let row = ScalarRow::from_value(json!(87));
        assert_eq!(row.kind, ScalarKind::Int);
        assert_eq!(row.value_int, Some(87));
        assert!(row.value_float.is_none() && row.value_text.is_none());

        let row = ScalarRow::from_value(json!("low"));
        assert_eq!(row.kind, ScalarKind::String);
        assert_eq!(row.value_text.as_deref(), Some("low"));

        let row = ScalarRow::from_value(json!(3.25));
        assert_eq!(row.kind, ScalarKind::Float);
        assert_eq!(row.numeric(), Some(3.25));

        let row = ScalarRow::from_value(json!(false));
        assert_eq!(row.kind, ScalarKind::Bool);
        assert_eq!(row.value_bool, Some(false));

        let row = ScalarRow::from_value(json!([1, 2]));
        assert_eq!(row.kind, ScalarKind::Json);
        assert_eq!(row.value_json, Some(json!([1, 2])));

        let row = ScalarRow::from_value(Value::Null);
        assert_eq!(row.kind, ScalarKind::Null);
        assert_eq!(row.numeric(), None);
    }

    #[test]
    fn test_topic_shape() {
        assert_eq!(TopicShape::of(&json!({"a": 1})), TopicShape::Object);
        assert_eq!(TopicShape::of(&json!([1])), TopicShape::Scalar);
        assert_eq!(TopicShape::of(&Value::Null), TopicShape::Scalar);
        assert!(TopicShape::Object.is_json());
        assert_eq!(TopicShape::from_is_json(false), TopicShape::Scalar);
    }
}
