//! History query builder for PostgreSQL
//!
//! Builds raw and time-bucketed aggregate selects over a backing table.
//! Rows come back as JSON objects so the column set can vary per table.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::data::dynamic::schema::TS_COLUMN;
use crate::data::dynamic::types::{ScalarKind, TopicShape};
use crate::data::postgres::PostgresError;
use crate::data::query::{
    AggFunc, BUCKET_COLUMN, BucketInterval, HistoryQuery, HistoryRow, QueryMode,
    SCALAR_AGGREGATE_COLUMN,
};
use crate::utils::sql::quote_ident;

/// Bucket anchor
const BUCKET_ORIGIN: &str = "TIMESTAMPTZ '1970-01-01 00:00:00+00'";

/// Alias of the wrapped select; sanitized columns never start with `_`
const ROW_ALIAS: &str = "_row";

#[derive(Debug, Clone, PartialEq)]
pub enum QueryBind {
    Timestamp(DateTime<Utc>),
    BigInt(i64),
    Int(i32),
}

/// SQL text plus positional binds (`$1`, `$2`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub binds: Vec<QueryBind>,
}

struct Params {
    binds: Vec<QueryBind>,
}

impl Params {
    fn push(&mut self, bind: QueryBind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }
}

fn time_filter(query: &HistoryQuery, params: &mut Params) -> String {
    let ts = quote_ident(TS_COLUMN);
    let mut conditions = Vec::new();
    if let Some(from) = query.from {
        conditions.push(format!("{} >= {}", ts, params.push(QueryBind::Timestamp(from))));
    }
    if let Some(to) = query.to {
        conditions.push(format!("{} <= {}", ts, params.push(QueryBind::Timestamp(to))));
    }
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

fn bucket_expr(bucket: &BucketInterval, params: &mut Params) -> String {
    let count = params.push(QueryBind::Int(bucket.count));
    format!(
        "date_bin(make_interval({} => {}::integer), {}, {})",
        bucket.unit.make_interval_arg(),
        count,
        quote_ident(TS_COLUMN),
        BUCKET_ORIGIN
    )
}

/// Numeric view of a scalar row: whichever of the int/float columns the tag selects
fn scalar_numeric_expr() -> String {
    format!(
        "CASE WHEN {tag} = '{float}' THEN {vf} WHEN {tag} = '{int}' THEN {vi} END",
        tag = quote_ident("value_type"),
        float = ScalarKind::Float.as_str(),
        vf = quote_ident("value_float"),
        int = ScalarKind::Int.as_str(),
        vi = quote_ident("value_int"),
    )
}

fn aggregate_columns(query: &HistoryQuery, func: AggFunc) -> String {
    match query.shape {
        TopicShape::Object => query
            .fields
            .iter()
            .map(|field| {
                let quoted = quote_ident(field);
                format!("{}({}) AS {}", func.as_sql(), quoted, quoted)
            })
            .collect::<Vec<_>>()
            .join(", "),
        TopicShape::Scalar => format!(
            "{}({}) AS {}",
            func.as_sql(),
            scalar_numeric_expr(),
            quote_ident(SCALAR_AGGREGATE_COLUMN)
        ),
    }
}

/// Build the SQL for a validated history query
pub fn build_history_query(query: &HistoryQuery) -> BuiltQuery {
    let mut params = Params { binds: Vec::new() };
    let table = quote_ident(&query.table);

    let (inner, order_by) = match &query.mode {
        QueryMode::Raw { limit, order } => {
            let ts = quote_ident(TS_COLUMN);
            let columns: Vec<String> = std::iter::once(ts.clone())
                .chain(query.fields.iter().map(|f| quote_ident(f)))
                .collect();
            let filter = time_filter(query, &mut params);
            let limit = params.push(QueryBind::BigInt(i64::from(*limit)));
            let inner = format!(
                "SELECT {} FROM {}{} ORDER BY {} {} LIMIT {}",
                columns.join(", "),
                table,
                filter,
                ts,
                order.as_sql(),
                limit
            );
            (inner, format!("{}.{} {}", ROW_ALIAS, ts, order.as_sql()))
        }
        QueryMode::Aggregate { func, bucket } => {
            let bucket_sql = bucket_expr(bucket, &mut params);
            let filter = time_filter(query, &mut params);
            let inner = format!(
                "SELECT {} AS {}, {} FROM {}{} GROUP BY 1 ORDER BY 1",
                bucket_sql,
                quote_ident(BUCKET_COLUMN),
                aggregate_columns(query, *func),
                table,
                filter
            );
            (inner, format!("{}.{} ASC", ROW_ALIAS, quote_ident(BUCKET_COLUMN)))
        }
    };

    BuiltQuery {
        sql: format!(
            "SELECT row_to_json({alias}.*) FROM ({inner}) {alias} ORDER BY {order_by}",
            alias = ROW_ALIAS,
        ),
        binds: params.binds,
    }
}

/// Execute a validated history query
pub async fn run_history(
    pool: &PgPool,
    query: &HistoryQuery,
) -> Result<Vec<HistoryRow>, PostgresError> {
    let built = build_history_query(query);

    let mut sql_query = sqlx::query_scalar::<_, Json<Map<String, Value>>>(&built.sql);
    for bind in &built.binds {
        sql_query = match bind {
            QueryBind::Timestamp(ts) => sql_query.bind(*ts),
            QueryBind::BigInt(i) => sql_query.bind(*i),
            QueryBind::Int(i) => sql_query.bind(*i),
        };
    }

    let rows = sql_query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(|Json(row)| row).collect())
}
