//! Topic listing and history queries
//!
//! Resolution order for a history request: topic visibility, registry
//! lookup, visible fields, requested fields, then timestamps and mode. The
//! first failing check decides the error.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::acl::AccessControl;
use super::error::QueryError;
use super::request::{HistoryParams, parse_fields, parse_optional_timestamp};
use crate::data::dynamic::{SchemaCache, TableSchema, TopicRecord, TopicShape};
use crate::data::query::{
    AggFunc, BUCKET_COLUMN, BucketInterval, HistoryQuery, HistoryRow, QueryMode, SortOrder,
};
use crate::data::{DataError, TopicStore};

/// One visible topic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicSummary {
    pub topic: String,
    pub table: String,
    pub is_json: bool,
    pub fields: Vec<String>,
    /// Storage type of each visible field
    pub types: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryResponse {
    pub table: String,
    pub is_json: bool,
    pub rows: Vec<HistoryRow>,
}

pub struct HistoryService {
    store: Arc<dyn TopicStore>,
    cache: SchemaCache,
    max_limit: u32,
}

impl HistoryService {
    pub fn new(store: Arc<dyn TopicStore>, cache: SchemaCache, max_limit: u32) -> Self {
        Self {
            store,
            cache,
            max_limit,
        }
    }

    /// Registered topics the caller can see, with their visible fields
    ///
    /// Topics with no visible field are left out.
    pub async fn list_topics(&self, acl: &AccessControl) -> Result<Vec<TopicSummary>, QueryError> {
        let mut result = Vec::new();
        for record in self.store.list_topics().await? {
            if !acl.topic_allowed(&record.topic) {
                continue;
            }
            let schema = match self.schema(&record.table_name).await {
                Ok(schema) => schema,
                Err(DataError::Schema(reason)) => {
                    tracing::warn!(
                        topic = %record.topic,
                        table = %record.table_name,
                        reason = %reason,
                        "Skipping topic with unreadable table"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let fields = acl.visible_fields(&record.topic, &schema.field_names());
            if fields.is_empty() {
                continue;
            }
            let types = fields
                .iter()
                .filter_map(|f| schema.get(f).map(|c| (f.clone(), c.data_type.clone())))
                .collect();
            result.push(TopicSummary {
                topic: record.topic,
                table: record.table_name,
                is_json: record.shape.is_json(),
                fields,
                types,
            });
        }
        Ok(result)
    }

    /// Run a raw or aggregate history query
    pub async fn get_history(
        &self,
        acl: &AccessControl,
        params: &HistoryParams,
    ) -> Result<HistoryResponse, QueryError> {
        let topic = params.topic.as_str();
        let limit = params.limit.unwrap_or(self.max_limit);
        if !(1..=self.max_limit).contains(&limit) {
            return Err(QueryError::InvalidLimit {
                max: self.max_limit,
            });
        }

        if !acl.topic_allowed(topic) {
            return Err(QueryError::TopicDenied);
        }
        let record = self
            .find_topic(topic)
            .await?
            .ok_or_else(|| QueryError::UnknownTopic(topic.to_string()))?;
        let schema = self.schema(&record.table_name).await?;

        let all_fields = schema.field_names();
        let visible = acl.visible_fields(topic, &all_fields);
        if visible.is_empty() {
            return Err(QueryError::FieldDenied);
        }
        let fields = parse_fields(params.fields.as_deref()).unwrap_or_else(|| visible.clone());
        for field in &fields {
            if !all_fields.contains(field) {
                return Err(QueryError::UnknownField(field.clone()));
            }
            if !visible.contains(field) {
                return Err(QueryError::FieldDenied);
            }
        }

        let from = parse_optional_timestamp(params.from_ts.as_deref())?;
        let to = parse_optional_timestamp(params.to_ts.as_deref())?;

        let mode = match params.agg() {
            Some(agg) => aggregate_mode(agg, params.interval.as_deref(), &record, &schema, &fields)?,
            None => {
                let order = if from.is_none() && to.is_none() {
                    SortOrder::Desc
                } else {
                    params
                        .order
                        .as_deref()
                        .map(SortOrder::parse)
                        .unwrap_or(SortOrder::Desc)
                };
                QueryMode::Raw { limit, order }
            }
        };

        let query = HistoryQuery {
            table: record.table_name.clone(),
            shape: record.shape,
            fields,
            from,
            to,
            mode,
        };
        tracing::debug!(topic, table = %query.table, mode = ?query.mode, "Running history query");
        let rows = self.store.run_history(&query).await?;

        Ok(HistoryResponse {
            table: record.table_name,
            is_json: record.shape.is_json(),
            rows,
        })
    }

    async fn find_topic(&self, topic: &str) -> Result<Option<TopicRecord>, DataError> {
        if let Some(record) = self.cache.topic(topic).await {
            return Ok(Some(record));
        }
        let record = self.store.find_topic(topic).await?;
        if let Some(record) = &record {
            self.cache.put_topic(record.clone()).await;
        }
        Ok(record)
    }

    async fn schema(&self, table: &str) -> Result<Arc<TableSchema>, DataError> {
        if let Some(schema) = self.cache.table(table).await {
            return Ok(schema);
        }
        let schema = self.store.table_schema(table).await?;
        Ok(self.cache.put_table(table, schema).await)
    }
}

fn aggregate_mode(
    agg: &str,
    interval: Option<&str>,
    record: &TopicRecord,
    schema: &TableSchema,
    fields: &[String],
) -> Result<QueryMode, QueryError> {
    let bucket = interval
        .and_then(BucketInterval::parse)
        .ok_or(QueryError::InvalidInterval)?;
    let func = AggFunc::parse(agg)
        .filter(|f| f.allowed_for(record.shape))
        .ok_or(QueryError::InvalidAggregation)?;

    if record.shape == TopicShape::Object {
        for field in fields {
            if field == BUCKET_COLUMN {
                return Err(QueryError::ReservedField(field.clone()));
            }
            if !schema.column_type(field).is_some_and(|t| t.is_numeric()) {
                return Err(QueryError::NotNumeric(field.clone()));
            }
        }
    }
    Ok(QueryMode::Aggregate { func, bucket })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};

    use super::*;
    use crate::data::memory::MemoryStore;
    use crate::domain::history::QueryErrorKind;
    use crate::domain::ingest::{InboundMessage, MessageIngestor};

    struct Fixture {
        store: Arc<MemoryStore>,
        ingestor: MessageIngestor,
        service: HistoryService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let dyn_store = Arc::clone(&store) as Arc<dyn TopicStore>;
        Fixture {
            ingestor: MessageIngestor::new(
                Arc::clone(&dyn_store),
                SchemaCache::new(Duration::from_secs(60)),
                3,
            ),
            service: HistoryService::new(dyn_store, SchemaCache::new(Duration::from_secs(60)), 5000),
            store,
        }
    }

    impl Fixture {
        async fn send(&self, topic: &str, payload: &str) {
            self.ingestor
                .ingest(&InboundMessage::new(topic, payload))
                .await
                .unwrap();
        }

        async fn send_at(&self, minute: u32, topic: &str, payload: &str) {
            self.store
                .set_now(Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap());
            self.send(topic, payload).await;
        }
    }

    fn open() -> AccessControl {
        AccessControl::unrestricted()
    }

    #[tokio::test]
    async fn test_list_topics_reports_types() {
        let f = fixture();
        f.send("sensor/room1", r#"{"temp": 21.5, "humid": 40}"#).await;
        f.send("sensor/room1/battery", "87").await;

        let topics = f.service.list_topics(&open()).await.unwrap();
        assert_eq!(topics.len(), 2);
        let room = &topics[0];
        assert_eq!(room.topic, "sensor/room1");
        assert_eq!(room.table, "sensor_room1");
        assert!(room.is_json);
        assert_eq!(room.fields, vec!["temp", "humid"]);
        assert_eq!(room.types["temp"], "double precision");
        assert_eq!(room.types["humid"], "bigint");

        let battery = &topics[1];
        assert_eq!(battery.table, "battery");
        assert!(!battery.is_json);
        assert!(battery.fields.contains(&"value_int".to_string()));
    }

    #[tokio::test]
    async fn test_list_topics_applies_acl() {
        let f = fixture();
        f.send("sensor/room1", r#"{"temp": 21.5, "humid": 40}"#).await;
        f.send("sensor/room2", r#"{"temp": 19.0}"#).await;

        let acl = open()
            .with_topics(["sensor/room1", "sensor/room2"])
            .with_fields("sensor/room1", ["temp"])
            .with_fields("sensor/room2", Vec::<String>::new());
        let topics = f.service.list_topics(&acl).await.unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].fields, vec!["temp"]);
    }

    #[tokio::test]
    async fn test_history_unknown_topic() {
        let f = fixture();
        let err = f
            .service
            .get_history(&open(), &HistoryParams::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownTopic(_)));
    }

    #[tokio::test]
    async fn test_history_topic_denied_before_lookup() {
        let f = fixture();
        let acl = open().with_topics(["other"]);
        let err = f
            .service
            .get_history(&acl, &HistoryParams::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::TopicDenied));
    }

    #[tokio::test]
    async fn test_history_hidden_field_is_forbidden() {
        let f = fixture();
        f.send("t", r#"{"a": 1, "b": 2, "c": 3}"#).await;
        let acl = open().with_fields("t", ["a", "b"]);

        let params = HistoryParams {
            fields: Some("c".into()),
            ..HistoryParams::new("t")
        };
        let err = f.service.get_history(&acl, &params).await.unwrap_err();
        assert!(matches!(err, QueryError::FieldDenied));

        let params = HistoryParams {
            fields: Some("a".into()),
            ..HistoryParams::new("t")
        };
        let response = f.service.get_history(&acl, &params).await.unwrap();
        assert_eq!(response.rows.len(), 1);
        let keys: Vec<&String> = response.rows[0].keys().collect();
        assert_eq!(keys, vec!["ts", "a"]);
    }

    #[tokio::test]
    async fn test_history_default_fields_are_visible_fields() {
        let f = fixture();
        f.send("t", r#"{"a": 1, "b": 2, "c": 3}"#).await;
        let acl = open().with_fields("t", ["a", "c"]);

        let response = f
            .service
            .get_history(&acl, &HistoryParams::new("t"))
            .await
            .unwrap();
        let keys: Vec<&String> = response.rows[0].keys().collect();
        assert_eq!(keys, vec!["ts", "a", "c"]);
    }

    #[tokio::test]
    async fn test_history_no_visible_fields_is_forbidden() {
        let f = fixture();
        f.send("t", r#"{"a": 1}"#).await;
        let acl = open().with_fields("t", Vec::<String>::new());
        let err = f
            .service
            .get_history(&acl, &HistoryParams::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::FieldDenied));
    }

    #[tokio::test]
    async fn test_history_unknown_field() {
        let f = fixture();
        f.send("t", r#"{"a": 1}"#).await;
        let params = HistoryParams {
            fields: Some("a,zzz".into()),
            ..HistoryParams::new("t")
        };
        let err = f.service.get_history(&open(), &params).await.unwrap_err();
        assert!(matches!(err, QueryError::UnknownField(ref f) if f == "zzz"));
    }

    #[tokio::test]
    async fn test_unbounded_raw_query_is_descending() {
        let f = fixture();
        for minute in 0..3 {
            f.send_at(minute, "t", &format!(r#"{{"v": {}}}"#, minute)).await;
        }
        let params = HistoryParams {
            order: Some("asc".into()),
            ..HistoryParams::new("t")
        };
        let response = f.service.get_history(&open(), &params).await.unwrap();
        let values: Vec<&Value> = response.rows.iter().map(|r| &r["v"]).collect();
        assert_eq!(values, vec![&json!(2), &json!(1), &json!(0)]);
    }

    #[tokio::test]
    async fn test_bounded_raw_query_honors_order_and_limit() {
        let f = fixture();
        for minute in 0..4 {
            f.send_at(minute, "t", &format!(r#"{{"v": {}}}"#, minute)).await;
        }
        let params = HistoryParams {
            from_ts: Some("2024-03-01T10:01:00Z".into()),
            order: Some("ASC".into()),
            limit: Some(2),
            ..HistoryParams::new("t")
        };
        let response = f.service.get_history(&open(), &params).await.unwrap();
        let values: Vec<&Value> = response.rows.iter().map(|r| &r["v"]).collect();
        assert_eq!(values, vec![&json!(1), &json!(2)]);
    }

    #[tokio::test]
    async fn test_limit_bounds() {
        let f = fixture();
        f.send("t", r#"{"v": 1}"#).await;
        for limit in [0, 5001] {
            let params = HistoryParams {
                limit: Some(limit),
                ..HistoryParams::new("t")
            };
            let err = f.service.get_history(&open(), &params).await.unwrap_err();
            assert!(matches!(err, QueryError::InvalidLimit { max: 5000 }));
        }
    }

    #[tokio::test]
    async fn test_invalid_timestamp() {
        let f = fixture();
        f.send("t", r#"{"v": 1}"#).await;
        let params = HistoryParams {
            to_ts: Some("soon".into()),
            ..HistoryParams::new("t")
        };
        let err = f.service.get_history(&open(), &params).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidTimestamp(_)));
    }

    #[tokio::test]
    async fn test_aggregate_avg_over_one_hour_bucket() {
        let f = fixture();
        f.send_at(5, "sensor/room1", r#"{"temp": 21.56789}"#).await;
        f.send_at(35, "sensor/room1", r#"{"temp": 22.1}"#).await;

        let params = HistoryParams {
            fields: Some("temp".into()),
            agg: Some("avg".into()),
            interval: Some("1 hour".into()),
            ..HistoryParams::new("sensor/room1")
        };
        let response = f.service.get_history(&open(), &params).await.unwrap();
        assert_eq!(response.rows.len(), 1);
        let row = &response.rows[0];
        assert_eq!(row["bucket"], json!("2024-03-01T10:00:00+00:00"));
        let avg = row["temp"].as_f64().unwrap();
        assert!((avg - (21.568 + 22.1) / 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_scalar_aggregate_uses_numeric_rows() {
        let f = fixture();
        f.send_at(1, "dev/battery", "80").await;
        f.send_at(2, "dev/battery", "70.5").await;
        f.send_at(3, "dev/battery", r#""low""#).await;

        let params = HistoryParams {
            agg: Some("sum".into()),
            interval: Some("day".into()),
            ..HistoryParams::new("dev/battery")
        };
        let response = f.service.get_history(&open(), &params).await.unwrap();
        assert_eq!(response.rows.len(), 1);
        assert_eq!(response.rows[0]["value"].as_f64(), Some(150.5));
    }

    #[tokio::test]
    async fn test_aggregate_validation() {
        let f = fixture();
        f.send("t", r#"{"v": 1, "label": "x", "bucket": 2}"#).await;

        let cases = [
            ("avg", Some("fortnight"), "v"),
            ("median", Some("1 hour"), "v"),
            ("sum", Some("1 hour"), "v"),
            ("avg", Some("1 hour"), "label"),
            ("avg", Some("1 hour"), "bucket"),
            ("avg", None, "v"),
        ];
        for (agg, interval, field) in cases {
            let params = HistoryParams {
                fields: Some(field.into()),
                agg: Some(agg.into()),
                interval: interval.map(Into::into),
                ..HistoryParams::new("t")
            };
            let err = f.service.get_history(&open(), &params).await.unwrap_err();
            assert_eq!(
                err.kind(),
                QueryErrorKind::BadRequest,
                "{} {:?} {}",
                agg,
                interval,
                field
            );
        }
    }
}
