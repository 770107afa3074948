//! Topic registry repository for PostgreSQL operations

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::data::dynamic::schema::TopicRecord;
use crate::data::dynamic::types::TopicShape;
use crate::data::postgres::PostgresError;

type RegistryRow = (String, String, bool, DateTime<Utc>);

fn to_record((topic, table_name, is_json, created_at): RegistryRow) -> TopicRecord {
    TopicRecord {
        topic,
        table_name,
        shape: TopicShape::from_is_json(is_json),
        created_at,
    }
}

/// Register a topic (idempotent)
///
/// Returns true if created, false if the topic or its table name was already
/// registered. Conflicts on either unique key are ignored, so the first
/// registrant of a table name keeps it.
pub async fn register_topic(
    pool: &PgPool,
    topic: &str,
    table_name: &str,
    shape: TopicShape,
) -> Result<bool, PostgresError> {
    let result = sqlx::query(
        r#"
        INSERT INTO topic_registry (topic, table_name, is_json)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(topic)
    .bind(table_name)
    .bind(shape.is_json())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Look up a topic by its wire name
pub async fn find_topic(pool: &PgPool, topic: &str) -> Result<Option<TopicRecord>, PostgresError> {
    let row: Option<RegistryRow> = sqlx::query_as(
        r#"
        SELECT topic, table_name, is_json, created_at
        FROM topic_registry
        WHERE topic = $1
        "#,
    )
    .bind(topic)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(to_record))
}

/// List all registered topics ordered by topic
pub async fn list_topics(pool: &PgPool) -> Result<Vec<TopicRecord>, PostgresError> {
    let rows: Vec<RegistryRow> = sqlx::query_as(
        r#"
        SELECT topic, table_name, is_json, created_at
        FROM topic_registry
        ORDER BY topic
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(to_record).collect())
}
