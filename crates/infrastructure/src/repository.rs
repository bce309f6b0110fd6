//! PostgreSQL 聊天记录存储
//!
//! 每条记录带有 `week_bucket` 列，范围查询只扫描涉及的周分区；
//! 分页使用 `(created_at, id)` 键集游标。

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    week_bucket, ChatMessage, DurableStore, Metadata, RangePage, RangeQuery, RepositoryError,
    RepositoryResult, UserInfo,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

/// 每页返回的记录数
pub const RANGE_PAGE_SIZE: i64 = 50;

/// 单条 INSERT 语句最多包含的行数（Postgres 绑定参数上限 65535）
const MAX_ROWS_PER_INSERT: usize = 5000;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[derive(Debug, FromRow)]
struct ChatLogRecord {
    id: i64,
    channel: String,
    created_at: DateTime<Utc>,
    message: String,
    metadata: Json<Metadata>,
    user_id: String,
    user_data: Json<Value>,
}

impl From<ChatLogRecord> for ChatMessage {
    fn from(record: ChatLogRecord) -> Self {
        ChatMessage {
            channel: record.channel,
            timestamp: record.created_at,
            text: record.message,
            metadata: record.metadata.0,
            sender: UserInfo::new(record.user_id, record.user_data.0),
        }
    }
}

/// 分页游标：`<created_at 微秒>:<id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    created_at: DateTime<Utc>,
    id: i64,
}

impl Cursor {
    fn encode(&self) -> String {
        format!("{}:{}", self.created_at.timestamp_micros(), self.id)
    }

    fn decode(raw: &str) -> RepositoryResult<Self> {
        let invalid = || RepositoryError::invalid_data(format!("malformed cursor `{raw}`"));
        let (micros, id) = raw.split_once(':').ok_or_else(invalid)?;
        let micros: i64 = micros.parse().map_err(|_| invalid())?;
        let id: i64 = id.parse().map_err(|_| invalid())?;
        let created_at = DateTime::from_timestamp_micros(micros).ok_or_else(invalid)?;
        Ok(Self { created_at, id })
    }
}

#[derive(Clone)]
pub struct PgChatLogStore {
    pool: PgPool,
}

impl PgChatLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DurableStore for PgChatLogStore {
    async fn bulk_write(&self, batch: &[ChatMessage]) -> RepositoryResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // 以文本绑定再转为 json，jsonb 会重排对象键
        let rows = batch
            .iter()
            .map(|message| {
                Ok((
                    message,
                    serde_json::to_string(&message.metadata)?,
                    serde_json::to_string(&message.sender.profile_data)?,
                ))
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()
            .map_err(|err| RepositoryError::invalid_data(err.to_string()))?;

        let started = Instant::now();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        for chunk in rows.chunks(MAX_ROWS_PER_INSERT) {
            let mut query_builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO chat_logs (channel, week_bucket, created_at, message, metadata, user_id, user_data) ",
            );
            query_builder.push_values(chunk, |mut b, (message, metadata, user_data)| {
                b.push_bind(&message.channel)
                    .push_bind(week_bucket(message.timestamp))
                    .push_bind(message.timestamp)
                    .push_bind(&message.text)
                    .push_bind(metadata)
                    .push_unseparated("::json")
                    .push_bind(&message.sender.user_id)
                    .push_bind(user_data)
                    .push_unseparated("::json");
            });
            query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;

        tracing::debug!(
            batch_size = batch.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Inserted chat log batch"
        );
        Ok(())
    }

    async fn range_query_page(
        &self,
        query: &RangeQuery,
        cursor: Option<String>,
    ) -> RepositoryResult<RangePage> {
        let cursor = cursor.as_deref().map(Cursor::decode).transpose()?;

        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, channel, created_at, message, metadata, user_id, user_data \
             FROM chat_logs WHERE channel = ",
        );
        builder
            .push_bind(&query.channel)
            .push(" AND week_bucket BETWEEN ")
            .push_bind(*query.buckets.start())
            .push(" AND ")
            .push_bind(*query.buckets.end())
            .push(" AND created_at >= ")
            .push_bind(query.start)
            .push(" AND created_at <= ")
            .push_bind(query.end);
        if let Some(cursor) = cursor {
            builder
                .push(" AND (created_at, id) > (")
                .push_bind(cursor.created_at)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }
        builder
            .push(" ORDER BY created_at, id LIMIT ")
            .push_bind(RANGE_PAGE_SIZE);

        let records: Vec<ChatLogRecord> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let next_cursor = if records.len() as i64 == RANGE_PAGE_SIZE {
            records.last().map(|record| {
                Cursor {
                    created_at: record.created_at,
                    id: record.id,
                }
                .encode()
            })
        } else {
            None
        };

        Ok(RangePage {
            messages: records.into_iter().map(ChatMessage::from).collect(),
            next_cursor,
        })
    }
}
