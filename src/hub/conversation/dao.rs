//! 会话数据访问层（DAO）

use crate::hub::conversation::models::Conversation;
use crate::hub::serialization::{decode_id_list, encode_id_list};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

pub const TABLE_NAME: &str = "local_conversations";

const SELECT_COLUMNS: &str = r#"
    SELECT id, participant_ids, title, last_message, last_message_at,
           unread_count, created_at, updated_at
    FROM local_conversations
"#;

/// 会话 DAO
#[derive(Clone)]
pub struct ConversationDao {
    db: Pool<Sqlite>,
}

impl ConversationDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[ConvDAO/DB] 初始化会话表");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_conversations (
                id TEXT PRIMARY KEY,
                participant_ids TEXT NOT NULL DEFAULT '[]',
                title TEXT NOT NULL DEFAULT '',
                last_message TEXT NOT NULL DEFAULT '',
                last_message_at INTEGER NOT NULL DEFAULT 0,
                unread_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建会话表失败")?;
        Ok(())
    }

    fn map_row(row: SqliteRow) -> Conversation {
        let participants: String = row.get("participant_ids");
        let unread: i64 = row.get("unread_count");
        Conversation {
            id: row.get("id"),
            participant_ids: decode_id_list(&participants),
            title: row.get("title"),
            last_message: row.get("last_message"),
            last_message_at: row.get("last_message_at"),
            unread_count: unread.max(0) as u32,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// 获取所有会话（最近活跃的在前）
    pub async fn get_all(&self) -> Result<Vec<Conversation>> {
        let sql = format!(
            "{} ORDER BY MAX(last_message_at, created_at) DESC, id ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.db)
            .await
            .context("查询会话列表失败")?;
        let list: Vec<Conversation> = rows.into_iter().map(Self::map_row).collect();
        debug!("[ConvDAO] 获取本地会话列表，共 {} 个", list.len());
        Ok(list)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("查询会话失败")?;
        Ok(row.map(Self::map_row))
    }

    pub async fn upsert(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_conversations (
                id, participant_ids, title, last_message, last_message_at,
                unread_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                participant_ids = excluded.participant_ids,
                title = excluded.title,
                last_message = excluded.last_message,
                last_message_at = excluded.last_message_at,
                unread_count = excluded.unread_count,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&conversation.id)
        .bind(encode_id_list(&conversation.participant_ids))
        .bind(&conversation.title)
        .bind(&conversation.last_message)
        .bind(conversation.last_message_at)
        .bind(conversation.unread_count as i64)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.db)
        .await
        .context("插入或更新会话失败")?;
        Ok(())
    }

    /// 更新最新消息；只接受比当前更新的消息，返回是否更新
    pub async fn update_last_message(&self, id: &str, preview: &str, at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE local_conversations SET
                last_message = ?,
                last_message_at = ?,
                updated_at = ?
            WHERE id = ? AND last_message_at <= ?
            "#,
        )
        .bind(preview)
        .bind(at)
        .bind(at)
        .bind(id)
        .bind(at)
        .execute(&self.db)
        .await
        .context("更新会话最新消息失败")?;
        Ok(result.rows_affected() > 0)
    }

    /// 未读数加一，与消息先后无关；会话不存在时返回 false
    pub async fn increment_unread(&self, id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE local_conversations SET unread_count = unread_count + 1 WHERE id = ?")
                .bind(id)
                .execute(&self.db)
                .await
                .context("增加会话未读数失败")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn reset_unread(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE local_conversations SET unread_count = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await
            .context("清除会话未读数失败")?;
        Ok(())
    }

    /// 所有会话的未读总数
    pub async fn total_unread(&self) -> Result<u32> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(unread_count), 0) FROM local_conversations")
                .fetch_one(&self.db)
                .await
                .context("统计未读总数失败")?;
        Ok(total.max(0) as u32)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM local_conversations WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await
            .context("删除会话失败")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_conversations")
            .execute(&self.db)
            .await
            .context("清空会话失败")?;
        Ok(())
    }
}
