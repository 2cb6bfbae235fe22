//! 消息数据访问层（DAO）

use crate::hub::message::models::Message;
use crate::hub::types::SendState;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

pub const TABLE_NAME: &str = "local_messages";

/// 消息 DAO
#[derive(Clone)]
pub struct MessageDao {
    db: Pool<Sqlite>,
}

impl MessageDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[MsgDAO/DB] 初始化消息表");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender_id TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                sent_at INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'sent'
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建消息表失败")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_local_messages_conv_time ON local_messages(conversation_id, sent_at)",
        )
        .execute(db)
        .await
        .context("创建消息索引失败")?;
        Ok(())
    }

    fn map_row(row: SqliteRow) -> Result<Message> {
        let state: String = row.get("state");
        Ok(Message {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            content: row.get("content"),
            sent_at: row.get("sent_at"),
            state: state.parse()?,
        })
    }

    /// 获取会话内所有消息（按发送时间升序）
    pub async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, content, sent_at, state
            FROM local_messages
            WHERE conversation_id = ?
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.db)
        .await
        .context("查询消息列表失败")?;
        let list = rows
            .into_iter()
            .map(Self::map_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "[MsgDAO] 会话 {} 本地消息 {} 条",
            conversation_id,
            list.len()
        );
        Ok(list)
    }

    pub async fn get_message(&self, conversation_id: &str, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, content, sent_at, state
            FROM local_messages
            WHERE conversation_id = ? AND id = ?
            "#,
        )
        .bind(conversation_id)
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("查询消息失败")?;
        row.map(Self::map_row).transpose()
    }

    pub async fn upsert(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_messages (id, conversation_id, sender_id, content, sent_at, state)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                sender_id = excluded.sender_id,
                content = excluded.content,
                sent_at = excluded.sent_at,
                state = excluded.state
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(message.sent_at)
        .bind(message.state.as_str())
        .execute(&self.db)
        .await
        .context("插入或更新消息失败")?;
        Ok(())
    }

    pub async fn update_state(&self, id: &str, state: SendState) -> Result<()> {
        sqlx::query("UPDATE local_messages SET state = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.db)
            .await
            .context("更新消息状态失败")?;
        Ok(())
    }

    pub async fn delete(&self, conversation_id: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM local_messages WHERE conversation_id = ? AND id = ?")
            .bind(conversation_id)
            .bind(id)
            .execute(&self.db)
            .await
            .context("删除消息失败")?;
        Ok(result.rows_affected() > 0)
    }

    /// 删除会话时一并删除其消息
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM local_messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.db)
            .await
            .context("删除会话消息失败")?;
        Ok(result.rows_affected())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_messages")
            .execute(&self.db)
            .await
            .context("清空消息失败")?;
        Ok(())
    }
}
