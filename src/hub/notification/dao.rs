//! 推送令牌数据访问层（DAO），每个用户保存一条

use crate::hub::notification::models::PushToken;
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};

/// 推送令牌 DAO
#[derive(Clone)]
pub struct PushTokenDao {
    db: Pool<Sqlite>,
}

impl PushTokenDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_push_tokens (
                user_id TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                platform TEXT NOT NULL DEFAULT '',
                updated_at INTEGER NOT NULL DEFAULT 0,
                uploaded INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建推送令牌表失败")?;
        Ok(())
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<PushToken>> {
        let row = sqlx::query(
            "SELECT user_id, token, platform, updated_at, uploaded FROM local_push_tokens WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("查询推送令牌失败")?;

        Ok(row.map(|row| PushToken {
            token: row.get("token"),
            user_id: row.get("user_id"),
            platform: row.get("platform"),
            updated_at: row.get("updated_at"),
            uploaded: row.get::<i64, _>("uploaded") != 0,
        }))
    }

    pub async fn save(&self, token: &PushToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_push_tokens (user_id, token, platform, updated_at, uploaded)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                token = excluded.token,
                platform = excluded.platform,
                updated_at = excluded.updated_at,
                uploaded = excluded.uploaded
            "#,
        )
        .bind(&token.user_id)
        .bind(&token.token)
        .bind(&token.platform)
        .bind(token.updated_at)
        .bind(token.uploaded as i64)
        .execute(&self.db)
        .await
        .context("保存推送令牌失败")?;
        Ok(())
    }

    pub async fn delete(&self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_push_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("删除推送令牌失败")?;
        Ok(())
    }
}
