//! 登录会话的本地持久化

use crate::hub::auth::models::AuthSession;
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// 会话 DAO（单行表，只保存当前登录会话）
#[derive(Clone)]
pub struct SessionDao {
    db: Pool<Sqlite>,
}

impl SessionDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_session (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                user_id TEXT NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                id_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL DEFAULT '',
                expires_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建会话表失败")?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<AuthSession>> {
        let row = sqlx::query(
            "SELECT user_id, email, id_token, refresh_token, expires_at FROM local_session WHERE slot = 1",
        )
        .fetch_optional(&self.db)
        .await
        .context("读取本地会话失败")?;

        Ok(row.map(|row| AuthSession {
            user_id: row.get("user_id"),
            email: row.get("email"),
            id_token: row.get("id_token"),
            refresh_token: row.get("refresh_token"),
            expires_at: row.get("expires_at"),
        }))
    }

    pub async fn save(&self, session: &AuthSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_session (slot, user_id, email, id_token, refresh_token, expires_at)
            VALUES (1, ?, ?, ?, ?, ?)
            ON CONFLICT(slot) DO UPDATE SET
                user_id = excluded.user_id,
                email = excluded.email,
                id_token = excluded.id_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&session.user_id)
        .bind(&session.email)
        .bind(&session.id_token)
        .bind(&session.refresh_token)
        .bind(session.expires_at)
        .execute(&self.db)
        .await
        .context("保存本地会话失败")?;
        debug!("[SessionDAO] 已保存会话: {}", session.user_id);
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_session")
            .execute(&self.db)
            .await
            .context("清除本地会话失败")?;
        Ok(())
    }
}
