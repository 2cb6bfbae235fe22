//! SQLite 数据库工具：统一创建连接池、初始化各模块表结构，并记录同步时间

use crate::hub::announcement::AnnouncementDao;
use crate::hub::auth::SessionDao;
use crate::hub::conversation::ConversationDao;
use crate::hub::message::MessageDao;
use crate::hub::mission::MissionDao;
use crate::hub::notification::PushTokenDao;
use crate::hub::user::UserDao;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tracing::info;

/// 创建 SQLite 连接池并初始化所有表
pub async fn create_sqlite_pool(db_url: &str, max_connections: u32) -> Result<Pool<Sqlite>> {
    info!("[DB] 连接 SQLite 数据库: {}", db_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .context(format!("连接SQLite数据库失败: {}", db_url))?;

    init_all_tables(&pool).await?;
    Ok(pool)
}

/// 初始化所有模块的表结构（幂等）
pub async fn init_all_tables(db: &Pool<Sqlite>) -> Result<()> {
    SyncStateDao::init_db_with_connection(db).await?;
    SessionDao::init_db_with_connection(db).await?;
    UserDao::init_db_with_connection(db).await?;
    AnnouncementDao::init_db_with_connection(db).await?;
    MissionDao::init_db_with_connection(db).await?;
    ConversationDao::init_db_with_connection(db).await?;
    MessageDao::init_db_with_connection(db).await?;
    PushTokenDao::init_db_with_connection(db).await?;
    info!("[DB] 数据库表初始化完成");
    Ok(())
}

/// 同步状态：某张表（针对某个实体，如用户或会话）最近一次成功同步的时间
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSyncState {
    #[serde(rename = "tableName")]
    pub table_name: String,
    #[serde(rename = "entityID")]
    pub entity_id: String,
    #[serde(rename = "lastSyncedAt")]
    pub last_synced_at: i64,
}

/// 同步状态 DAO
#[derive(Clone)]
pub struct SyncStateDao {
    db: Pool<Sqlite>,
}

impl SyncStateDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_sync_state (
                table_name TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                last_synced_at INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (table_name, entity_id)
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建同步状态表失败")?;
        Ok(())
    }

    pub async fn get(&self, table_name: &str, entity_id: &str) -> Result<Option<LocalSyncState>> {
        let row = sqlx::query(
            r#"
            SELECT table_name, entity_id, last_synced_at
            FROM local_sync_state
            WHERE table_name = ? AND entity_id = ?
            "#,
        )
        .bind(table_name)
        .bind(entity_id)
        .fetch_optional(&self.db)
        .await
        .context("查询同步状态失败")?;

        Ok(row.map(|row| LocalSyncState {
            table_name: row.get("table_name"),
            entity_id: row.get("entity_id"),
            last_synced_at: row.get("last_synced_at"),
        }))
    }

    pub async fn mark_synced(&self, table_name: &str, entity_id: &str, at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_sync_state (table_name, entity_id, last_synced_at)
            VALUES (?, ?, ?)
            ON CONFLICT(table_name, entity_id) DO UPDATE SET
                last_synced_at = excluded.last_synced_at
            "#,
        )
        .bind(table_name)
        .bind(entity_id)
        .bind(at)
        .execute(&self.db)
        .await
        .context("保存同步状态失败")?;
        Ok(())
    }

    /// 清空所有同步状态（退出登录时调用）
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_sync_state")
            .execute(&self.db)
            .await
            .context("清空同步状态失败")?;
        Ok(())
    }
}

/// 测试用内存数据库：单连接且不过期，保证所有查询看到同一个库
#[cfg(test)]
pub(crate) async fn memory_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("打开内存数据库失败");
    init_all_tables(&pool).await.expect("初始化表失败");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sync_state_upserts_per_table_and_entity() -> Result<()> {
        let pool = memory_pool().await;
        let dao = SyncStateDao::new(pool);

        assert!(dao.get("local_announcements", "u1").await?.is_none());
        dao.mark_synced("local_announcements", "u1", 100).await?;
        dao.mark_synced("local_announcements", "u1", 200).await?;
        dao.mark_synced("local_missions", "u1", 50).await?;

        let state = dao.get("local_announcements", "u1").await?.unwrap();
        assert_eq!(state.last_synced_at, 200);
        assert_eq!(dao.get("local_missions", "u1").await?.unwrap().last_synced_at, 50);

        dao.clear().await?;
        assert!(dao.get("local_missions", "u1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn table_init_is_idempotent() -> Result<()> {
        let pool = memory_pool().await;
        init_all_tables(&pool).await?;
        Ok(())
    }
}
