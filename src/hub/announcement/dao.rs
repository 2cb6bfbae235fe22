//! 公告数据访问层（DAO）

use crate::hub::announcement::models::Announcement;
use crate::hub::types::SyncState;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

pub const TABLE_NAME: &str = "local_announcements";

const SELECT_COLUMNS: &str = r#"
    SELECT id, author_id, title, content, image_url, created_at, updated_at, state
    FROM local_announcements
"#;

/// 公告 DAO
#[derive(Clone)]
pub struct AnnouncementDao {
    db: Pool<Sqlite>,
}

impl AnnouncementDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[AnnDAO/DB] 初始化公告表");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_announcements (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                image_url TEXT,
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'published'
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建公告表失败")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_local_announcements_created_at ON local_announcements(created_at)",
        )
        .execute(db)
        .await
        .context("创建公告索引失败")?;
        Ok(())
    }

    fn map_row(row: SqliteRow) -> Result<Announcement> {
        let state: String = row.get("state");
        Ok(Announcement {
            id: row.get("id"),
            author_id: row.get("author_id"),
            title: row.get("title"),
            content: row.get("content"),
            image_url: row.get("image_url"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            state: state.parse()?,
        })
    }

    /// 获取所有公告（最新的在前）
    pub async fn get_all(&self) -> Result<Vec<Announcement>> {
        let sql = format!("{} ORDER BY created_at DESC, id ASC", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.db)
            .await
            .context("查询公告列表失败")?;
        let list = rows
            .into_iter()
            .map(Self::map_row)
            .collect::<Result<Vec<_>>>()?;
        debug!("[AnnDAO] 获取本地公告列表，共 {} 条", list.len());
        Ok(list)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Announcement>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("查询公告失败")?;
        row.map(Self::map_row).transpose()
    }

    pub async fn upsert(&self, announcement: &Announcement) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_announcements (
                id, author_id, title, content, image_url, created_at, updated_at, state
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                author_id = excluded.author_id,
                title = excluded.title,
                content = excluded.content,
                image_url = excluded.image_url,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                state = excluded.state
            "#,
        )
        .bind(&announcement.id)
        .bind(&announcement.author_id)
        .bind(&announcement.title)
        .bind(&announcement.content)
        .bind(&announcement.image_url)
        .bind(announcement.created_at)
        .bind(announcement.updated_at)
        .bind(announcement.state.as_str())
        .execute(&self.db)
        .await
        .context("插入或更新公告失败")?;
        Ok(())
    }

    pub async fn update_state(&self, id: &str, state: SyncState) -> Result<()> {
        sqlx::query("UPDATE local_announcements SET state = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.db)
            .await
            .context("更新公告状态失败")?;
        Ok(())
    }

    /// 删除公告，返回是否确实删除了记录
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM local_announcements WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await
            .context("删除公告失败")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_announcements")
            .execute(&self.db)
            .await
            .context("清空公告失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::db::memory_pool;
    use crate::hub::testing::sample_announcement;

    #[tokio::test]
    async fn upsert_replaces_by_id_and_orders_newest_first() -> Result<()> {
        let dao = AnnouncementDao::new(memory_pool().await);
        dao.upsert(&sample_announcement("a1", 100)).await?;
        dao.upsert(&sample_announcement("a2", 300)).await?;

        let mut edited = sample_announcement("a1", 100);
        edited.title = "改期通知".to_string();
        edited.created_at = 500;
        dao.upsert(&edited).await?;

        let ids: Vec<String> = dao.get_all().await?.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(dao.get_by_id("a1").await?.unwrap().title, "改期通知");

        dao.update_state("a2", SyncState::Error).await?;
        assert_eq!(dao.get_by_id("a2").await?.unwrap().state, SyncState::Error);

        assert!(dao.delete("a2").await?);
        assert!(!dao.delete("a2").await?);
        Ok(())
    }
}
