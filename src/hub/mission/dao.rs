//! 任务数据访问层（DAO）

use crate::hub::mission::models::Mission;
use crate::hub::serialization::{decode_id_list, encode_id_list};
use crate::hub::types::SyncState;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

pub const TABLE_NAME: &str = "local_missions";

const SELECT_COLUMNS: &str = r#"
    SELECT id, author_id, title, description, location, starts_at, ends_at,
           capacity, participant_ids, created_at, updated_at, state
    FROM local_missions
"#;

/// 任务 DAO
#[derive(Clone)]
pub struct MissionDao {
    db: Pool<Sqlite>,
}

impl MissionDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[MissionDAO/DB] 初始化任务表");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_missions (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                starts_at INTEGER NOT NULL DEFAULT 0,
                ends_at INTEGER,
                capacity INTEGER,
                participant_ids TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'published'
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建任务表失败")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_local_missions_starts_at ON local_missions(starts_at)",
        )
        .execute(db)
        .await
        .context("创建任务索引失败")?;
        Ok(())
    }

    fn map_row(row: SqliteRow) -> Result<Mission> {
        let state: String = row.get("state");
        let participants: String = row.get("participant_ids");
        let capacity: Option<i64> = row.get("capacity");
        Ok(Mission {
            id: row.get("id"),
            author_id: row.get("author_id"),
            title: row.get("title"),
            description: row.get("description"),
            location: row.get("location"),
            starts_at: row.get("starts_at"),
            ends_at: row.get("ends_at"),
            capacity: capacity.map(|c| c.max(0) as u32),
            participant_ids: decode_id_list(&participants),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            state: state.parse()?,
        })
    }

    /// 获取所有任务（按开始时间升序）
    pub async fn get_all(&self) -> Result<Vec<Mission>> {
        let sql = format!("{} ORDER BY starts_at ASC, id ASC", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.db)
            .await
            .context("查询任务列表失败")?;
        let list = rows
            .into_iter()
            .map(Self::map_row)
            .collect::<Result<Vec<_>>>()?;
        debug!("[MissionDAO] 获取本地任务列表，共 {} 条", list.len());
        Ok(list)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Mission>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("查询任务失败")?;
        row.map(Self::map_row).transpose()
    }

    pub async fn upsert(&self, mission: &Mission) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_missions (
                id, author_id, title, description, location, starts_at, ends_at,
                capacity, participant_ids, created_at, updated_at, state
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                author_id = excluded.author_id,
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                capacity = excluded.capacity,
                participant_ids = excluded.participant_ids,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                state = excluded.state
            "#,
        )
        .bind(&mission.id)
        .bind(&mission.author_id)
        .bind(&mission.title)
        .bind(&mission.description)
        .bind(&mission.location)
        .bind(mission.starts_at)
        .bind(mission.ends_at)
        .bind(mission.capacity.map(|c| c as i64))
        .bind(encode_id_list(&mission.participant_ids))
        .bind(mission.created_at)
        .bind(mission.updated_at)
        .bind(mission.state.as_str())
        .execute(&self.db)
        .await
        .context("插入或更新任务失败")?;
        Ok(())
    }

    pub async fn update_state(&self, id: &str, state: SyncState) -> Result<()> {
        sqlx::query("UPDATE local_missions SET state = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.db)
            .await
            .context("更新任务状态失败")?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM local_missions WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await
            .context("删除任务失败")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_missions")
            .execute(&self.db)
            .await
            .context("清空任务失败")?;
        Ok(())
    }
}
