//! 用户数据访问层（DAO）

use crate::hub::user::models::User;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

const SELECT_COLUMNS: &str = r#"
    SELECT id, email, first_name, last_name, role, school_class, avatar_url, created_at, updated_at
    FROM local_users
"#;

/// 用户 DAO
#[derive(Clone)]
pub struct UserDao {
    db: Pool<Sqlite>,
}

impl UserDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[UserDAO/DB] 初始化用户表");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL DEFAULT '',
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL DEFAULT 'student',
                school_class TEXT NOT NULL DEFAULT '',
                avatar_url TEXT,
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(db)
        .await
        .context("创建用户表失败")?;
        Ok(())
    }

    fn map_row(row: SqliteRow) -> User {
        let role: String = row.get("role");
        User {
            id: row.get("id"),
            email: row.get("email"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            role: role.parse().unwrap_or_default(),
            school_class: row.get("school_class"),
            avatar_url: row.get("avatar_url"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .context("查询用户失败")?;
        Ok(row.map(Self::map_row))
    }

    pub async fn get_all_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(SELECT_COLUMNS)
            .fetch_all(&self.db)
            .await
            .context("查询用户列表失败")?;
        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_users (
                id, email, first_name, last_name, role, school_class, avatar_url, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                role = excluded.role,
                school_class = excluded.school_class,
                avatar_url = excluded.avatar_url,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(&user.school_class)
        .bind(&user.avatar_url)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .context("插入或更新用户失败")?;
        debug!("[UserDAO] 已缓存用户: {}", user.id);
        Ok(())
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_users WHERE id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("删除用户失败")?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_users")
            .execute(&self.db)
            .await
            .context("清空用户缓存失败")?;
        Ok(())
    }
}
