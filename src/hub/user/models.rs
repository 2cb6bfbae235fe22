//! 用户模型定义

use crate::hub::reconcile::Identifiable;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Admin => "admin",
        }
    }

    /// 是否可以发布公告与任务
    pub fn can_publish(&self) -> bool {
        matches!(self, UserRole::Teacher | UserRole::Admin)
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(UserRole::Student),
            "teacher" => Ok(UserRole::Teacher),
            "admin" => Ok(UserRole::Admin),
            other => Err(anyhow::anyhow!("未知的用户角色: {}", other)),
        }
    }
}

/// 用户资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: UserRole,
    /// 所在班级
    #[serde(default)]
    pub school_class: String,
    #[serde(rename = "avatarURL", default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl User {
    /// 显示名称（姓名为空时回退到邮箱）
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

impl Identifiable for User {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_decodes_with_defaults() {
        let user: User = serde_json::from_str(
            r#"{"id":"u1","email":"ana@school.test","firstName":"Ana","role":"teacher"}"#,
        )
        .unwrap();
        assert_eq!(user.role, UserRole::Teacher);
        assert!(user.role.can_publish());
        assert_eq!(user.display_name(), "Ana");
        assert!(user.avatar_url.is_none());
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let user: User = serde_json::from_str(r#"{"id":"u1","email":"x@school.test"}"#).unwrap();
        assert_eq!(user.display_name(), "x@school.test");
        assert!(!user.role.can_publish());
    }
}
