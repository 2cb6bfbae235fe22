//! 任务 HTTP API 客户端

use crate::hub::http::ApiClient;
use crate::hub::mission::models::Mission;
use crate::hub::serialization::deserialize_null_default;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// 任务远端数据源
#[async_trait]
pub trait MissionRemote: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Mission>>;

    async fn create(&self, mission: &Mission) -> Result<Mission>;

    async fn update(&self, mission: &Mission) -> Result<Mission>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// 报名，返回服务器更新后的任务
    async fn join(&self, mission_id: &str, user_id: &str) -> Result<Mission>;

    /// 取消报名，返回服务器更新后的任务
    async fn leave(&self, mission_id: &str, user_id: &str) -> Result<Mission>;
}

#[derive(Deserialize)]
struct MissionsData {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    missions: Vec<Mission>,
}

#[derive(Deserialize)]
struct MissionData {
    mission: Mission,
}

/// 任务相关的 HTTP API 客户端
pub struct MissionApi {
    client: ApiClient,
}

impl MissionApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    async fn post_mission(&self, path: &str, body: &serde_json::Value, op: &str) -> Result<Mission> {
        let data: MissionData = self.client.post_data(path, body, op).await?;
        Ok(data.mission)
    }
}

#[async_trait]
impl MissionRemote for MissionApi {
    async fn fetch_all(&self) -> Result<Vec<Mission>> {
        let data: Option<MissionsData> = self
            .client
            .post("/mission/get_all", &json!({}), "获取任务列表")
            .await?;
        let list = data.map(|d| d.missions).unwrap_or_default();
        info!("[MissionAPI] ✅ 获取任务 {} 条", list.len());
        Ok(list)
    }

    async fn create(&self, mission: &Mission) -> Result<Mission> {
        let data: MissionData = self
            .client
            .post_data("/mission/create", mission, "发布任务")
            .await?;
        Ok(data.mission)
    }

    async fn update(&self, mission: &Mission) -> Result<Mission> {
        let data: MissionData = self
            .client
            .post_data("/mission/update", mission, "更新任务")
            .await?;
        Ok(data.mission)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.client
            .post_unit("/mission/delete", &json!({ "id": id }), "删除任务")
            .await
    }

    async fn join(&self, mission_id: &str, user_id: &str) -> Result<Mission> {
        self.post_mission(
            "/mission/join",
            &json!({ "missionID": mission_id, "userID": user_id }),
            "报名任务",
        )
        .await
    }

    async fn leave(&self, mission_id: &str, user_id: &str) -> Result<Mission> {
        self.post_mission(
            "/mission/leave",
            &json!({ "missionID": mission_id, "userID": user_id }),
            "取消报名",
        )
        .await
    }
}
