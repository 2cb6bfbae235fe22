//! 公告 HTTP API 客户端

use crate::hub::announcement::models::Announcement;
use crate::hub::http::ApiClient;
use crate::hub::serialization::deserialize_null_default;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// 公告远端数据源
#[async_trait]
pub trait AnnouncementRemote: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Announcement>>;

    /// 创建公告，返回服务器保存后的版本（id 沿用客户端生成的 id）
    async fn create(&self, announcement: &Announcement) -> Result<Announcement>;

    async fn update(&self, announcement: &Announcement) -> Result<Announcement>;

    async fn delete(&self, id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct AnnouncementsData {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    announcements: Vec<Announcement>,
}

#[derive(Deserialize)]
struct AnnouncementData {
    announcement: Announcement,
}

/// 公告相关的 HTTP API 客户端
pub struct AnnouncementApi {
    client: ApiClient,
}

impl AnnouncementApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AnnouncementRemote for AnnouncementApi {
    async fn fetch_all(&self) -> Result<Vec<Announcement>> {
        let data: Option<AnnouncementsData> = self
            .client
            .post("/announcement/get_all", &json!({}), "获取公告列表")
            .await?;
        let list = data.map(|d| d.announcements).unwrap_or_default();
        info!("[AnnAPI] ✅ 获取公告 {} 条", list.len());
        Ok(list)
    }

    async fn create(&self, announcement: &Announcement) -> Result<Announcement> {
        let data: AnnouncementData = self
            .client
            .post_data("/announcement/create", announcement, "发布公告")
            .await?;
        Ok(data.announcement)
    }

    async fn update(&self, announcement: &Announcement) -> Result<Announcement> {
        let data: AnnouncementData = self
            .client
            .post_data("/announcement/update", announcement, "更新公告")
            .await?;
        Ok(data.announcement)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.client
            .post_unit("/announcement/delete", &json!({ "id": id }), "删除公告")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::types::SyncState;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_all_marks_items_published() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/announcement/get_all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errCode": 0,
                "errMsg": "",
                "data": {"announcements": [
                    {"id": "a1", "authorID": "t1", "title": "运动会", "content": "周五举行", "createdAt": 10}
                ]}
            })))
            .mount(&server)
            .await;

        let api = AnnouncementApi::new(ApiClient::new(
            reqwest::Client::new(),
            server.uri(),
            Duration::from_secs(5),
        ));
        let list = api.fetch_all().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].state, SyncState::Published);
        assert_eq!(list[0].image_url, None);
    }
}
