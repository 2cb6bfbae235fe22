pub mod hub;

// 重新导出常用类型，方便外部使用
pub use hub::{
    announcement::Announcement,
    auth::RegisterRequest,
    conversation::Conversation,
    error::{ApiError, AuthError, MissionError, ValidationError},
    message::Message,
    mission::{Mission, MissionDraft},
    user::User,
    ClientConfig, Listeners, SchoolHubClient, Workspace,
};
