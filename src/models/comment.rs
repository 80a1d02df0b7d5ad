use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::profile::ProfileRef;

/// Комментарий к событию. `likes_count` поддерживается бэкендом, клиент
/// только отражает его; `parent_comment_id` даёт один уровень "ответа на".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub parent_comment_id: Option<i64>,
    #[serde(default)]
    pub profiles: Option<ProfileRef>,
}
