use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::user::UserId;

/// 阅读记录 / 点赞条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub post_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(post_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            post_id: post_id.into(),
            timestamp,
        }
    }
}

/// 用户社交档案文档（按数字用户 ID 存储）
///
/// 同一用户的 `likes` 中每个 post_id 最多出现一次，由存储层的条件写入保证。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialProfile {
    pub user_id: UserId,
    pub username: String,
    pub history: Vec<ActivityEntry>,
    pub likes: Vec<ActivityEntry>,
    /// 我订阅的用户
    pub subscribed_to: Vec<UserId>,
    /// 订阅我的用户
    pub subscribers: Vec<UserId>,
    pub account_created: Option<DateTime<Utc>>,
    pub registration_ip: Option<String>,
}

impl Default for SocialProfile {
    fn default() -> Self {
        Self::empty(0, "")
    }
}

impl SocialProfile {
    /// 空档案（所有数组为空）
    pub fn empty(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            history: Vec::new(),
            likes: Vec::new(),
            subscribed_to: Vec::new(),
            subscribers: Vec::new(),
            account_created: None,
            registration_ip: None,
        }
    }

    /// 注册时创建的档案
    pub fn registered(
        user_id: UserId,
        username: impl Into<String>,
        created_at: DateTime<Utc>,
        registration_ip: Option<String>,
    ) -> Self {
        Self {
            account_created: Some(created_at),
            registration_ip,
            ..Self::empty(user_id, username)
        }
    }

    pub fn has_liked(&self, post_id: &str) -> bool {
        self.likes.iter().any(|e| e.post_id == post_id)
    }

    pub fn is_subscribed_to(&self, target: UserId) -> bool {
        self.subscribed_to.contains(&target)
    }

    /// 加入阅读记录；已存在时只刷新时间戳，返回是否为新条目
    pub fn touch_history(&mut self, post_id: &str, at: DateTime<Utc>) -> bool {
        match self.history.iter_mut().find(|e| e.post_id == post_id) {
            Some(entry) => {
                entry.timestamp = at;
                false
            }
            None => {
                self.history.push(ActivityEntry::new(post_id, at));
                true
            }
        }
    }

    /// 条件加入点赞；已点赞时不修改，返回是否发生变化
    pub fn add_like(&mut self, post_id: &str, at: DateTime<Utc>) -> bool {
        if self.has_liked(post_id) {
            return false;
        }
        self.likes.push(ActivityEntry::new(post_id, at));
        true
    }

    /// 取消点赞，返回是否发生变化
    pub fn remove_like(&mut self, post_id: &str) -> bool {
        let before = self.likes.len();
        self.likes.retain(|e| e.post_id != post_id);
        self.likes.len() != before
    }
}

/// 阅读记录写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryUpdate {
    Added,
    TimestampUpdated,
}

/// 对外展示的用户信息（不含阅读记录与点赞）
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub user_id: UserId,
    pub username: String,
    pub subscribed_to: Vec<UserId>,
    pub subscribers: Vec<UserId>,
    pub subscriber_count: usize,
    pub account_created: Option<DateTime<Utc>>,
}

impl From<SocialProfile> for UserInfo {
    fn from(profile: SocialProfile) -> Self {
        Self {
            user_id: profile.user_id,
            username: profile.username,
            subscriber_count: profile.subscribers.len(),
            subscribed_to: profile.subscribed_to,
            subscribers: profile.subscribers,
            account_created: profile.account_created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_history_refreshes_timestamp() {
        let mut profile = SocialProfile::empty(1, "alice");
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);

        assert!(profile.touch_history("p1", t0));
        assert!(!profile.touch_history("p1", t1));
        assert_eq!(profile.history.len(), 1);
        assert_eq!(profile.history[0].timestamp, t1);
    }

    #[test]
    fn test_like_toggle() {
        let mut profile = SocialProfile::empty(1, "alice");
        assert!(profile.add_like("p1", Utc::now()));
        assert!(!profile.add_like("p1", Utc::now()));
        assert_eq!(profile.likes.len(), 1);
        assert!(profile.remove_like("p1"));
        assert!(!profile.remove_like("p1"));
    }

    #[test]
    fn test_document_missing_fields_default() {
        let profile: SocialProfile =
            serde_json::from_value(serde_json::json!({ "user_id": 3, "username": "carol" })).unwrap();
        assert!(profile.likes.is_empty());
        assert!(profile.subscribers.is_empty());
    }
}
