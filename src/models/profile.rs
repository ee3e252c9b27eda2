use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// 所有账号的固定角色
pub const DEFAULT_ROLE: &str = "teacher";

/// 界面主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub email: bool,
    pub task_completed: bool,
    pub grade_ready: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email: true,
            task_completed: true,
            grade_ready: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    pub profile_visible: bool,
    pub show_email: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            profile_visible: true,
            show_email: false,
        }
    }
}

/// 用户设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: Theme,
    pub language: String,
    pub notifications: NotificationSettings,
    pub privacy: PrivacySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            language: "es".to_string(),
            notifications: NotificationSettings::default(),
            privacy: PrivacySettings::default(),
        }
    }
}

/// 认证提供方返回的身份信息（"新鲜"字段）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthIdentity {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: Option<String>,
}

/// 用户资料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

impl UserProfile {
    /// 合并身份信息与已持久化的资料
    ///
    /// 认证提供方的字段作为底层，已持久化记录（本地缓存或远程文档）覆盖其上，
    /// 重叠的键以持久化记录为准。`id` 始终取认证提供方的 uid。
    pub fn merge(fresh: &AuthIdentity, persisted: Option<&JsonValue>) -> Self {
        let mut layered = Map::new();
        layered.insert("id".into(), JsonValue::String(fresh.uid.clone()));
        layered.insert(
            "name".into(),
            JsonValue::String(fresh.display_name.clone().unwrap_or_default()),
        );
        layered.insert(
            "email".into(),
            JsonValue::String(fresh.email.clone().unwrap_or_default()),
        );
        layered.insert(
            "photoURL".into(),
            JsonValue::String(fresh.photo_url.clone().unwrap_or_default()),
        );
        layered.insert("role".into(), JsonValue::String(DEFAULT_ROLE.to_string()));
        if let Some(created_at) = &fresh.created_at {
            layered.insert("createdAt".into(), JsonValue::String(created_at.clone()));
        }

        if let Some(JsonValue::Object(record)) = persisted {
            for (key, value) in record {
                // null 不覆盖身份字段，避免把必填字符串清空
                if value.is_null() || key == "id" {
                    continue;
                }
                layered.insert(key.clone(), value.clone());
            }
        }

        match serde_json::from_value::<UserProfile>(JsonValue::Object(layered)) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("已持久化的资料格式异常，仅使用认证信息: {}", e);
                Self::merge(fresh, None)
            }
        }
    }

    /// 当前生效的主题
    pub fn theme(&self) -> Option<Theme> {
        self.settings.as_ref().map(|s| s.theme)
    }
}
