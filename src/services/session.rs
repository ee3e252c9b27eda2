//! 会话与资料管理 - 业务能力层
//!
//! 显式的会话上下文：认证状态只在这里变化，其他组件通过 `subscribe()` 观察。
//!
//! 状态机：`Anonymous → Authenticating → Authenticated`，登出回到 `Anonymous`。
//! 进入 `Authenticated` 时：
//! 1. 读取远程资料文档
//! 2. 与认证提供方的字段合并（已持久化的数据优先）
//! 3. 写入本地缓存，记录"上次登录"的用户
//! 4. 立即应用主题
//! 5. 读取远程文档失败时回退到同一用户的本地缓存；都没有时进入无资料的降级会话

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, DeletionStep, ValidationError};
use crate::infrastructure::auth::MIN_PASSWORD_LEN;
use crate::infrastructure::cache::{profile_key, user_keys, LAST_LOGGED_IN_KEY};
use crate::infrastructure::{AuthProvider, Collection, LocalCache, PersistenceGateway};
use crate::models::{AuthIdentity, Settings, Theme, UserProfile};
use crate::services::export::{self, AccountExport};

/// 已认证的会话
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: AuthIdentity,
    /// `None` 表示已登录但资料不可用（降级会话）
    pub profile: Option<UserProfile>,
}

impl Session {
    pub fn uid(&self) -> &str {
        &self.identity.uid
    }

    pub fn is_degraded(&self) -> bool {
        self.profile.is_none()
    }
}

/// 认证状态
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

/// 资料修改表单
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    /// 为空表示不修改密码
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileUpdateOutcome {
    Updated,
    NoChanges,
}

/// 会话管理器
pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    gateway: Arc<dyn PersistenceGateway>,
    cache: Arc<dyn LocalCache>,
    state: watch::Sender<SessionState>,
    theme: watch::Sender<Theme>,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        gateway: Arc<dyn PersistenceGateway>,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        let (theme, _) = watch::channel(Theme::default());
        Self {
            auth,
            gateway,
            cache,
            state,
            theme,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn theme(&self) -> watch::Receiver<Theme> {
        self.theme.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn gateway(&self) -> Arc<dyn PersistenceGateway> {
        self.gateway.clone()
    }

    fn session(&self) -> Result<Session, ValidationError> {
        self.state
            .borrow()
            .session()
            .cloned()
            .ok_or(ValidationError::NotAuthenticated)
    }

    fn apply_theme(&self, theme: Theme) {
        self.theme.send_replace(theme);
        debug!("主题已应用: {}", theme.as_str());
    }

    /// 更新当前会话中的资料
    fn replace_profile(&self, profile: UserProfile) {
        self.state.send_modify(|state| {
            if let SessionState::Authenticated(session) = state {
                if session.identity.uid == profile.id {
                    session.profile = Some(profile);
                }
            }
        });
    }

    async fn cache_profile(&self, profile: &UserProfile) -> AppResult<()> {
        self.cache
            .set(&profile_key(&profile.id), &serde_json::to_string(profile)?)
            .await?;
        self.cache.set(LAST_LOGGED_IN_KEY, &profile.id).await
    }

    async fn cached_profile_record(&self, uid: &str) -> Option<JsonValue> {
        match self.cache.get(&profile_key(uid)).await {
            Ok(Some(raw)) => serde_json::from_str::<JsonValue>(&raw)
                .ok()
                .filter(|record| record.get("id").and_then(JsonValue::as_str) == Some(uid)),
            Ok(None) => None,
            Err(e) => {
                warn!("读取本地缓存失败: {}", e);
                None
            }
        }
    }

    /// 认证状态变化的唯一入口
    pub async fn on_auth_changed(&self, identity: Option<AuthIdentity>) -> SessionState {
        let Some(identity) = identity else {
            self.state.send_replace(SessionState::Anonymous);
            return SessionState::Anonymous;
        };

        self.state.send_replace(SessionState::Authenticating);
        let uid = identity.uid.clone();
        let cached = self.cached_profile_record(&uid).await;

        let profile = match self.gateway.get_profile(&uid).await {
            Ok(remote) => {
                let persisted = layer_records(cached, remote);
                let profile = UserProfile::merge(&identity, persisted.as_ref());
                if let Err(e) = self.cache_profile(&profile).await {
                    warn!("写入本地缓存失败: {}", e);
                }
                let theme = match profile.theme() {
                    Some(theme) => theme,
                    None => self.cached_theme(&uid).await,
                };
                self.apply_theme(theme);
                Some(profile)
            }
            Err(e) => {
                warn!("读取用户资料失败，尝试使用本地缓存: {}", e);
                let fallback = cached.map(|record| UserProfile::merge(&identity, Some(&record)));
                match &fallback {
                    Some(profile) => {
                        if let Some(theme) = profile.theme() {
                            self.apply_theme(theme);
                        }
                    }
                    None => warn!("⚠️ 用户 {} 没有可用的资料，进入降级会话", uid),
                }
                fallback
            }
        };

        info!("✓ 用户已登录: {}", uid);
        let state = SessionState::Authenticated(Session { identity, profile });
        self.state.send_replace(state.clone());
        state
    }

    async fn cached_theme(&self, uid: &str) -> Theme {
        match self.cache.get(&format!("theme_{}", uid)).await {
            Ok(Some(value)) => Theme::parse(&value).unwrap_or_default(),
            _ => Theme::default(),
        }
    }

    /// 按认证提供方当前的登录用户恢复会话（没有时回到 `Anonymous`）
    pub async fn restore(&self) -> SessionState {
        self.on_auth_changed(self.auth.current_user()).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<SessionState> {
        self.state.send_replace(SessionState::Authenticating);
        match self.auth.sign_in(email, password).await {
            Ok(identity) => Ok(self.on_auth_changed(Some(identity)).await),
            Err(e) => {
                self.state.send_replace(SessionState::Anonymous);
                Err(e.into())
            }
        }
    }

    /// 注册新账号；确认密码不一致时不会调用认证提供方
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> AppResult<SessionState> {
        if password != confirm_password {
            return Err(ValidationError::PasswordMismatch.into());
        }
        self.state.send_replace(SessionState::Authenticating);
        match self.auth.sign_up(name, email, password).await {
            Ok(identity) => Ok(self.on_auth_changed(Some(identity)).await),
            Err(e) => {
                self.state.send_replace(SessionState::Anonymous);
                Err(e.into())
            }
        }
    }

    /// 登出并清除缓存的资料和"上次登录"标记
    pub async fn sign_out(&self) -> AppResult<()> {
        let uid = self.state.borrow().session().map(|s| s.uid().to_string());
        self.auth.sign_out().await?;
        if let Some(uid) = &uid {
            self.cache.remove(&profile_key(uid)).await?;
        }
        self.cache.remove(LAST_LOGGED_IN_KEY).await?;
        self.state.send_replace(SessionState::Anonymous);
        info!("用户已登出");
        Ok(())
    }

    /// 读取设置；远程文档没有设置时创建初始文档
    pub async fn load_settings(&self) -> AppResult<Settings> {
        let session = self.session()?;
        let uid = session.uid().to_string();

        let document = match self.gateway.get_profile(&uid).await {
            Ok(document) => document,
            Err(e) => {
                warn!("读取设置失败，尝试使用本地缓存: {}", e);
                return match self.cached_settings(&uid).await? {
                    Some(settings) => {
                        self.apply_theme(settings.theme);
                        Ok(settings)
                    }
                    None => Err(e),
                };
            }
        };

        let stored = document
            .as_ref()
            .and_then(|doc| doc.get("settings"))
            .filter(|value| !value.is_null())
            .cloned();

        let settings = match stored {
            Some(value) => serde_json::from_value::<Settings>(value)?,
            None => {
                let settings = session
                    .profile
                    .as_ref()
                    .and_then(|p| p.settings.clone())
                    .unwrap_or_default();
                let profile = session.profile.as_ref();
                self.gateway
                    .merge_profile(
                        &uid,
                        json!({
                            "settings": settings,
                            "updatedAt": Utc::now().to_rfc3339(),
                            "email": profile.map(|p| p.email.clone()).unwrap_or_default(),
                            "name": profile.map(|p| p.name.clone()).unwrap_or_default(),
                        }),
                    )
                    .await?;
                debug!("已为用户 {} 创建初始设置文档", uid);
                settings
            }
        };

        self.apply_theme(settings.theme);
        Ok(settings)
    }

    /// 从本地缓存读取设置（离线回退）
    pub async fn cached_settings(&self, uid: &str) -> AppResult<Option<Settings>> {
        let Some(theme) = self.cache.get(&format!("theme_{}", uid)).await? else {
            return Ok(None);
        };
        let mut settings = Settings {
            theme: Theme::parse(&theme).unwrap_or_default(),
            ..Settings::default()
        };
        if let Some(language) = self.cache.get(&format!("language_{}", uid)).await? {
            settings.language = language;
        }
        let flag = |raw: Option<String>, default: bool| {
            raw.and_then(|v| serde_json::from_str::<bool>(&v).ok())
                .unwrap_or(default)
        };
        let n = &mut settings.notifications;
        n.email = flag(self.cache.get(&format!("emailNotifications_{}", uid)).await?, n.email);
        n.task_completed = flag(
            self.cache.get(&format!("taskNotifications_{}", uid)).await?,
            n.task_completed,
        );
        n.grade_ready = flag(
            self.cache.get(&format!("gradeNotifications_{}", uid)).await?,
            n.grade_ready,
        );
        let p = &mut settings.privacy;
        p.profile_visible = flag(
            self.cache.get(&format!("profileVisible_{}", uid)).await?,
            p.profile_visible,
        );
        p.show_email = flag(self.cache.get(&format!("showEmail_{}", uid)).await?, p.show_email);
        Ok(Some(settings))
    }

    /// 保存设置：先写远程文档，再同步写入本地缓存（write-through）
    pub async fn save_settings(&self, settings: &Settings) -> AppResult<()> {
        let session = self.session()?;
        let uid = session.uid();

        self.gateway
            .merge_profile(
                uid,
                json!({ "settings": settings, "updatedAt": Utc::now().to_rfc3339() }),
            )
            .await?;

        for (key, value) in settings_cache_entries(uid, settings) {
            self.cache.set(&key, &value).await?;
        }

        self.apply_theme(settings.theme);
        if let Some(mut profile) = session.profile {
            profile.settings = Some(settings.clone());
            if let Err(e) = self.cache_profile(&profile).await {
                warn!("写入本地缓存失败: {}", e);
            }
            self.replace_profile(profile);
        }
        info!("✓ 设置已保存");
        Ok(())
    }

    /// 修改姓名、邮箱和密码
    ///
    /// 密码校验在调用认证提供方之前完成。
    pub async fn update_profile(&self, update: ProfileUpdate) -> AppResult<ProfileUpdateOutcome> {
        let session = self.session()?;
        let current = session
            .profile
            .clone()
            .unwrap_or_else(|| UserProfile::merge(&session.identity, None));

        let name = update.name.trim().to_string();
        let email = update.email.trim().to_string();
        let change_password = !update.new_password.is_empty();

        if change_password {
            if update.new_password != update.confirm_password {
                return Err(ValidationError::PasswordMismatch.into());
            }
            if update.new_password.chars().count() < MIN_PASSWORD_LEN {
                return Err(ValidationError::WeakPassword {
                    min: MIN_PASSWORD_LEN,
                }
                .into());
            }
        }

        let mut updated = false;
        if name != current.name {
            self.auth.update_display_name(&name).await?;
            updated = true;
        }
        if email != current.email {
            self.auth.update_email(&email).await?;
            updated = true;
        }
        if change_password {
            self.auth.update_password(&update.new_password).await?;
            updated = true;
        }

        if !updated {
            return Ok(ProfileUpdateOutcome::NoChanges);
        }

        self.gateway
            .merge_profile(
                session.uid(),
                json!({ "name": name, "email": email, "updatedAt": Utc::now().to_rfc3339() }),
            )
            .await?;

        let profile = UserProfile {
            name,
            email,
            ..current
        };
        if let Err(e) = self.cache_profile(&profile).await {
            warn!("写入本地缓存失败: {}", e);
        }
        self.replace_profile(profile);
        info!("✓ 资料已更新");
        Ok(ProfileUpdateOutcome::Updated)
    }

    /// 导出账号数据
    pub async fn export_account_data(&self, now: DateTime<Utc>) -> AppResult<AccountExport> {
        let session = self.session()?;
        let profile = session
            .profile
            .clone()
            .unwrap_or_else(|| UserProfile::merge(&session.identity, None));
        let settings = profile.settings.clone().unwrap_or_default();
        Ok(export::export_account(self.gateway.as_ref(), &profile, &settings, now).await)
    }

    /// 删除账号
    ///
    /// 严格按顺序执行：重新认证 → 评估记录 → 科目 → 资料文档 → 认证账号 → 本地缓存。
    /// 重新认证失败时不删除任何数据；之后的步骤失败不会回滚，错误中带有失败的步骤。
    pub async fn delete_account(&self, password: &str) -> AppResult<()> {
        if password.is_empty() {
            return Err(ValidationError::MissingPassword.into());
        }
        let session = self.session()?;
        let uid = session.uid().to_string();

        self.auth
            .reauthenticate(password)
            .await
            .map_err(|e| AppError::deletion(DeletionStep::Reauthenticate, e))?;

        self.delete_collection(&uid, Collection::Tasks)
            .await
            .map_err(|e| AppError::deletion(DeletionStep::Tasks, e))?;
        self.delete_collection(&uid, Collection::Subjects)
            .await
            .map_err(|e| AppError::deletion(DeletionStep::Subjects, e))?;
        self.gateway
            .delete_profile(&uid)
            .await
            .map_err(|e| AppError::deletion(DeletionStep::Profile, e))?;
        self.auth
            .delete_account()
            .await
            .map_err(|e| AppError::deletion(DeletionStep::AuthAccount, e))?;

        self.state.send_replace(SessionState::Anonymous);
        self.purge_cache(&uid)
            .await
            .map_err(|e| AppError::deletion(DeletionStep::LocalCache, e))?;

        info!("✓ 账号 {} 已删除", uid);
        Ok(())
    }

    async fn delete_collection(&self, uid: &str, collection: Collection) -> AppResult<()> {
        let docs = self.gateway.list(uid, collection).await?;
        let results = join_all(
            docs.iter()
                .map(|doc| self.gateway.delete(uid, collection, &doc.id)),
        )
        .await;
        let total = results.len();
        results.into_iter().collect::<AppResult<Vec<_>>>()?;
        debug!("已删除 {} 个 {} 文档", total, collection);
        Ok(())
    }

    async fn purge_cache(&self, uid: &str) -> AppResult<()> {
        for key in user_keys(uid) {
            self.cache.remove(&key).await?;
        }
        if self.cache.get(LAST_LOGGED_IN_KEY).await?.as_deref() == Some(uid) {
            self.cache.remove(LAST_LOGGED_IN_KEY).await?;
        }
        Ok(())
    }
}

/// 本地缓存记录在下，远程文档在上
fn layer_records(cached: Option<JsonValue>, remote: Option<JsonValue>) -> Option<JsonValue> {
    match (cached, remote) {
        (Some(JsonValue::Object(mut base)), Some(JsonValue::Object(top))) => {
            base.extend(top);
            Some(JsonValue::Object(base))
        }
        (cached, None) => cached,
        (_, remote) => remote,
    }
}

/// 设置在本地缓存中的键值
fn settings_cache_entries(uid: &str, settings: &Settings) -> Vec<(String, String)> {
    let flag = |value: bool| value.to_string();
    vec![
        (format!("theme_{}", uid), settings.theme.as_str().to_string()),
        (format!("language_{}", uid), settings.language.clone()),
        (
            format!("emailNotifications_{}", uid),
            flag(settings.notifications.email),
        ),
        (
            format!("taskNotifications_{}", uid),
            flag(settings.notifications.task_completed),
        ),
        (
            format!("gradeNotifications_{}", uid),
            flag(settings.notifications.grade_ready),
        ),
        (
            format!("profileVisible_{}", uid),
            flag(settings.privacy.profile_visible),
        ),
        (format!("showEmail_{}", uid), flag(settings.privacy.show_email)),
    ]
}
