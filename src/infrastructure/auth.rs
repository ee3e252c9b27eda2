//! 认证提供方 - 基础设施层
//!
//! `AuthProvider` 是外部认证服务的边界；`LocalAuthProvider` 是本地实现，
//! 账号保存在内存中，密码使用 Argon2id 哈希。

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::AuthError;
use crate::models::AuthIdentity;

/// 认证提供方接受的最短密码
pub const MIN_PASSWORD_LEN: usize = 6;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError>;

    async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthIdentity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// 当前登录用户的最新身份信息
    fn current_user(&self) -> Option<AuthIdentity>;

    /// 使用密码重新认证当前用户
    async fn reauthenticate(&self, password: &str) -> Result<(), AuthError>;

    async fn update_display_name(&self, name: &str) -> Result<(), AuthError>;

    async fn update_email(&self, email: &str) -> Result<(), AuthError>;

    async fn update_password(&self, password: &str) -> Result<(), AuthError>;

    /// 删除当前用户的账号
    async fn delete_account(&self) -> Result<(), AuthError>;
}

struct Account {
    uid: String,
    name: String,
    email: String,
    password_hash: String,
    created_at: String,
}

impl Account {
    fn identity(&self) -> AuthIdentity {
        AuthIdentity {
            uid: self.uid.clone(),
            display_name: Some(self.name.clone()).filter(|n| !n.is_empty()),
            email: Some(self.email.clone()),
            photo_url: None,
            created_at: Some(self.created_at.clone()),
        }
    }
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    current: Option<String>,
}

impl AuthState {
    fn find_by_email(&self, email: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email.trim()))
    }

    fn current_account(&mut self) -> Result<&mut Account, AuthError> {
        let uid = self.current.clone().ok_or(AuthError::NotSignedIn)?;
        self.accounts.get_mut(&uid).ok_or(AuthError::UserNotFound)
    }
}

/// 本地认证提供方
#[derive(Default)]
pub struct LocalAuthProvider {
    state: Mutex<AuthState>,
}

impl LocalAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个固定 uid 的账号（用于命令行运行，保证多次运行数据归属同一用户）
    pub fn with_account(
        uid: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        password: &str,
    ) -> Result<Self, AuthError> {
        let provider = Self::new();
        let account = Account {
            uid: uid.into(),
            name: name.into(),
            email: email.into(),
            password_hash: hash_password(password)?,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        provider
            .state()
            .accounts
            .insert(account.uid.clone(), account);
        Ok(provider)
    }

    fn state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, AuthError> {
        let mut state = self.state();
        let account = state.find_by_email(email).ok_or(AuthError::UserNotFound)?;
        if !verify_password(password, &account.password_hash)? {
            return Err(AuthError::WrongPassword);
        }
        let identity = account.identity();
        state.current = Some(identity.uid.clone());
        info!("✓ 用户登录: {}", identity.uid);
        Ok(identity)
    }

    async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthIdentity, AuthError> {
        validate_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let mut state = self.state();
        if state.find_by_email(email).is_some() {
            return Err(AuthError::EmailInUse);
        }
        let account = Account {
            uid: uuid::Uuid::now_v7().to_string(),
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password_hash: hash_password(password)?,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let identity = account.identity();
        state.accounts.insert(account.uid.clone(), account);
        state.current = Some(identity.uid.clone());
        info!("✓ 新用户注册: {}", identity.uid);
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.state().current = None;
        Ok(())
    }

    fn current_user(&self) -> Option<AuthIdentity> {
        let state = self.state();
        let uid = state.current.as_ref()?;
        state.accounts.get(uid).map(Account::identity)
    }

    async fn reauthenticate(&self, password: &str) -> Result<(), AuthError> {
        let mut state = self.state();
        let account = state.current_account()?;
        if verify_password(password, &account.password_hash)? {
            debug!("重新认证成功: {}", account.uid);
            Ok(())
        } else {
            Err(AuthError::WrongPassword)
        }
    }

    async fn update_display_name(&self, name: &str) -> Result<(), AuthError> {
        let mut state = self.state();
        state.current_account()?.name = name.trim().to_string();
        Ok(())
    }

    async fn update_email(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;
        let mut state = self.state();
        let uid = state.current.clone().ok_or(AuthError::NotSignedIn)?;
        if state
            .find_by_email(email)
            .is_some_and(|other| other.uid != uid)
        {
            return Err(AuthError::EmailInUse);
        }
        state.current_account()?.email = email.trim().to_string();
        Ok(())
    }

    async fn update_password(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let hash = hash_password(password)?;
        let mut state = self.state();
        state.current_account()?.password_hash = hash;
        Ok(())
    }

    async fn delete_account(&self) -> Result<(), AuthError> {
        let mut state = self.state();
        let uid = state.current.take().ok_or(AuthError::NotSignedIn)?;
        state.accounts.remove(&uid);
        info!("账号已删除: {}", uid);
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AuthError::InvalidEmail),
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Provider(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::Provider(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Provider(e.to_string())),
    }
}
