//! 本地缓存 - 基础设施层
//!
//! 键值形式的本地存储，用作离线回退（资料、设置、上次登录的用户）。

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{AppError, AppResult};

/// 上次登录用户的缓存键
pub const LAST_LOGGED_IN_KEY: &str = "last_logged_in_user_id";

/// 缓存键
pub fn profile_key(uid: &str) -> String {
    format!("user_{}", uid)
}

/// 某个用户在本地缓存中的全部键
pub fn user_keys(uid: &str) -> Vec<String> {
    vec![
        profile_key(uid),
        format!("theme_{}", uid),
        format!("language_{}", uid),
        format!("emailNotifications_{}", uid),
        format!("taskNotifications_{}", uid),
        format!("gradeNotifications_{}", uid),
        format!("profileVisible_{}", uid),
        format!("showEmail_{}", uid),
    ]
}

#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> AppResult<()>;
    async fn remove(&self, key: &str) -> AppResult<()>;
}

/// 内存缓存
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| AppError::persistence("cache.get", e))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| AppError::persistence("cache.set", e))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| AppError::persistence("cache.remove", e))?;
        entries.remove(key);
        Ok(())
    }
}

/// 目录缓存：每个键一个文件
pub struct DirCache {
    dir: PathBuf,
}

impl DirCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(file_name)
    }
}

#[async_trait]
impl LocalCache for DirCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::file_read_failed(path.display().to_string(), e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let path = self.path_for(key);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::file_write_failed(self.dir.display().to_string(), e))?;
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::file_write_failed(path.display().to_string(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dir_cache_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::new(dir.path().join("cache"));

        assert_eq!(cache.get("user_u1").await.unwrap(), None);
        cache.set("user_u1", "{\"name\":\"Ana\"}").await.unwrap();
        assert_eq!(
            cache.get("user_u1").await.unwrap().as_deref(),
            Some("{\"name\":\"Ana\"}")
        );
        cache.remove("user_u1").await.unwrap();
        cache.remove("user_u1").await.unwrap();
        assert_eq!(cache.get("user_u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dir_cache_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::new(dir.path());
        cache.set("theme_../../etc", "dark").await.unwrap();
        assert_eq!(cache.get("theme_../../etc").await.unwrap().as_deref(), Some("dark"));
        assert!(dir.path().join("theme_______etc").exists());
    }

    #[test]
    fn test_user_keys_cover_profile_and_settings() {
        let keys = user_keys("u1");
        assert!(keys.contains(&"user_u1".to_string()));
        assert!(keys.contains(&"theme_u1".to_string()));
        assert_eq!(keys.len(), 8);
    }
}
