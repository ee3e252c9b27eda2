//! 持久化网关 - 基础设施层
//!
//! 文档型存储的抽象：每个用户下有 `subjects` / `tasks` 两个集合和一份资料文档。
//! 只暴露增、合并更新、删除、列表和实时订阅能力，不认识 Subject / Task。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, FileError, PersistenceError};

/// 用户下的集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Subjects,
    Tasks,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Subjects => "subjects",
            Collection::Tasks => "tasks",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 网关中的一份文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDoc {
    pub id: String,
    pub data: JsonValue,
}

/// 持久化网关
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// 新建文档，返回网关分配的 id
    async fn add(&self, uid: &str, collection: Collection, data: JsonValue) -> AppResult<String>;

    /// 合并更新（顶层键覆盖，文档不存在时创建）
    async fn merge(
        &self,
        uid: &str,
        collection: Collection,
        id: &str,
        patch: JsonValue,
    ) -> AppResult<()>;

    async fn delete(&self, uid: &str, collection: Collection, id: &str) -> AppResult<()>;

    async fn list(&self, uid: &str, collection: Collection) -> AppResult<Vec<StoredDoc>>;

    /// 订阅集合的实时快照；每次变更推送整个集合
    fn subscribe(&self, uid: &str, collection: Collection) -> watch::Receiver<Vec<StoredDoc>>;

    async fn get_profile(&self, uid: &str) -> AppResult<Option<JsonValue>>;

    /// 合并更新资料文档（不存在时创建）
    async fn merge_profile(&self, uid: &str, patch: JsonValue) -> AppResult<()>;

    async fn delete_profile(&self, uid: &str) -> AppResult<()>;
}

struct CollectionState {
    docs: Vec<StoredDoc>,
    sender: watch::Sender<Vec<StoredDoc>>,
}

impl CollectionState {
    fn new(docs: Vec<StoredDoc>) -> Self {
        let (sender, _) = watch::channel(docs.clone());
        Self { docs, sender }
    }

    fn publish(&self) {
        self.sender.send_replace(self.docs.clone());
    }
}

#[derive(Default)]
struct GatewayState {
    collections: HashMap<(String, Collection), CollectionState>,
    profiles: BTreeMap<String, JsonValue>,
}

impl GatewayState {
    fn collection(&mut self, uid: &str, collection: Collection) -> &mut CollectionState {
        self.collections
            .entry((uid.to_string(), collection))
            .or_insert_with(|| CollectionState::new(Vec::new()))
    }

    fn snapshot(&self) -> Snapshot {
        let mut users: BTreeMap<String, UserSnapshot> = BTreeMap::new();
        for (uid, profile) in &self.profiles {
            users.entry(uid.clone()).or_default().profile = Some(profile.clone());
        }
        for ((uid, collection), state) in &self.collections {
            if state.docs.is_empty() {
                continue;
            }
            let user = users.entry(uid.clone()).or_default();
            match collection {
                Collection::Subjects => user.subjects = state.docs.clone(),
                Collection::Tasks => user.tasks = state.docs.clone(),
            }
        }
        Snapshot { users }
    }
}

/// 快照文件结构
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    users: BTreeMap<String, UserSnapshot>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    profile: Option<JsonValue>,
    #[serde(default)]
    subjects: Vec<StoredDoc>,
    #[serde(default)]
    tasks: Vec<StoredDoc>,
}

/// 内存网关，可选地把全部数据写入 JSON 快照文件
///
/// 集合内保持插入顺序；id 使用 UUID v7。
pub struct MemoryGateway {
    state: Mutex<GatewayState>,
    snapshot_path: Option<PathBuf>,
    write_lock: tokio::sync::Mutex<()>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState::default()),
            snapshot_path: None,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 从快照文件恢复（文件不存在时为空），之后每次变更都会回写
    pub async fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let path_str = path.display().to_string();
        let mut state = GatewayState::default();

        if path.exists() {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| AppError::file_read_failed(&path_str, e))?;
            let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
                AppError::File(FileError::JsonParseFailed {
                    path: path_str.clone(),
                    source: e,
                })
            })?;
            for (uid, user) in snapshot.users {
                if let Some(profile) = user.profile {
                    state.profiles.insert(uid.clone(), profile);
                }
                state.collections.insert(
                    (uid.clone(), Collection::Subjects),
                    CollectionState::new(user.subjects),
                );
                state
                    .collections
                    .insert((uid, Collection::Tasks), CollectionState::new(user.tasks));
            }
            debug!("已从快照恢复网关数据: {}", path_str);
        }

        Ok(Self {
            state: Mutex::new(state),
            snapshot_path: Some(path),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 回写快照；在写锁内取最新状态，保证最后一次写入的是最新数据
    async fn flush(&self, operation: &str) -> AppResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        let content = serde_json::to_string_pretty(&self.state().snapshot())
            .map_err(|e| AppError::persistence(operation, e))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::persistence(operation, e))?;
        }
        tokio::fs::write(path, content).await.map_err(|e| {
            warn!("网关快照写入失败 ({}): {}", path.display(), e);
            AppError::persistence(operation, e)
        })
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// 顶层键合并：patch 中的键覆盖原值（包括 null）
fn merge_objects(target: &mut JsonValue, patch: JsonValue) {
    match (target, patch) {
        (JsonValue::Object(target), JsonValue::Object(patch)) => {
            for (key, value) in patch {
                target.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn add(&self, uid: &str, collection: Collection, data: JsonValue) -> AppResult<String> {
        let id = uuid::Uuid::now_v7().to_string();
        {
            let mut state = self.state();
            let col = state.collection(uid, collection);
            col.docs.push(StoredDoc {
                id: id.clone(),
                data,
            });
            col.publish();
        }
        debug!("新建文档 {}/{}", collection, id);
        self.flush("add").await?;
        Ok(id)
    }

    async fn merge(
        &self,
        uid: &str,
        collection: Collection,
        id: &str,
        patch: JsonValue,
    ) -> AppResult<()> {
        {
            let mut state = self.state();
            let col = state.collection(uid, collection);
            match col.docs.iter_mut().find(|d| d.id == id) {
                Some(doc) => merge_objects(&mut doc.data, patch),
                None => col.docs.push(StoredDoc {
                    id: id.to_string(),
                    data: patch,
                }),
            }
            col.publish();
        }
        self.flush("merge").await
    }

    async fn delete(&self, uid: &str, collection: Collection, id: &str) -> AppResult<()> {
        {
            let mut state = self.state();
            let col = state.collection(uid, collection);
            let before = col.docs.len();
            col.docs.retain(|d| d.id != id);
            if col.docs.len() == before {
                return Err(AppError::Persistence(PersistenceError::DocumentNotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                }));
            }
            col.publish();
        }
        self.flush("delete").await
    }

    async fn list(&self, uid: &str, collection: Collection) -> AppResult<Vec<StoredDoc>> {
        Ok(self.state().collection(uid, collection).docs.clone())
    }

    fn subscribe(&self, uid: &str, collection: Collection) -> watch::Receiver<Vec<StoredDoc>> {
        self.state().collection(uid, collection).sender.subscribe()
    }

    async fn get_profile(&self, uid: &str) -> AppResult<Option<JsonValue>> {
        Ok(self.state().profiles.get(uid).cloned())
    }

    async fn merge_profile(&self, uid: &str, patch: JsonValue) -> AppResult<()> {
        {
            let mut state = self.state();
            let profile = state
                .profiles
                .entry(uid.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            merge_objects(profile, patch);
        }
        self.flush("merge_profile").await
    }

    async fn delete_profile(&self, uid: &str) -> AppResult<()> {
        self.state().profiles.remove(uid);
        self.flush("delete_profile").await
    }
}
