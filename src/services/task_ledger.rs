//! 评估记录服务 - 业务能力层
//!
//! 评估记录只在批量评估成功后写入，这里负责读取、订阅和按需删除。

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppResult, ValidationError};
use crate::infrastructure::{Collection, LiveCollection, PersistenceGateway};
use crate::models::Task;
use crate::services::subject_registry::Confirmation;

/// 删除评估记录前的确认文案
pub const DELETE_TASK_PROMPT: &str = "¿Estás seguro de eliminar esta evaluación?";

pub struct TaskLedger {
    gateway: Arc<dyn PersistenceGateway>,
    uid: String,
    tasks: LiveCollection<Task>,
}

impl TaskLedger {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, uid: impl Into<String>) -> Self {
        let uid = uid.into();
        let tasks = LiveCollection::new(
            Collection::Tasks,
            gateway.subscribe(&uid, Collection::Tasks),
        );
        Self { gateway, uid, tasks }
    }

    /// 当前评估记录快照
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.current()
    }

    pub fn live(&self) -> LiveCollection<Task> {
        self.tasks.clone()
    }

    /// 某个科目下的评估记录（科目删除后记录仍保留）
    pub fn tasks_for_subject(&self, subject_id: &str) -> Vec<Task> {
        self.tasks()
            .into_iter()
            .filter(|t| t.subject_id == subject_id)
            .collect()
    }

    /// 写入一条评估记录，返回 id
    pub async fn record(&self, task: &Task) -> AppResult<String> {
        let id = self
            .gateway
            .add(&self.uid, Collection::Tasks, serde_json::to_value(task)?)
            .await?;
        debug!("评估记录已写入: {} ({})", task.file_name, id);
        Ok(id)
    }

    /// 删除一条评估记录；用户拒绝时返回 `false`
    pub async fn delete(&self, id: &str, confirmation: Confirmation) -> AppResult<bool> {
        if !confirmation.is_confirmed() {
            return Ok(false);
        }
        if !self.tasks().iter().any(|t| t.id == id) {
            return Err(ValidationError::TaskNotFound { id: id.to_string() }.into());
        }
        self.gateway.delete(&self.uid, Collection::Tasks, id).await?;
        info!("✓ 评估记录已删除: {}", id);
        Ok(true)
    }
}
