//! 科目登记服务 - 业务能力层
//!
//! 负责科目的增删改，以及基准文件的上传、移除和重新加载。
//! 基准文件的二进制内容只保存在本进程内存中，网关里只有元数据。

use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::{AppResult, ValidationError};
use crate::infrastructure::{Collection, LiveCollection, PersistenceGateway};
use crate::models::{Document, Subject, SubjectDraft, SubjectPatch};

/// 不可逆操作的用户确认结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

impl Confirmation {
    pub fn is_confirmed(self) -> bool {
        self == Confirmation::Confirmed
    }
}

/// 移除基准文件前向用户展示的确认文案
pub const REMOVE_BASE_FILE_PROMPT: &str =
    "¿Estás seguro de eliminar el archivo base? Esto afectará futuras evaluaciones.";

/// 科目登记
pub struct SubjectRegistry {
    gateway: Arc<dyn PersistenceGateway>,
    uid: String,
    subjects: LiveCollection<Subject>,
    /// 科目 id → 基准文件（仅内存）
    base_files: Mutex<HashMap<String, Document>>,
    max_base_file_bytes: u64,
}

impl SubjectRegistry {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        uid: impl Into<String>,
        max_base_file_bytes: u64,
    ) -> Self {
        let uid = uid.into();
        let subjects = LiveCollection::new(
            Collection::Subjects,
            gateway.subscribe(&uid, Collection::Subjects),
        );
        Self {
            gateway,
            uid,
            subjects,
            base_files: Mutex::new(HashMap::new()),
            max_base_file_bytes,
        }
    }

    fn base_files(&self) -> MutexGuard<'_, HashMap<String, Document>> {
        self.base_files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 当前科目快照
    pub fn subjects(&self) -> Vec<Subject> {
        self.subjects.current()
    }

    /// 可订阅的科目集合
    pub fn live(&self) -> LiveCollection<Subject> {
        self.subjects.clone()
    }

    pub fn get(&self, id: &str) -> Option<Subject> {
        self.subjects().into_iter().find(|s| s.id == id)
    }

    fn require(&self, id: &str) -> Result<Subject, ValidationError> {
        self.get(id).ok_or_else(|| ValidationError::SubjectNotFound { id: id.to_string() })
    }

    /// 内存中的基准文件
    pub fn base_document(&self, id: &str) -> Option<Document> {
        self.base_files().get(id).cloned()
    }

    /// 新建科目，返回网关分配的 id
    pub async fn create(&self, draft: SubjectDraft) -> AppResult<String> {
        let subject = draft.into_subject()?;
        let id = self
            .gateway
            .add(&self.uid, Collection::Subjects, serde_json::to_value(&subject)?)
            .await?;
        info!("✓ 科目已创建: {} ({})", subject.name, id);
        Ok(id)
    }

    /// 合并更新可编辑字段
    pub async fn update(&self, id: &str, patch: SubjectPatch) -> AppResult<()> {
        let patch = patch.normalized()?;
        self.require(id)?;
        if patch.is_empty() {
            debug!("科目 {} 没有需要更新的字段", id);
            return Ok(());
        }
        self.gateway
            .merge(&self.uid, Collection::Subjects, id, serde_json::to_value(&patch)?)
            .await?;
        info!("✓ 科目已更新: {}", id);
        Ok(())
    }

    fn check_document(&self, document: &Document) -> Result<(), ValidationError> {
        if !document.is_pdf() {
            return Err(ValidationError::NotAPdf {
                file_name: document.name.clone(),
            });
        }
        if document.size() > self.max_base_file_bytes {
            return Err(ValidationError::FileTooLarge {
                file_name: document.name.clone(),
                size: document.size(),
                limit: self.max_base_file_bytes,
            });
        }
        Ok(())
    }

    /// 上传基准文件：只持久化元数据，二进制留在内存
    pub async fn upload_base_file(&self, id: &str, document: Document) -> AppResult<()> {
        self.check_document(&document)?;
        let subject = self.require(id)?;

        self.gateway
            .merge(
                &self.uid,
                Collection::Subjects,
                id,
                json!({
                    "baseFileName": document.name,
                    "baseFileSize": document.size(),
                    "baseFileLastModified": document.last_modified,
                }),
            )
            .await?;

        info!(
            "✓ 科目 {} 的基准文件已上传: {} ({} 字节)",
            subject.name,
            document.name,
            document.size()
        );
        self.base_files().insert(id.to_string(), document);
        Ok(())
    }

    /// 移除基准文件；用户拒绝时不做任何修改并返回 `false`
    pub async fn remove_base_file(&self, id: &str, confirmation: Confirmation) -> AppResult<bool> {
        if !confirmation.is_confirmed() {
            debug!("用户取消了移除基准文件: {}", id);
            return Ok(false);
        }
        let subject = self.require(id)?;

        self.gateway
            .merge(
                &self.uid,
                Collection::Subjects,
                id,
                json!({
                    "baseFileName": null,
                    "baseFileSize": null,
                    "baseFileLastModified": null,
                }),
            )
            .await?;
        self.base_files().remove(id);

        info!("✓ 科目 {} 的基准文件已移除", subject.name);
        Ok(true)
    }

    /// 重新加载基准文件到内存（元数据不变）
    pub fn reload_base_file(&self, id: &str, document: Document) -> AppResult<()> {
        let subject = self.require(id)?;
        if !subject.has_base_file() {
            return Err(ValidationError::NoBaseFileToReload {
                subject: subject.name,
            }
            .into());
        }
        self.check_document(&document)?;

        info!("✓ 科目 {} 的基准文件已重新加载: {}", subject.name, document.name);
        self.base_files().insert(id.to_string(), document);
        Ok(())
    }

    /// 删除科目（不级联删除评估记录）
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.gateway.delete(&self.uid, Collection::Subjects, id).await?;
        self.base_files().remove(id);
        info!("✓ 科目已删除: {}", id);
        Ok(())
    }

    /// 取得可用于评估的科目和基准文件
    ///
    /// 元数据存在但内存中没有二进制时，要求先重新加载。
    pub fn evaluation_target(&self, id: &str) -> Result<(Subject, Document), ValidationError> {
        let subject = self.require(id)?;
        let Some(file_name) = subject.base_file_name.clone() else {
            return Err(ValidationError::MissingBaseFile {
                subject: subject.name,
            });
        };
        match self.base_document(id) {
            Some(document) => Ok((subject, document)),
            None => Err(ValidationError::BaseFileNotLoaded {
                subject: subject.name,
                file_name,
            }),
        }
    }
}
