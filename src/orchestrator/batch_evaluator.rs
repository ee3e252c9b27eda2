//! 批量评估器 - 编排层
//!
//! ## 职责
//!
//! 把一批学生文件对照同一个科目送去评估，逐个隔离失败，只持久化成功的结果。
//!
//! ## 流程
//!
//! 1. **前置校验**：已选科目、队列非空、科目有基准文件元数据、基准文件在内存中。
//!    任何一项不满足都直接返回，不发起远程调用，队列保持不变
//! 2. **并发评估**：每个文件一个 `tokio::spawn` 任务；默认不限并发，
//!    配置了上限时用 Semaphore 控制
//! 3. **结果收集**：等待全部任务结束，失败的文件单独报告，不影响其他文件
//! 4. **并发持久化**：每条成功的评估记录一次写入
//! 5. **汇总**：报告 N 个文件中成功了 K 个；队列清空

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, ValidationError};
use crate::models::{Document, Task};
use crate::services::{Evaluator, SubjectRegistry, TaskLedger};
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::{EvaluationCtx, EvaluationFlow};

/// 单个文件的失败信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file_name: String,
    /// 面向用户的提示
    pub message: String,
}

impl FileFailure {
    fn new(file_name: &str, reason: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            message: format!(
                "No se pudo evaluar el archivo: {}. Error: {}.",
                file_name,
                reason.trim_end_matches('.')
            ),
        }
    }
}

/// 一次批量评估的结果
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub total: usize,
    /// 已写入的评估记录（带 id）
    pub tasks: Vec<Task>,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.tasks.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "Se evaluaron exitosamente {} archivos de {}.",
            self.succeeded(),
            self.total
        )
    }
}

/// 批量评估器
pub struct BatchEvaluator {
    registry: Arc<SubjectRegistry>,
    ledger: Arc<TaskLedger>,
    flow: EvaluationFlow,
    max_concurrent: usize,
    selected_subject: Option<String>,
    queue: Vec<Document>,
}

impl BatchEvaluator {
    pub fn new(
        registry: Arc<SubjectRegistry>,
        ledger: Arc<TaskLedger>,
        evaluator: Arc<dyn Evaluator>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            ledger,
            flow: EvaluationFlow::new(evaluator, config.verbose_logging),
            max_concurrent: config.max_concurrent_evaluations,
            selected_subject: None,
            queue: Vec::new(),
        }
    }

    pub fn select_subject(&mut self, subject_id: impl Into<String>) {
        self.selected_subject = Some(subject_id.into());
    }

    pub fn selected_subject(&self) -> Option<&str> {
        self.selected_subject.as_deref()
    }

    /// 加入待评估队列；只接受 PDF，返回实际加入的数量
    pub fn queue_files(&mut self, documents: impl IntoIterator<Item = Document>) -> usize {
        let before = self.queue.len();
        for document in documents {
            if document.is_pdf() {
                self.queue.push(document);
            } else {
                warn!("⚠️ 跳过非 PDF 文件: {}", document.name);
            }
        }
        self.queue.len() - before
    }

    pub fn pending(&self) -> &[Document] {
        &self.queue
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// 运行一次批量评估
    ///
    /// 前置校验失败返回 `Validation` 错误；之后单个文件的失败只记录在报告里。
    pub async fn run(&mut self, evaluated_by: &str) -> AppResult<BatchReport> {
        let subject_id = self
            .selected_subject
            .clone()
            .ok_or(ValidationError::NoSubjectSelected)?;
        if self.queue.is_empty() {
            return Err(ValidationError::NoFilesQueued.into());
        }
        let (subject, base) = self.registry.evaluation_target(&subject_id)?;

        let files = std::mem::take(&mut self.queue);
        let total = files.len();
        log_batch_start(&subject.name, total, self.max_concurrent);

        let semaphore =
            (self.max_concurrent > 0).then(|| Arc::new(Semaphore::new(self.max_concurrent)));
        let subject = Arc::new(subject);
        let base = Arc::new(base);
        let evaluated_by: Arc<str> = Arc::from(evaluated_by);

        let mut handles = Vec::with_capacity(total);
        for (idx, document) in files.into_iter().enumerate() {
            let ctx =
                EvaluationCtx::new(idx + 1, total, document.name.clone(), subject.name.clone());
            let file_name = document.name.clone();
            let flow = self.flow.clone();
            let subject = subject.clone();
            let base = base.clone();
            let evaluated_by = evaluated_by.clone();
            let semaphore = semaphore.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                match flow.run(&subject, &base, document, &evaluated_by, &ctx).await {
                    Ok(task) => Ok(task),
                    Err(e) => {
                        error!("{} ❌ 评估失败: {}", ctx, e);
                        Err(e)
                    }
                }
            });
            handles.push((file_name, handle));
        }

        // 等待全部任务结束
        let mut drafts = Vec::new();
        let mut failures = Vec::new();
        for (file_name, handle) in handles {
            match handle.await {
                Ok(Ok(task)) => drafts.push(task),
                Ok(Err(e)) => failures.push(FileFailure::new(&file_name, &e.user_message())),
                Err(e) => {
                    error!("[文件 {}] 任务执行失败: {}", file_name, e);
                    failures.push(FileFailure::new(&file_name, &e.to_string()));
                }
            }
        }

        let tasks = self.persist(drafts, &mut failures).await;

        let report = BatchReport {
            total,
            tasks,
            failures,
        };
        log_batch_complete(report.succeeded(), report.total);
        info!("{}", report.summary());
        Ok(report)
    }

    /// 并发写入成功的评估记录；写入失败的文件计入失败
    async fn persist(&self, drafts: Vec<Task>, failures: &mut Vec<FileFailure>) -> Vec<Task> {
        let results = join_all(drafts.iter().map(|task| self.ledger.record(task))).await;

        let mut tasks = Vec::with_capacity(drafts.len());
        for (mut task, result) in drafts.into_iter().zip(results) {
            match result {
                Ok(id) => {
                    task.id = id;
                    tasks.push(task);
                }
                Err(e) => {
                    error!("[文件 {}] ❌ 评估记录写入失败: {}", task.file_name, e);
                    failures.push(FileFailure::new(&task.file_name, &e.user_message()));
                }
            }
        }
        tasks
    }
}
