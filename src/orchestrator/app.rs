//! 命令行驱动 - 编排层
//!
//! 管理应用生命周期：初始化日志和本地后端、登录、同步科目定义、
//! 运行一次批量评估，并导出评估记录和账号数据。

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{DirCache, LocalAuthProvider, MemoryGateway, PersistenceGateway};
use crate::models::{
    load_all_documents, load_document, load_subject_drafts, SubjectDraft, SubjectPatch,
};
use crate::orchestrator::batch_evaluator::{BatchEvaluator, BatchReport};
use crate::services::export::{tasks_to_csv, CSV_FILE_NAME};
use crate::services::{Evaluator, LlmEvaluator, SessionManager, SubjectRegistry, TaskLedger};
use crate::utils::logging::{append_log, init_log_file, log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    gateway: Arc<dyn PersistenceGateway>,
    session: SessionManager,
    evaluator: Arc<dyn Evaluator>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(config.max_concurrent_evaluations);

        let gateway: Arc<dyn PersistenceGateway> =
            Arc::new(MemoryGateway::open(config.gateway_snapshot_path()).await?);
        let cache = Arc::new(DirCache::new(config.cache_dir()));
        let auth = Arc::new(LocalAuthProvider::with_account(
            config.account_id.clone(),
            config.account_name.clone(),
            config.account_email.clone(),
            &config.account_password,
        )?);

        let session = SessionManager::new(auth, gateway.clone(), cache);
        let evaluator: Arc<dyn Evaluator> = Arc::new(LlmEvaluator::new(&config));

        Ok(Self {
            config,
            gateway,
            session,
            evaluator,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        // 认证提供方已有登录用户时直接恢复会话
        let mut state = self.session.restore().await;
        if state.session().is_none() {
            state = self
                .session
                .sign_in(&self.config.account_email, &self.config.account_password)
                .await?;
        }
        let Some(session) = state.session() else {
            warn!("⚠️ 登录未完成，程序结束");
            return Ok(());
        };
        let uid = session.uid().to_string();
        let evaluated_by = session
            .profile
            .as_ref()
            .map(|p| p.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.account_name.clone());

        if let Err(e) = self.session.load_settings().await {
            warn!("⚠️ 设置加载失败: {}", e);
        }

        let registry = Arc::new(SubjectRegistry::new(
            self.gateway.clone(),
            uid.clone(),
            self.config.max_base_file_bytes,
        ));
        let ledger = Arc::new(TaskLedger::new(self.gateway.clone(), uid));

        // 同步科目定义
        let drafts = load_subject_drafts(Path::new(&self.config.subject_file)).await?;
        let Some(first) = drafts.first().cloned() else {
            warn!("⚠️ 科目定义文件中没有科目，程序结束");
            return Ok(());
        };
        for draft in drafts {
            if let Err(e) = sync_subject(&registry, draft).await {
                error!("❌ 科目同步失败: {}", e);
            }
        }
        let Some(subject) = registry
            .subjects()
            .into_iter()
            .find(|s| s.name == first.name.trim())
        else {
            warn!("⚠️ 找不到科目 {}，程序结束", first.name);
            return Ok(());
        };

        // 基准文件：同名时只重新加载到内存，否则上传新的
        let base = load_document(Path::new(&self.config.base_file)).await?;
        let base_result = if subject.base_file_name.as_deref() == Some(base.name.as_str()) {
            registry.reload_base_file(&subject.id, base)
        } else {
            registry.upload_base_file(&subject.id, base).await
        };
        if let Err(e) = base_result {
            warn!("⚠️ {}", e.user_message());
        }

        info!("\n📁 正在扫描待评估的文件...");
        let documents = load_all_documents(&self.config.submissions_folder).await?;

        let mut batch = BatchEvaluator::new(
            registry.clone(),
            ledger.clone(),
            self.evaluator.clone(),
            &self.config,
        );
        batch.select_subject(subject.id.clone());
        let queued = batch.queue_files(documents);
        info!("✓ 找到 {} 个待评估的 PDF 文件", queued);

        let report = match batch.run(&evaluated_by).await {
            Ok(report) => report,
            Err(e) if e.is_validation() => {
                warn!("⚠️ {}", e.user_message());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.write_report(&report)?;

        self.export(&ledger).await?;

        print_final_stats(
            report.succeeded(),
            report.failed(),
            report.total,
            &self.config.output_log_file,
        );
        Ok(())
    }

    fn write_report(&self, report: &BatchReport) -> Result<()> {
        let log_file = &self.config.output_log_file;
        for task in &report.tasks {
            append_log(
                log_file,
                &format!(
                    "✓ {} ({}) {}/{}{}",
                    task.student_name,
                    task.file_name,
                    task.score,
                    task.max_score,
                    if task.simulated { " [simulada]" } else { "" }
                ),
            )?;
        }
        for failure in &report.failures {
            warn!("{}", failure.message);
            append_log(log_file, &format!("✗ {}", failure.message))?;
        }
        append_log(log_file, &report.summary())?;
        Ok(())
    }

    /// 导出 CSV 和账号数据到数据目录
    async fn export(&self, ledger: &TaskLedger) -> Result<()> {
        let data_dir = Path::new(&self.config.data_dir);
        tokio::fs::create_dir_all(data_dir).await?;

        let csv_path = data_dir.join(CSV_FILE_NAME);
        tokio::fs::write(&csv_path, tasks_to_csv(&ledger.tasks())).await?;
        info!("✓ 评估记录已导出: {}", csv_path.display());

        let now = chrono::Utc::now();
        let export = self.session.export_account_data(now).await?;
        let json_path = data_dir.join(export.file_name(now));
        tokio::fs::write(&json_path, export.to_json_pretty()?).await?;
        info!("✓ 账号数据已导出: {}", json_path.display());
        Ok(())
    }
}

/// 按名称同步科目：已存在则更新可编辑字段，否则新建
async fn sync_subject(registry: &SubjectRegistry, draft: SubjectDraft) -> AppResult<()> {
    let name = draft.name.trim().to_string();
    match registry.subjects().into_iter().find(|s| s.name == name) {
        Some(existing) => {
            registry
                .update(
                    &existing.id,
                    SubjectPatch {
                        name: None,
                        criteria: Some(draft.criteria),
                        score_type: Some(draft.score_type),
                    },
                )
                .await
        }
        None => registry.create(draft).await.map(|_| ()),
    }
}
