//! 单文件评估流程 - 流程层
//!
//! 核心职责：把"一份学生文件"变成一条待写入的评估记录
//!
//! 流程顺序：
//! 1. 组装评估请求（基准文件 + 学生文件 + 科目配置）
//! 2. 调用评估服务
//! 3. 解析结果，生成评估记录草稿（不在这里持久化）

use std::sync::Arc;
use tracing::info;

use crate::error::AppResult;
use crate::models::task::{display_date, student_name_from_file};
use crate::models::{Document, Subject, Task};
use crate::services::{EvaluationRequest, Evaluator};
use crate::utils::logging::truncate_text;
use crate::workflow::evaluation_ctx::EvaluationCtx;

/// 批量路径上分数缺失或无法解析时的取值
pub const UNPARSEABLE_SCORE: f64 = 0.0;

/// 单文件评估流程
///
/// - 不持有任何批次状态
/// - 只依赖评估能力（services）
#[derive(Clone)]
pub struct EvaluationFlow {
    evaluator: Arc<dyn Evaluator>,
    verbose_logging: bool,
}

impl EvaluationFlow {
    pub fn new(evaluator: Arc<dyn Evaluator>, verbose_logging: bool) -> Self {
        Self {
            evaluator,
            verbose_logging,
        }
    }

    /// 评估一个文件，成功时返回评估记录草稿
    pub async fn run(
        &self,
        subject: &Subject,
        base: &Document,
        candidate: Document,
        evaluated_by: &str,
        ctx: &EvaluationCtx,
    ) -> AppResult<Task> {
        info!("{} 🔍 开始评估...", ctx);

        let file_name = candidate.name.clone();
        let request = EvaluationRequest {
            base: base.clone(),
            candidate,
            criteria: subject.criteria.clone(),
            score_type: subject.score_type,
            subject_name: subject.name.clone(),
        };

        let evaluation = self.evaluator.evaluate(request).await?;

        let simulated = evaluation.is_simulated();
        let score = evaluation
            .score
            .filter(|s| s.is_finite())
            .unwrap_or(UNPARSEABLE_SCORE);

        if self.verbose_logging {
            info!("{} 反馈预览: {}", ctx, truncate_text(&evaluation.feedback, 80));
        }
        info!(
            "{} ✓ 评估完成: {}/{}{}",
            ctx,
            score,
            subject.score_type.max_score(),
            if simulated { " (模拟)" } else { "" }
        );

        Ok(Task {
            id: String::new(),
            student_name: student_name_from_file(&file_name),
            file_name,
            subject: subject.name.clone(),
            subject_id: subject.id.clone(),
            score,
            max_score: subject.score_type.max_score(),
            feedback: evaluation.feedback,
            upload_date: display_date(chrono::Local::now()),
            evaluated_by: evaluated_by.to_string(),
            base_file_used: subject
                .base_file_name
                .clone()
                .or_else(|| Some(base.name.clone())),
            simulated,
        })
    }
}
