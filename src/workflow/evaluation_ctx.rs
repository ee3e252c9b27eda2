//! 评估上下文
//!
//! 封装"我正在评估这一批中的第几个文件"这一信息

use std::fmt::Display;

/// 单个文件的评估上下文
#[derive(Debug, Clone)]
pub struct EvaluationCtx {
    /// 文件在本批中的索引（从1开始）
    pub file_index: usize,

    /// 本批文件总数
    pub total_files: usize,

    pub file_name: String,

    /// 科目名称（仅用于日志显示）
    pub subject_name: String,
}

impl EvaluationCtx {
    pub fn new(
        file_index: usize,
        total_files: usize,
        file_name: String,
        subject_name: String,
    ) -> Self {
        Self {
            file_index,
            total_files,
            file_name,
            subject_name,
        }
    }
}

impl Display for EvaluationCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[文件 {}/{} {} 科目#{}]",
            self.file_index, self.total_files, self.file_name, self.subject_name
        )
    }
}
