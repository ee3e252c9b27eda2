use serde::{Deserialize, Serialize};

/// 一条已完成的评估记录
///
/// 只在批量评估成功后创建，之后不会再被修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(skip)]
    pub id: String,
    pub file_name: String,
    pub student_name: String,
    /// 评估时的科目名称快照
    pub subject: String,
    pub subject_id: String,
    pub score: f64,
    pub max_score: u32,
    /// Markdown 格式的反馈
    pub feedback: String,
    pub upload_date: String,
    pub evaluated_by: String,
    #[serde(default)]
    pub base_file_used: Option<String>,
    /// 远程服务不可用时生成的模拟结果
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub simulated: bool,
}

/// 由文件名推导学生姓名：去掉扩展名，`-` 和 `_` 替换为空格
pub fn student_name_from_file(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    stem.replace(['-', '_'], " ")
}

/// 评估日期的显示格式
pub fn display_date(date: chrono::DateTime<chrono::Local>) -> String {
    date.format("%d/%m/%Y").to_string()
}
