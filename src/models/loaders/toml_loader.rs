use crate::error::{AppError, AppResult, FileError};
use crate::models::subject::SubjectDraft;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 科目定义文件结构
///
/// ```toml
/// [[subjects]]
/// name = "Historia"
/// criteria = ["Fechas", "Argumentación"]
/// scoreType = "1-10"
/// ```
#[derive(Debug, Deserialize)]
struct SubjectFile {
    #[serde(default)]
    subjects: Vec<SubjectDraft>,
}

/// 从 TOML 文件加载科目定义
pub async fn load_subject_drafts(toml_file_path: &Path) -> AppResult<Vec<SubjectDraft>> {
    let path_str = toml_file_path.display().to_string();

    if !toml_file_path.exists() {
        return Err(AppError::File(FileError::NotFound { path: path_str }));
    }

    let content = fs::read_to_string(toml_file_path)
        .await
        .map_err(|e| AppError::file_read_failed(&path_str, e))?;

    parse_subject_drafts(&content).map_err(|e| match e {
        AppError::File(FileError::TomlParseFailed { source, .. }) => {
            AppError::File(FileError::TomlParseFailed {
                path: path_str.clone(),
                source,
            })
        }
        other => other,
    })
}

/// 解析 TOML 文本中的科目定义
pub fn parse_subject_drafts(content: &str) -> AppResult<Vec<SubjectDraft>> {
    let file: SubjectFile = toml::from_str(content)?;
    tracing::info!("成功加载 {} 个科目定义", file.subjects.len());
    Ok(file.subjects)
}
