use crate::error::{AppError, AppResult, FileError};
use crate::models::document::Document;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;

/// 从磁盘读取单个文档
pub async fn load_document(file_path: &Path) -> AppResult<Document> {
    let path_str = file_path.display().to_string();

    if !file_path.exists() {
        return Err(AppError::File(FileError::NotFound { path: path_str }));
    }

    let bytes = fs::read(file_path)
        .await
        .map_err(|e| AppError::file_read_failed(&path_str, e))?;

    let last_modified = fs::metadata(file_path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();

    let name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or(path_str);

    Ok(Document::new(name, bytes, last_modified))
}

/// 从文件夹中加载所有文件（按文件名排序）
///
/// 不在这里过滤类型，交给入队时统一处理。
pub async fn load_all_documents(folder_path: &str) -> AppResult<Vec<Document>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        return Err(AppError::File(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }));
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?
    {
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        match load_document(&path).await {
            Ok(doc) => documents.push(doc),
            Err(e) => tracing::warn!("加载文件失败 {}: {}", path.display(), e),
        }
    }

    Ok(documents)
}
