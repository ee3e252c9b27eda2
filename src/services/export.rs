//! 数据导出 - 业务能力层
//!
//! - 评估记录导出为 CSV（不做引号转义，字段中的逗号会破坏列）
//! - 账号数据导出为 JSON；评估记录和科目尽力获取，失败时附加说明而不中止

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

use crate::error::AppResult;
use crate::infrastructure::{Collection, PersistenceGateway, StoredDoc};
use crate::models::{Settings, Task, UserProfile};

pub const CSV_FILE_NAME: &str = "calificaciones.csv";

const CSV_HEADER: [&str; 7] = [
    "Estudiante",
    "Asignatura",
    "Calificación",
    "Calificación Máxima",
    "Fecha",
    "Evaluado por",
    "Archivo Base",
];

const PARTIAL_EXPORT_NOTE: &str = "Algunos datos no pudieron ser exportados desde la base de datos";

/// 评估记录转为 CSV；没有记录时只有表头
pub fn tasks_to_csv(tasks: &[Task]) -> String {
    let mut lines = Vec::with_capacity(tasks.len() + 1);
    lines.push(CSV_HEADER.join(","));
    for task in tasks {
        lines.push(
            [
                task.student_name.clone(),
                task.subject.clone(),
                task.score.to_string(),
                task.max_score.to_string(),
                task.upload_date.clone(),
                task.evaluated_by.clone(),
                task.base_file_used
                    .clone()
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| "N/A".to_string()),
            ]
            .join(","),
        );
    }
    lines.join("\n")
}

/// 导出的资料字段
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedProfile {
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
}

impl From<&UserProfile> for ExportedProfile {
    fn from(profile: &UserProfile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            role: profile.role.clone(),
            created_at: profile.created_at.clone(),
            photo_url: profile.photo_url.clone(),
        }
    }
}

/// 账号数据导出
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountExport {
    pub profile: ExportedProfile,
    pub settings: Settings,
    /// ISO 8601
    pub export_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AccountExport {
    pub fn to_json_pretty(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 下载文件名：`mis-datos-YYYY-MM-DD.json`
    pub fn file_name(&self, now: DateTime<Utc>) -> String {
        format!("mis-datos-{}.json", now.format("%Y-%m-%d"))
    }
}

/// 文档展开为带 id 的对象
fn flatten_doc(doc: StoredDoc) -> JsonValue {
    let mut object = Map::new();
    object.insert("id".to_string(), JsonValue::String(doc.id));
    if let JsonValue::Object(data) = doc.data {
        object.extend(data);
    }
    JsonValue::Object(object)
}

/// 汇总账号数据
pub async fn export_account(
    gateway: &dyn PersistenceGateway,
    profile: &UserProfile,
    settings: &Settings,
    now: DateTime<Utc>,
) -> AccountExport {
    let mut export = AccountExport {
        profile: ExportedProfile::from(profile),
        settings: settings.clone(),
        export_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        tasks: None,
        subjects: None,
        note: None,
    };

    if profile.id.is_empty() {
        return export;
    }

    let mut partial = false;

    match gateway.list(&profile.id, Collection::Tasks).await {
        Ok(docs) => export.tasks = Some(docs.into_iter().map(flatten_doc).collect()),
        Err(e) => {
            warn!("导出评估记录失败: {}", e);
            partial = true;
        }
    }

    match gateway.list(&profile.id, Collection::Subjects).await {
        Ok(docs) => {
            export.subjects = Some(
                docs.into_iter()
                    .map(|doc| {
                        let mut value = flatten_doc(doc);
                        // 不导出二进制内容
                        if let JsonValue::Object(object) = &mut value {
                            object.insert("baseFile".to_string(), JsonValue::Null);
                        }
                        value
                    })
                    .collect(),
            )
        }
        Err(e) => {
            warn!("导出科目失败: {}", e);
            partial = true;
        }
    }

    if partial {
        export.note = Some(PARTIAL_EXPORT_NOTE.to_string());
    }
    export
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::infrastructure::MemoryGateway;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use tokio::sync::watch;

    fn task(base: Option<&str>) -> Task {
        Task {
            id: "t1".to_string(),
            file_name: "ana_lopez.pdf".to_string(),
            student_name: "ana lopez".to_string(),
            subject: "Historia".to_string(),
            subject_id: "s1".to_string(),
            score: 8.5,
            max_score: 10,
            feedback: "Bien".to_string(),
            upload_date: "01/02/2026".to_string(),
            evaluated_by: "Docente".to_string(),
            base_file_used: base.map(str::to_string),
            simulated: false,
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            name: "Ana".to_string(),
            email: "ana@escuela.es".to_string(),
            photo_url: String::new(),
            role: "teacher".to_string(),
            created_at: None,
            settings: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_empty_csv_is_header_only() {
        assert_eq!(
            tasks_to_csv(&[]),
            "Estudiante,Asignatura,Calificación,Calificación Máxima,Fecha,Evaluado por,Archivo Base"
        );
    }

    #[test]
    fn test_csv_rows_in_fixed_order() {
        let csv = tasks_to_csv(&[task(Some("rubrica.pdf")), task(None)]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "ana lopez,Historia,8.5,10,01/02/2026,Docente,rubrica.pdf");
        assert_eq!(lines[2], "ana lopez,Historia,8.5,10,01/02/2026,Docente,N/A");
    }

    #[tokio::test]
    async fn test_account_export_includes_collections() {
        let gateway = MemoryGateway::new();
        gateway
            .add("u1", Collection::Subjects, json!({ "name": "Historia", "baseFileName": "r.pdf" }))
            .await
            .unwrap();
        gateway
            .add("u1", Collection::Tasks, json!({ "score": 7 }))
            .await
            .unwrap();

        let export = export_account(&gateway, &profile(), &Settings::default(), now()).await;
        assert_eq!(export.export_date, "2026-03-14T09:30:00.000Z");
        assert_eq!(export.file_name(now()), "mis-datos-2026-03-14.json");
        assert!(export.note.is_none());

        let subjects = export.subjects.as_ref().unwrap();
        assert_eq!(subjects[0]["baseFile"], JsonValue::Null);
        assert_eq!(subjects[0]["baseFileName"], "r.pdf");
        assert!(subjects[0]["id"].is_string());
        assert_eq!(export.tasks.as_ref().unwrap()[0]["score"], 7);

        let text = export.to_json_pretty().unwrap();
        assert!(text.contains("\"exportDate\""));
        assert!(text.contains("\"photoURL\""));
    }

    struct BrokenGateway;

    #[async_trait]
    impl PersistenceGateway for BrokenGateway {
        async fn add(&self, _: &str, _: Collection, _: JsonValue) -> AppResult<String> {
            Err(AppError::persistence("add", "offline"))
        }
        async fn merge(&self, _: &str, _: Collection, _: &str, _: JsonValue) -> AppResult<()> {
            Err(AppError::persistence("merge", "offline"))
        }
        async fn delete(&self, _: &str, _: Collection, _: &str) -> AppResult<()> {
            Err(AppError::persistence("delete", "offline"))
        }
        async fn list(&self, _: &str, _: Collection) -> AppResult<Vec<StoredDoc>> {
            Err(AppError::persistence("list", "offline"))
        }
        fn subscribe(&self, _: &str, _: Collection) -> watch::Receiver<Vec<StoredDoc>> {
            watch::channel(Vec::new()).1
        }
        async fn get_profile(&self, _: &str) -> AppResult<Option<JsonValue>> {
            Err(AppError::persistence("get_profile", "offline"))
        }
        async fn merge_profile(&self, _: &str, _: JsonValue) -> AppResult<()> {
            Err(AppError::persistence("merge_profile", "offline"))
        }
        async fn delete_profile(&self, _: &str) -> AppResult<()> {
            Err(AppError::persistence("delete_profile", "offline"))
        }
    }

    #[tokio::test]
    async fn test_account_export_degrades_with_note() {
        let export = export_account(&BrokenGateway, &profile(), &Settings::default(), now()).await;
        assert!(export.tasks.is_none());
        assert!(export.subjects.is_none());
        assert_eq!(export.note.as_deref(), Some(PARTIAL_EXPORT_NOTE));
        assert_eq!(export.profile.name, "Ana");
    }
}
