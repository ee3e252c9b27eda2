use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// 评分刻度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScoreType {
    #[default]
    #[serde(rename = "1-10")]
    OneToTen,
    #[serde(rename = "1-5")]
    OneToFive,
    #[serde(rename = "1-100")]
    OneToHundred,
}

impl ScoreType {
    /// 满分（用于归一化）
    pub fn max_score(self) -> u32 {
        match self {
            ScoreType::OneToTen => 10,
            ScoreType::OneToFive => 5,
            ScoreType::OneToHundred => 100,
        }
    }

    /// 刻度标签，原样传给评估服务
    pub fn label(self) -> &'static str {
        match self {
            ScoreType::OneToTen => "1-10",
            ScoreType::OneToFive => "1-5",
            ScoreType::OneToHundred => "1-100",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "1-10" => Some(ScoreType::OneToTen),
            "1-5" => Some(ScoreType::OneToFive),
            "1-100" => Some(ScoreType::OneToHundred),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// 科目（评分配置）
///
/// 只包含持久化字段；基准文件的二进制内容由 `SubjectRegistry` 在内存中单独持有。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub score_type: ScoreType,
    #[serde(default)]
    pub base_file_name: Option<String>,
    #[serde(default)]
    pub base_file_size: Option<u64>,
    /// 毫秒时间戳
    #[serde(default)]
    pub base_file_last_modified: Option<i64>,
}

impl Subject {
    pub fn has_base_file(&self) -> bool {
        self.base_file_name.is_some()
    }
}

/// 新建科目的表单数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDraft {
    pub name: String,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub score_type: ScoreType,
}

impl SubjectDraft {
    pub fn new(name: impl Into<String>, criteria: Vec<String>, score_type: ScoreType) -> Self {
        Self {
            name: name.into(),
            criteria,
            score_type,
        }
    }

    /// 清洗并校验，返回可写入网关的科目（基准文件元数据为空）
    pub fn into_subject(self) -> Result<Subject, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptySubjectName);
        }
        let criteria = clean_criteria(self.criteria);
        if criteria.is_empty() {
            return Err(ValidationError::EmptyCriteria);
        }
        Ok(Subject {
            id: String::new(),
            name,
            criteria,
            score_type: self.score_type,
            base_file_name: None,
            base_file_size: None,
            base_file_last_modified: None,
        })
    }
}

/// 科目的可编辑字段（merge-patch）
///
/// 基准文件元数据不在此列，只能通过基准文件相关操作修改。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_type: Option<ScoreType>,
}

impl SubjectPatch {
    pub fn normalized(self) -> Result<Self, ValidationError> {
        let name = match self.name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(ValidationError::EmptySubjectName);
                }
                Some(name)
            }
            None => None,
        };
        let criteria = match self.criteria {
            Some(criteria) => {
                let criteria = clean_criteria(criteria);
                if criteria.is_empty() {
                    return Err(ValidationError::EmptyCriteria);
                }
                Some(criteria)
            }
            None => None,
        };
        Ok(Self {
            name,
            criteria,
            score_type: self.score_type,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.criteria.is_none() && self.score_type.is_none()
    }
}

/// 去掉空白评分标准，保持原有顺序
pub fn clean_criteria(criteria: Vec<String>) -> Vec<String> {
    criteria
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_criteria_are_removed_in_order() {
        let cleaned = clean_criteria(vec![
            "Ortografía".to_string(),
            "   ".to_string(),
            String::new(),
            "Estructura".to_string(),
            "\t".to_string(),
            "Argumentación".to_string(),
        ]);
        assert_eq!(cleaned, vec!["Ortografía", "Estructura", "Argumentación"]);
    }

    #[test]
    fn test_draft_requires_name() {
        let draft = SubjectDraft::new("  ", vec!["Claridad".to_string()], ScoreType::OneToTen);
        assert_eq!(draft.into_subject(), Err(ValidationError::EmptySubjectName));
    }

    #[test]
    fn test_draft_starts_without_base_file() {
        let subject = SubjectDraft::new(
            "Historia",
            vec!["Fechas".to_string(), "".to_string()],
            ScoreType::OneToFive,
        )
        .into_subject()
        .unwrap();
        assert_eq!(subject.criteria, vec!["Fechas"]);
        assert!(!subject.has_base_file());
        assert_eq!(subject.base_file_size, None);
    }

    #[test]
    fn test_score_type_serde_labels() {
        let json = serde_json::to_string(&ScoreType::OneToHundred).unwrap();
        assert_eq!(json, "\"1-100\"");
        let parsed: ScoreType = serde_json::from_str("\"1-5\"").unwrap();
        assert_eq!(parsed.max_score(), 5);
        assert_eq!(ScoreType::from_label("1-10").map(ScoreType::max_score), Some(10));
    }

    #[test]
    fn test_patch_never_serializes_base_metadata() {
        let patch = SubjectPatch {
            name: Some("Lengua".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(patch.normalized().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({ "name": "Lengua" }));
    }
}
