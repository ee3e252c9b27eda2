//! 评估服务 - 业务能力层
//!
//! 只负责"把一份学生文件和基准文件交给 LLM 评分"这一能力，不关心批量流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（Gemini 的 OpenAI 兼容端点等）
//! - 文档以 base64 data URI 的形式随消息发送

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::Engine;
use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, EvaluationError};
use crate::models::{Document, ScoreType};

/// 响应中没有分数时服务层使用的中性分数
pub const NEUTRAL_SCORE: f64 = 5.0;

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Calificación:[\s*]*(\d+(?:\.\d+)?)").expect("score regex")
});

static INTEGER_SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Calificación:[\s*]*(\d+)").expect("integer score regex"));

static FEEDBACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)Retroalimentación:[\s*]*(.*)").expect("feedback regex")
});

/// 单次评估请求
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub base: Document,
    pub candidate: Document,
    pub criteria: Vec<String>,
    pub score_type: ScoreType,
    pub subject_name: String,
}

/// 评估结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOrigin {
    /// 来自远程服务
    Remote,
    /// 远程服务不可用时生成的模拟结果
    Simulated,
}

/// 评估结果
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// 响应中解析出的分数；没有匹配时为 `None`
    pub score: Option<f64>,
    pub feedback: String,
    pub full_response: String,
    pub origin: EvaluationOrigin,
}

impl Evaluation {
    /// 缺失时使用中性分数
    pub fn score_or_neutral(&self) -> f64 {
        self.score.unwrap_or(NEUTRAL_SCORE)
    }

    pub fn is_simulated(&self) -> bool {
        self.origin == EvaluationOrigin::Simulated
    }
}

/// 远程评估服务边界
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest) -> AppResult<Evaluation>;
}

/// 基于 LLM 的评估服务
///
/// 职责：
/// - 构建评估提示词
/// - 调用 LLM API
/// - 解析分数和反馈
/// - 只处理单个文件，不关心批次
pub struct LlmEvaluator {
    client: Client<OpenAIConfig>,
    model_name: String,
    has_api_key: bool,
    temperature: f32,
    max_tokens: u32,
    simulate_on_failure: bool,
}

impl LlmEvaluator {
    /// 创建新的评估服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            has_api_key: !config.llm_api_key.trim().is_empty(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            simulate_on_failure: config.simulate_on_failure,
        }
    }

    /// 通用的 LLM 调用
    ///
    /// `parts` 按顺序组成用户消息；文档以 data URI 发送。
    async fn send_to_llm(
        &self,
        parts: Vec<ChatCompletionRequestUserMessageContentPart>,
        temperature: f32,
        max_tokens: u32,
    ) -> AppResult<String> {
        if !self.has_api_key {
            return Err(EvaluationError::MissingApiKey.into());
        }

        debug!("调用 LLM API，模型: {}，消息片段: {}", self.model_name, parts.len());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(parts))
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(temperature)
            .max_tokens(max_tokens)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            let status = match &e {
                async_openai::error::OpenAIError::ApiError(api) => api.code.clone(),
                _ => None,
            };
            AppError::Evaluation(EvaluationError::ApiCallFailed {
                model: self.model_name.clone(),
                status,
                message: e.to_string(),
            })
        })?;

        debug!("LLM API 调用成功");

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                AppError::Evaluation(EvaluationError::EmptyContent {
                    model: self.model_name.clone(),
                })
            })
    }

    async fn call_remote(&self, request: &EvaluationRequest) -> AppResult<String> {
        let prompt =
            build_evaluation_prompt(&request.subject_name, &request.criteria, request.score_type);
        let parts = vec![
            text_part(prompt),
            document_part(&request.base),
            text_part("ARCHIVO A EVALUAR:".to_string()),
            document_part(&request.candidate),
        ];
        self.send_to_llm(parts, self.temperature, self.max_tokens)
            .await
    }

    /// 仅基于文本的评估（不需要基准文件），分数按整数解析
    pub async fn evaluate_text(&self, prompt: &str, content: &str) -> AppResult<Evaluation> {
        let message = format!("{}\n\nTexto a evaluar:\n{}", prompt, content);
        match self.send_to_llm(vec![text_part(message)], 0.7, 2048).await {
            Ok(text) => Ok(parse_text_evaluation(&text)),
            Err(AppError::Evaluation(EvaluationError::MissingApiKey)) => {
                Err(EvaluationError::MissingApiKey.into())
            }
            Err(e) if self.simulate_on_failure => {
                warn!("⚠️ 文本评估失败，返回模拟结果: {}", e);
                Ok(Evaluation {
                    score: Some(rand::rng().random_range(6..=10) as f64),
                    feedback: "Evaluación simulada: El trabajo muestra buen desarrollo. Se recomienda revisar algunos aspectos para mejorar la presentación.".to_string(),
                    full_response: SIMULATED_RESPONSE.to_string(),
                    origin: EvaluationOrigin::Simulated,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> AppResult<Evaluation> {
        match self.call_remote(&request).await {
            Ok(text) => Ok(parse_evaluation(&text)),
            // 缺少 API Key 属于配置问题，不走模拟
            Err(AppError::Evaluation(EvaluationError::MissingApiKey)) => {
                Err(EvaluationError::MissingApiKey.into())
            }
            Err(e) if self.simulate_on_failure => {
                warn!(
                    "⚠️ 评估 {} 失败，返回模拟结果: {}",
                    request.candidate.name, e
                );
                Ok(simulated_evaluation(&request.base.name))
            }
            Err(e) => Err(e),
        }
    }
}

const SIMULATED_RESPONSE: &str = "Respuesta simulada debido a error en API";

/// 生成带标记的模拟结果（分数 7-9）
pub fn simulated_evaluation(base_file_name: &str) -> Evaluation {
    Evaluation {
        score: Some(rand::rng().random_range(7..=9) as f64),
        feedback: format!(
            "Evaluación simulada: El trabajo fue comparado con el archivo base \"{}\". Se encontraron similitudes en la estructura y contenido. Se recomienda revisar algunos aspectos específicos mencionados en el archivo de referencia para mejorar la calidad del trabajo.",
            base_file_name
        ),
        full_response: SIMULATED_RESPONSE.to_string(),
        origin: EvaluationOrigin::Simulated,
    }
}

/// 构建评估提示词
pub fn build_evaluation_prompt(
    subject_name: &str,
    criteria: &[String],
    score_type: ScoreType,
) -> String {
    format!(
        r#"Eres un asistente de evaluación académica experto. Te proporciono dos archivos:

1. ARCHIVO BASE: Este es el ejemplo de referencia, rúbrica o trabajo modelo que debes usar como estándar de evaluación.
2. ARCHIVO A EVALUAR: Este es el trabajo del estudiante que necesitas calificar.

CRITERIOS DE EVALUACIÓN: {criteria}
ESCALA DE CALIFICACIÓN: {scale}
ASIGNATURA: {subject}

INSTRUCCIONES:
- Compara el archivo a evaluar con el archivo base
- Evalúa según los criterios proporcionados
- Asigna una calificación en la escala {scale}
- Proporciona retroalimentación constructiva específica
- Menciona fortalezas y áreas de mejora

FORMATO DE RESPUESTA REQUERIDO:
Calificación: [número]
Retroalimentación: [análisis detallado comparando con el archivo base]"#,
        criteria = criteria.join(", "),
        scale = score_type.label(),
        subject = subject_name,
    )
}

/// 解析评估响应（分数允许小数）
pub fn parse_evaluation(text: &str) -> Evaluation {
    parse_with(&SCORE_RE, text)
}

/// 解析文本评估响应（分数只取整数部分）
pub fn parse_text_evaluation(text: &str) -> Evaluation {
    parse_with(&INTEGER_SCORE_RE, text)
}

fn parse_with(score_re: &Regex, text: &str) -> Evaluation {
    let score = score_re
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    let feedback = FEEDBACK_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.to_string());

    if score.is_none() {
        debug!("响应中没有找到分数");
    }

    Evaluation {
        score,
        feedback,
        full_response: text.to_string(),
        origin: EvaluationOrigin::Remote,
    }
}

fn text_part(text: String) -> ChatCompletionRequestUserMessageContentPart {
    ChatCompletionRequestUserMessageContentPart::Text(ChatCompletionRequestMessageContentPartText {
        text,
    })
}

/// 文档转为 data URI 片段
fn document_part(document: &Document) -> ChatCompletionRequestUserMessageContentPart {
    let encoded = base64::engine::general_purpose::STANDARD.encode(&document.bytes);
    ChatCompletionRequestUserMessageContentPart::ImageUrl(
        ChatCompletionRequestMessageContentPartImage {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", document.mime_type, encoded),
                detail: Some(ImageDetail::Auto),
            },
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str) -> Document {
        Document::new(name, b"%PDF-1.4 contenido".to_vec(), 0)
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            base: pdf("rubrica.pdf"),
            candidate: pdf("ana_lopez.pdf"),
            criteria: vec!["Claridad".to_string(), "Ortografía".to_string()],
            score_type: ScoreType::OneToTen,
            subject_name: "Lengua".to_string(),
        }
    }

    #[test]
    fn test_parse_score_and_feedback() {
        let parsed = parse_evaluation(
            "Calificación: 8.5\nRetroalimentación: Buen trabajo.\n\n- Mejorar la conclusión",
        );
        assert_eq!(parsed.score, Some(8.5));
        assert_eq!(parsed.feedback, "Buen trabajo.\n\n- Mejorar la conclusión");
        assert_eq!(parsed.origin, EvaluationOrigin::Remote);
    }

    #[test]
    fn test_parse_is_case_insensitive_and_tolerates_bold() {
        let parsed = parse_evaluation("**CALIFICACIÓN:** 7\n**Retroalimentación:** Correcto");
        assert_eq!(parsed.score, Some(7.0));
        assert_eq!(parsed.feedback, "Correcto");
    }

    #[test]
    fn test_missing_score_uses_neutral_value_at_service_level() {
        let parsed = parse_evaluation("El trabajo está incompleto.");
        assert_eq!(parsed.score, None);
        assert_eq!(parsed.score_or_neutral(), NEUTRAL_SCORE);
        assert_eq!(parsed.feedback, "El trabajo está incompleto.");
    }

    #[test]
    fn test_text_evaluation_takes_integer_part() {
        let parsed = parse_text_evaluation("Calificación: 9.75\nRetroalimentación: ok");
        assert_eq!(parsed.score, Some(9.0));
    }

    #[test]
    fn test_prompt_contains_subject_and_criteria() {
        let prompt = build_evaluation_prompt(
            "Historia",
            &["Fechas".to_string(), "Fuentes".to_string()],
            ScoreType::OneToHundred,
        );
        assert!(prompt.contains("CRITERIOS DE EVALUACIÓN: Fechas, Fuentes"));
        assert!(prompt.contains("ESCALA DE CALIFICACIÓN: 1-100"));
        assert!(prompt.contains("ASIGNATURA: Historia"));
    }

    #[test]
    fn test_simulated_evaluation_is_marked() {
        let evaluation = simulated_evaluation("rubrica.pdf");
        assert!(evaluation.is_simulated());
        let score = evaluation.score.unwrap();
        assert!((7.0..=9.0).contains(&score));
        assert!(evaluation.feedback.contains("\"rubrica.pdf\""));
    }

    #[test]
    fn test_document_part_is_data_uri() {
        match document_part(&pdf("a.pdf")) {
            ChatCompletionRequestUserMessageContentPart::ImageUrl(part) => {
                assert!(part.image_url.url.starts_with("data:application/pdf;base64,"));
            }
            _ => panic!("应为 data URI 片段"),
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_is_never_simulated() {
        let config = Config {
            llm_api_key: String::new(),
            simulate_on_failure: true,
            ..Config::default()
        };
        let evaluator = LlmEvaluator::new(&config);
        let result = evaluator.evaluate(request()).await;
        assert!(matches!(
            result,
            Err(AppError::Evaluation(EvaluationError::MissingApiKey))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_falls_back_only_when_enabled() {
        let unreachable = Config {
            llm_api_key: "test-key".to_string(),
            llm_api_base_url: "http://127.0.0.1:9/v1".to_string(),
            ..Config::default()
        };

        let strict = LlmEvaluator::new(&unreachable);
        assert!(strict.evaluate(request()).await.is_err());

        let lenient = LlmEvaluator::new(&Config {
            simulate_on_failure: true,
            ..unreachable
        });
        let evaluation = lenient.evaluate(request()).await.unwrap();
        assert!(evaluation.is_simulated());
    }

    /// 测试真实 API 调用
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_live_evaluation -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_live_evaluation() {
        let _ = tracing_subscriber::fmt::try_init();

        let evaluator = LlmEvaluator::new(&Config::from_env());
        let evaluation = evaluator
            .evaluate_text(
                "Evalúa la siguiente respuesta. Formato: Calificación: [número] Retroalimentación: [texto]",
                "La Revolución Francesa comenzó en 1789.",
            )
            .await
            .unwrap();

        println!("分数: {:?}\n反馈: {}", evaluation.score, evaluation.feedback);
        assert!(!evaluation.feedback.is_empty());
    }
}
