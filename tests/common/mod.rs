#![allow(dead_code)]

use async_trait::async_trait;
use grading_evaluator::error::{AppError, AppResult, EvaluationError};
use grading_evaluator::infrastructure::{Collection, MemoryGateway, PersistenceGateway, StoredDoc};
use grading_evaluator::models::Document;
use grading_evaluator::services::{Evaluation, EvaluationOrigin, EvaluationRequest, Evaluator};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

pub fn pdf(name: &str) -> Document {
    Document::new(name, b"%PDF-1.4 contenido de prueba".to_vec(), 1_700_000_000_000)
}

/// 每个文件的预设结果
pub enum Outcome {
    Score(Option<f64>),
    /// 远程服务不可用时的模拟结果
    Simulated(f64),
    Fail(&'static str),
}

/// 按文件名返回预设结果的评估器，同时统计调用次数和并发峰值
#[derive(Default)]
pub struct ScriptedEvaluator {
    outcomes: HashMap<String, Outcome>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file_name: &str, outcome: Outcome) -> Self {
        self.outcomes.insert(file_name.to_string(), outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> AppResult<Evaluation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.outcomes.get(&request.candidate.name) {
            Some(Outcome::Fail(message)) => {
                Err(AppError::Evaluation(EvaluationError::ApiCallFailed {
                    model: "prueba".to_string(),
                    status: Some("500".to_string()),
                    message: message.to_string(),
                }))
            }
            Some(Outcome::Score(score)) => Ok(evaluation(*score)),
            Some(Outcome::Simulated(score)) => Ok(Evaluation {
                origin: EvaluationOrigin::Simulated,
                ..evaluation(Some(*score))
            }),
            None => Ok(evaluation(Some(8.0))),
        }
    }
}

fn evaluation(score: Option<f64>) -> Evaluation {
    Evaluation {
        score,
        feedback: "Buen trabajo, revisar la conclusión.".to_string(),
        full_response: String::new(),
        origin: EvaluationOrigin::Remote,
    }
}

/// 可以模拟离线或单步失败的网关
#[derive(Default)]
pub struct FlakyGateway {
    pub inner: MemoryGateway,
    pub profile_offline: AtomicBool,
    pub lists_offline: AtomicBool,
    pub fail_profile_delete: AtomicBool,
}

impl FlakyGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn offline(operation: &str) -> AppError {
        AppError::persistence(operation, "sin conexión")
    }
}

#[async_trait]
impl PersistenceGateway for FlakyGateway {
    async fn add(&self, uid: &str, collection: Collection, data: JsonValue) -> AppResult<String> {
        self.inner.add(uid, collection, data).await
    }

    async fn merge(
        &self,
        uid: &str,
        collection: Collection,
        id: &str,
        patch: JsonValue,
    ) -> AppResult<()> {
        self.inner.merge(uid, collection, id, patch).await
    }

    async fn delete(&self, uid: &str, collection: Collection, id: &str) -> AppResult<()> {
        self.inner.delete(uid, collection, id).await
    }

    async fn list(&self, uid: &str, collection: Collection) -> AppResult<Vec<StoredDoc>> {
        if self.lists_offline.load(Ordering::SeqCst) {
            return Err(Self::offline("list"));
        }
        self.inner.list(uid, collection).await
    }

    fn subscribe(&self, uid: &str, collection: Collection) -> watch::Receiver<Vec<StoredDoc>> {
        self.inner.subscribe(uid, collection)
    }

    async fn get_profile(&self, uid: &str) -> AppResult<Option<JsonValue>> {
        if self.profile_offline.load(Ordering::SeqCst) {
            return Err(Self::offline("get_profile"));
        }
        self.inner.get_profile(uid).await
    }

    async fn merge_profile(&self, uid: &str, patch: JsonValue) -> AppResult<()> {
        self.inner.merge_profile(uid, patch).await
    }

    async fn delete_profile(&self, uid: &str) -> AppResult<()> {
        if self.fail_profile_delete.load(Ordering::SeqCst) {
            return Err(Self::offline("delete_profile"));
        }
        self.inner.delete_profile(uid).await
    }
}
