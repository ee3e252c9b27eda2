//! # Grading Evaluator
//!
//! 教师上传基准文件和一批学生 PDF，逐个交给生成式 AI 对比评分，
//! 并把分数和反馈保存到按用户隔离的文档存储中。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 外部服务的边界，只暴露能力
//! - `PersistenceGateway` - 文档存储（增、合并、删、列表、实时订阅）
//! - `LocalCache` - 本地键值缓存（离线回退）
//! - `AuthProvider` - 认证提供方
//! - `LiveCollection` - 实时集合，每次变更整体替换
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `LlmEvaluator` - 单个文件的评估能力
//! - `SubjectRegistry` - 科目与基准文件
//! - `TaskLedger` - 评估记录
//! - `SessionManager` - 会话、资料、设置和账号删除
//! - `export` - CSV / JSON 导出
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的评估流程
//! - `EvaluationCtx` - 上下文封装（文件序号 + 科目）
//! - `EvaluationFlow` - 评估 → 解析 → 评估记录草稿
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_evaluator` - 批量评估，管理并发和失败隔离
//! - `orchestrator/app` - 命令行驱动
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{Document, Subject, Task, UserProfile};
pub use orchestrator::{App, BatchEvaluator, BatchReport};
pub use services::{Evaluator, LlmEvaluator, SessionManager, SubjectRegistry, TaskLedger};
pub use workflow::{EvaluationCtx, EvaluationFlow};
