//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量评估和流程调度。
//!
//! ## 模块划分
//!
//! ### `batch_evaluator` - 批量评估器
//! - 前置校验（科目、队列、基准文件）
//! - 为每个文件并发调用评估流程
//! - 隔离单个文件的失败，只持久化成功的结果
//! - 输出"N 个中成功 K 个"的汇总
//!
//! ### `app` - 命令行驱动
//! - 管理应用生命周期（初始化、登录、运行、导出）
//! - 持有网关、会话和评估服务
//!
//! ## 层次关系
//!
//! ```text
//! app (生命周期)
//!     ↓
//! batch_evaluator (处理 Vec<Document>)
//!     ↓
//! workflow::EvaluationFlow (处理单个 Document)
//!     ↓
//! services (能力层：evaluation / subjects / tasks / session / export)
//!     ↓
//! infrastructure (网关、缓存、认证)
//! ```

pub mod app;
pub mod batch_evaluator;

// 重新导出主要类型
pub use app::App;
pub use batch_evaluator::{BatchEvaluator, BatchReport, FileFailure};
