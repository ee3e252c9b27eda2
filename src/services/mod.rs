pub mod evaluation_service;
pub mod export;
pub mod session;
pub mod subject_registry;
pub mod task_ledger;

pub use evaluation_service::{
    Evaluation, EvaluationOrigin, EvaluationRequest, Evaluator, LlmEvaluator,
};
pub use export::{tasks_to_csv, AccountExport};
pub use session::{ProfileUpdate, ProfileUpdateOutcome, Session, SessionManager, SessionState};
pub use subject_registry::{Confirmation, SubjectRegistry};
pub use task_ledger::TaskLedger;
