pub mod document;
pub mod loaders;
pub mod profile;
pub mod subject;
pub mod task;

pub use document::{Document, PDF_MIME};
pub use loaders::{load_all_documents, load_document, load_subject_drafts};
pub use profile::{AuthIdentity, Settings, Theme, UserProfile};
pub use subject::{ScoreType, Subject, SubjectDraft, SubjectPatch};
pub use task::Task;
