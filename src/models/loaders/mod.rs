pub mod document_loader;
pub mod toml_loader;

pub use document_loader::{load_all_documents, load_document};
pub use toml_loader::{load_subject_drafts, parse_subject_drafts};
