pub mod document_fetch;
pub mod language;
pub mod pdf;
pub mod relevance;
pub mod text;
