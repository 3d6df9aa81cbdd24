//! The backing annotation store, reached over request/response calls.

pub mod fixture;
pub mod http;

use crate::types::document::{DocumentId, RuleId, TokenRef, VocabId};
use crate::types::notation::{
    CreatedNotation, GrammarNotation, NewGrammarNotation, NewVocabNotation, RuleDetailRecord, VocabEntry,
    VocabExampleRecord, VocabNotation,
};
use thiserror::Error;

pub use fixture::{FixtureData, FixtureStore};
pub use http::HttpStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("not found")]
    NotFound,
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("fixture error: {0}")]
    Fixture(String),
}

/// Blocking store operations. Implementations are shared by every backend
/// worker thread.
pub trait AnnotationStore: Send + Sync {
    fn grammar_notations(&self, document_id: DocumentId) -> Result<Vec<GrammarNotation>, StoreError>;

    fn vocab_notations(&self, document_id: DocumentId) -> Result<Vec<VocabNotation>, StoreError>;

    fn rule_detail(&self, rule_id: RuleId) -> Result<RuleDetailRecord, StoreError>;

    /// The vocabulary entry with all of its examples.
    fn vocab_entry(&self, vocab_id: VocabId) -> Result<VocabEntry, StoreError>;

    /// Positional lookup; `Ok(None)` is a confirmed "nothing here".
    fn example_at(&self, token: TokenRef) -> Result<Option<VocabExampleRecord>, StoreError>;

    fn create_vocab_notation(&self, request: &NewVocabNotation) -> Result<CreatedNotation, StoreError>;

    fn create_grammar_notation(&self, request: &NewGrammarNotation) -> Result<CreatedNotation, StoreError>;
}
