//! Errors surfaced to the host UI.
use crate::types::document::{DocumentId, SentenceId, TokenRef};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReaderError {
    #[error("no document is open")]
    NoDocument,

    #[error("document {requested} is not the open document")]
    StaleDocument { requested: DocumentId },

    #[error("sentence {sentence_id} is not in document {document_id}")]
    StaleSentence {
        document_id: DocumentId,
        sentence_id: SentenceId,
    },

    #[error("token {0} is no longer present")]
    StaleToken(TokenRef),

    #[error("nothing is selected")]
    EmptySelection,

    #[error("backend worker is gone")]
    BackendDisconnected,
}
