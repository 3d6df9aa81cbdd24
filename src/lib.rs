//*** START FILE: src/lib.rs ***//

// Annotation engine for the reader: token identity, selection, the
// annotation cache and its loader, and the notation mutation gateway.
pub mod config;
pub mod error;
pub mod types {
    pub mod document;
    pub mod notation;
}
pub mod parsing {
    pub mod explanation;
}
pub mod locator;
pub mod selection;
pub mod store;
pub mod backend;
pub mod cache;
pub mod loader;
pub mod gateway;
pub mod observer;
pub mod session;

pub use config::{load_config_from_file, load_or_default, ConfigError, ReaderConfig};
pub use error::ReaderError;
pub use loader::Lookup;
pub use observer::ReaderEvent;
pub use session::ReaderSession;
pub use types::document::{Document, DocumentId, RuleId, SentenceId, TokenRef, VocabId};

//*** END FILE: src/lib.rs ***//
