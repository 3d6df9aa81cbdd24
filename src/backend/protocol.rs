//! Protocol types between the UI thread and the store workers.

use crate::store::StoreError;
use crate::types::document::{DocumentId, RuleId, TokenRef, VocabId};
use crate::types::notation::{
    CreatedNotation, GrammarNotation, NewGrammarNotation, NewVocabNotation, RuleDetailRecord, VocabEntry,
    VocabExampleRecord, VocabNotation,
};

/// Tags a request with the document load it was issued for. Replies whose
/// ticket no longer matches the session are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub document_id: DocumentId,
    pub generation: u64,
}

/// Commands issued by the UI thread for a worker to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCmd {
    /// Fetch grammar and vocab notations for a document, concurrently.
    LoadNotations { ticket: Ticket },
    FetchRuleDetail { ticket: Ticket, rule_id: RuleId },
    /// Fetch a vocab entry to resolve the example shown for `key`.
    /// `serial` is echoed in the reply to match it to its request.
    FetchVocabEntry {
        ticket: Ticket,
        key: TokenRef,
        vocab_id: VocabId,
        serial: u64,
    },
    /// Positional fallback lookup for `key`.
    FetchExampleAt { ticket: Ticket, key: TokenRef, serial: u64 },
    /// Create, then resolve the new notation's vocab entry once.
    CreateVocabNotation { ticket: Ticket, request: NewVocabNotation },
    /// Create, then resolve the new notation's rule detail once.
    CreateGrammarNotation {
        ticket: Ticket,
        request: NewGrammarNotation,
    },
}

impl StoreCmd {
    pub fn ticket(&self) -> Ticket {
        match self {
            StoreCmd::LoadNotations { ticket }
            | StoreCmd::FetchRuleDetail { ticket, .. }
            | StoreCmd::FetchVocabEntry { ticket, .. }
            | StoreCmd::FetchExampleAt { ticket, .. }
            | StoreCmd::CreateVocabNotation { ticket, .. }
            | StoreCmd::CreateGrammarNotation { ticket, .. } => *ticket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadedNotations {
    pub grammar: Vec<GrammarNotation>,
    pub vocab: Vec<VocabNotation>,
}

/// Replies produced by the workers and drained by the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    NotationsLoaded {
        ticket: Ticket,
        result: Result<LoadedNotations, StoreError>,
    },
    RuleDetailLoaded {
        ticket: Ticket,
        rule_id: RuleId,
        result: Result<RuleDetailRecord, StoreError>,
    },
    VocabEntryLoaded {
        ticket: Ticket,
        key: TokenRef,
        vocab_id: VocabId,
        serial: u64,
        result: Result<VocabEntry, StoreError>,
    },
    ExampleAtLoaded {
        ticket: Ticket,
        key: TokenRef,
        serial: u64,
        result: Result<Option<VocabExampleRecord>, StoreError>,
    },
    VocabNotationCreated {
        ticket: Ticket,
        request: NewVocabNotation,
        result: Result<CreatedNotation, StoreError>,
        /// Absent when the create itself failed.
        entry: Option<Result<VocabEntry, StoreError>>,
    },
    GrammarNotationCreated {
        ticket: Ticket,
        request: NewGrammarNotation,
        result: Result<CreatedNotation, StoreError>,
        detail: Option<Result<RuleDetailRecord, StoreError>>,
    },
}

impl StoreEvent {
    pub fn ticket(&self) -> Ticket {
        match self {
            StoreEvent::NotationsLoaded { ticket, .. }
            | StoreEvent::RuleDetailLoaded { ticket, .. }
            | StoreEvent::VocabEntryLoaded { ticket, .. }
            | StoreEvent::ExampleAtLoaded { ticket, .. }
            | StoreEvent::VocabNotationCreated { ticket, .. }
            | StoreEvent::GrammarNotationCreated { ticket, .. } => *ticket,
        }
    }
}
