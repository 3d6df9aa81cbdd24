//! File-backed store used by the demo reader and by tests.

use super::{AnnotationStore, StoreError};
use crate::types::document::{Document, DocumentId, RuleId, TokenRef, VocabId};
use crate::types::notation::{
    CreatedNotation, GrammarNotation, NewGrammarNotation, NewVocabNotation, RuleDetailRecord, VocabEntry,
    VocabExampleRecord, VocabNotation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FixtureData {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub grammar_notations: Vec<GrammarNotation>,
    #[serde(default)]
    pub vocab_notations: Vec<VocabNotation>,
    #[serde(default)]
    pub rule_details: Vec<RuleDetailRecord>,
    #[serde(default)]
    pub vocab_entries: Vec<VocabEntry>,
    /// Examples reachable only through the positional lookup.
    #[serde(default)]
    pub positional_examples: Vec<VocabExampleRecord>,
}

#[derive(Debug, Default)]
pub struct FixtureStore {
    data: Mutex<FixtureData>,
    calls: Mutex<HashMap<&'static str, usize>>,
    offline: AtomicBool,
}

impl FixtureStore {
    pub fn new(data: FixtureData) -> Self {
        Self {
            data: Mutex::new(data),
            calls: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn from_path(file_path: &Path) -> Result<Self, StoreError> {
        let file = File::open(file_path)
            .map_err(|e| StoreError::Fixture(format!("Failed to open fixture {:?}: {}", file_path, e)))?;
        let data: FixtureData = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| StoreError::Fixture(format!("Failed to parse fixture {:?}: {}", file_path, e)))?;
        Ok(Self::new(data))
    }

    pub fn document(&self, document_id: DocumentId) -> Option<Document> {
        self.data().documents.iter().find(|d| d.document_id == document_id).cloned()
    }

    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.data().documents.iter().map(|d| d.document_id).collect()
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// How many times `op` was called, offline calls included.
    pub fn calls(&self, op: &str) -> usize {
        lock(&self.calls).get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    fn data(&self) -> MutexGuard<'_, FixtureData> {
        lock(&self.data)
    }

    fn record(&self, op: &'static str) -> Result<(), StoreError> {
        *lock(&self.calls).entry(op).or_insert(0) += 1;
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Transport(format!("{} failed: store offline", op)));
        }
        Ok(())
    }

    fn next_notation_id(data: &FixtureData) -> u64 {
        data.grammar_notations
            .iter()
            .filter_map(|n| n.notation_id)
            .chain(data.vocab_notations.iter().filter_map(|n| n.notation_id))
            .max()
            .map_or(1, |id| id + 1)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AnnotationStore for FixtureStore {
    fn grammar_notations(&self, document_id: DocumentId) -> Result<Vec<GrammarNotation>, StoreError> {
        self.record("grammar_notations")?;
        Ok(self
            .data()
            .grammar_notations
            .iter()
            .filter(|n| n.document_id == document_id)
            .cloned()
            .collect())
    }

    fn vocab_notations(&self, document_id: DocumentId) -> Result<Vec<VocabNotation>, StoreError> {
        self.record("vocab_notations")?;
        Ok(self
            .data()
            .vocab_notations
            .iter()
            .filter(|n| n.document_id == document_id)
            .cloned()
            .collect())
    }

    fn rule_detail(&self, rule_id: RuleId) -> Result<RuleDetailRecord, StoreError> {
        self.record("rule_detail")?;
        self.data()
            .rule_details
            .iter()
            .find(|r| r.rule_id == rule_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn vocab_entry(&self, vocab_id: VocabId) -> Result<VocabEntry, StoreError> {
        self.record("vocab_entry")?;
        self.data()
            .vocab_entries
            .iter()
            .find(|v| v.vocab_id == vocab_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn example_at(&self, token: TokenRef) -> Result<Option<VocabExampleRecord>, StoreError> {
        self.record("example_at")?;
        Ok(self
            .data()
            .positional_examples
            .iter()
            .find(|e| {
                e.document_id == token.document_id
                    && e.sentence_id == token.sentence_id
                    && e.token_position == Some(token.position)
            })
            .cloned())
    }

    fn create_vocab_notation(&self, request: &NewVocabNotation) -> Result<CreatedNotation, StoreError> {
        self.record("create_vocab_notation")?;
        let mut data = self.data();
        if !data.vocab_entries.iter().any(|v| v.vocab_id == request.vocab_id) {
            return Err(StoreError::NotFound);
        }
        let notation_id = Self::next_notation_id(&data);
        data.vocab_notations.push(request.clone().into_notation(Some(notation_id)));
        Ok(CreatedNotation { notation_id })
    }

    fn create_grammar_notation(&self, request: &NewGrammarNotation) -> Result<CreatedNotation, StoreError> {
        self.record("create_grammar_notation")?;
        let mut data = self.data();
        if !data.rule_details.iter().any(|r| r.rule_id == request.rule_id) {
            return Err(StoreError::NotFound);
        }
        let notation_id = Self::next_notation_id(&data);
        data.grammar_notations.push(request.clone().into_notation(Some(notation_id)));
        Ok(CreatedNotation { notation_id })
    }
}
