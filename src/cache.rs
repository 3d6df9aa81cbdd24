//! In-memory annotation cache for the open document.
//!
//! Only the loader replaces its contents wholesale; the loader and the
//! mutation gateway insert; everything else reads.

use crate::types::document::{DocumentId, RuleId, SentenceId, TokenRef, VocabId};
use crate::types::notation::{GrammarKey, GrammarNotation, GrammarRuleDetail, VocabEntry, VocabExample, VocabKey, VocabNotation};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    /// Initialized but empty because the bulk fetch failed.
    Failed(String),
}

impl LoadStatus {
    pub fn is_initialized(&self) -> bool {
        matches!(self, LoadStatus::Ready | LoadStatus::Failed(_))
    }
}

/// A resolved example slot. `example: None` is a confirmed negative.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedExample {
    pub example: Option<VocabExample>,
    pub resolved_at: Instant,
}

#[derive(Debug, Default)]
pub struct AnnotationCache {
    document_id: Option<DocumentId>,
    status: LoadStatus,
    grammar: Vec<GrammarNotation>,
    grammar_keys: HashSet<GrammarKey>,
    vocab: Vec<VocabNotation>,
    vocab_keys: HashSet<VocabKey>,
    rule_details: HashMap<RuleId, GrammarRuleDetail>,
    vocab_entries: HashMap<VocabId, VocabEntry>,
    examples: HashMap<TokenRef, CachedExample>,
}

impl AnnotationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.document_id
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    /// True once a load for `document_id` finished, successfully or not.
    pub fn is_initialized_for(&self, document_id: DocumentId) -> bool {
        self.document_id == Some(document_id) && self.status.is_initialized()
    }

    pub fn is_loading_for(&self, document_id: DocumentId) -> bool {
        self.document_id == Some(document_id) && self.status == LoadStatus::Loading
    }

    /// Drop everything and start tracking `document_id`.
    pub fn begin_load(&mut self, document_id: DocumentId) {
        self.clear_contents();
        self.document_id = Some(document_id);
        self.status = LoadStatus::Loading;
    }

    /// Merge a successful bulk load into the notation sets. Notations created
    /// since [`begin_load`](Self::begin_load) are kept; the bulk response may
    /// have been read before they were persisted.
    pub fn finish_load(&mut self, grammar: Vec<GrammarNotation>, vocab: Vec<VocabNotation>) {
        for notation in grammar {
            self.insert_grammar_notation(notation);
        }
        for notation in vocab {
            self.insert_vocab_notation(notation);
        }
        self.status = LoadStatus::Ready;
    }

    /// Record a failed bulk load: both collections empty, cache initialized.
    pub fn fail_load(&mut self, message: String) {
        self.clear_notations();
        self.status = LoadStatus::Failed(message);
    }

    /// Force the next load of `document_id` to refetch. Returns whether the
    /// cache was tracking that document.
    pub fn invalidate(&mut self, document_id: DocumentId) -> bool {
        if self.document_id != Some(document_id) {
            return false;
        }
        self.clear_contents();
        self.status = LoadStatus::Uninitialized;
        true
    }

    /// Forget the document entirely (document closed).
    pub fn reset(&mut self) {
        self.clear_contents();
        self.document_id = None;
        self.status = LoadStatus::Uninitialized;
    }

    fn clear_notations(&mut self) {
        self.grammar.clear();
        self.grammar_keys.clear();
        self.vocab.clear();
        self.vocab_keys.clear();
    }

    fn clear_contents(&mut self) {
        self.clear_notations();
        self.rule_details.clear();
        self.vocab_entries.clear();
        self.examples.clear();
    }

    // --- Notations ---

    pub fn grammar_notations(&self) -> &[GrammarNotation] {
        &self.grammar
    }

    pub fn vocab_notations(&self) -> &[VocabNotation] {
        &self.vocab
    }

    /// Idempotent add. Returns false if an equal notation was already cached.
    pub fn insert_grammar_notation(&mut self, notation: GrammarNotation) -> bool {
        if !self.grammar_keys.insert(notation.key()) {
            return false;
        }
        self.grammar.push(notation);
        true
    }

    pub fn insert_vocab_notation(&mut self, notation: VocabNotation) -> bool {
        if !self.vocab_keys.insert(notation.key()) {
            return false;
        }
        self.vocab.push(notation);
        true
    }

    pub fn grammar_by_sentence(&self, sentence_id: SentenceId) -> Vec<&GrammarNotation> {
        self.grammar.iter().filter(|n| n.sentence_id == sentence_id).collect()
    }

    pub fn vocab_by_sentence(&self, sentence_id: SentenceId) -> Vec<&VocabNotation> {
        self.vocab.iter().filter(|n| n.sentence_id == sentence_id).collect()
    }

    /// Grammar notations marking this token.
    pub fn grammar_by_token(&self, token: &TokenRef) -> Vec<&GrammarNotation> {
        self.grammar
            .iter()
            .filter(|n| n.document_id == token.document_id && n.sentence_id == token.sentence_id && n.marks(token.position))
            .collect()
    }

    /// Vocab notations on this exact token, then those whose word group covers it.
    pub fn vocab_by_token(&self, token: &TokenRef) -> Vec<&VocabNotation> {
        let in_sentence = || {
            self.vocab
                .iter()
                .filter(|n| n.document_id == token.document_id && n.sentence_id == token.sentence_id)
        };
        in_sentence()
            .filter(|n| n.token_position == token.position)
            .chain(in_sentence().filter(|n| n.token_position != token.position && n.word_token_contains(token.position)))
            .collect()
    }

    // --- Resolved details ---

    pub fn rule_detail(&self, rule_id: RuleId) -> Option<&GrammarRuleDetail> {
        self.rule_details.get(&rule_id)
    }

    pub fn store_rule_detail(&mut self, detail: GrammarRuleDetail) {
        self.rule_details.insert(detail.rule_id, detail);
    }

    pub fn vocab_entry(&self, vocab_id: VocabId) -> Option<&VocabEntry> {
        self.vocab_entries.get(&vocab_id)
    }

    pub fn store_vocab_entry(&mut self, entry: VocabEntry) {
        self.vocab_entries.insert(entry.vocab_id, entry);
    }

    /// Cached example slot for `key`. Negative slots older than
    /// `negative_ttl` are treated as missing.
    pub fn example(&self, key: &TokenRef, negative_ttl: Option<Duration>) -> Option<&CachedExample> {
        let slot = self.examples.get(key)?;
        match (&slot.example, negative_ttl) {
            (None, Some(ttl)) if slot.resolved_at.elapsed() >= ttl => None,
            _ => Some(slot),
        }
    }

    pub fn store_example(&mut self, key: TokenRef, example: Option<VocabExample>) {
        self.examples.insert(
            key,
            CachedExample {
                example,
                resolved_at: Instant::now(),
            },
        );
    }

    /// Drop a cached answer so the next lookup resolves again.
    pub fn forget_example(&mut self, key: &TokenRef) -> bool {
        self.examples.remove(key).is_some()
    }

    pub fn cached_example_count(&self) -> usize {
        self.examples.len()
    }
}
