//! One reader session: the open document plus everything attached to it.
//!
//! The session lives on the UI thread. Store calls go out through the
//! [`BackendHandle`] and their replies are applied in [`ReaderSession::poll`],
//! which the host calls once per frame.

use crate::backend::{BackendHandle, StoreEvent};
use crate::cache::{AnnotationCache, LoadStatus};
use crate::config::ReaderConfig;
use crate::error::ReaderError;
use crate::gateway::MutationGateway;
use crate::loader::{AnnotationLoader, LoaderSettings, Lookup};
use crate::locator;
use crate::observer::{EventLog, Observers, ReaderEvent, Subscriber};
use crate::selection::{DragState, SelectionChange, SelectionMachine, SelectionState};
use crate::types::document::{Document, DocumentId, RuleId, SentenceId, TokenRef, VocabId};
use crate::types::notation::{
    GrammarNotation, GrammarRuleDetail, NewGrammarNotation, NewVocabNotation, VocabExample, VocabNotation, WordTokenRef,
};
use crossbeam_channel::RecvTimeoutError;
use egui::Pos2;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ReaderSession {
    document: Option<Document>,
    cache: AnnotationCache,
    loader: AnnotationLoader,
    gateway: MutationGateway,
    selection: SelectionMachine,
    backend: BackendHandle,
    observers: Observers,
}

impl ReaderSession {
    pub fn new(config: &ReaderConfig, backend: BackendHandle) -> Self {
        Self {
            document: None,
            cache: AnnotationCache::new(),
            loader: AnnotationLoader::new(LoaderSettings::from(config)),
            gateway: MutationGateway::new(),
            selection: SelectionMachine::new(config.drag_threshold_px),
            backend,
            observers: Observers::new(config.debug_log_capacity),
        }
    }

    // --- Document lifecycle ---

    /// Show `document` and start loading its notations.
    ///
    /// Reopening the document that is already loaded does not refetch.
    /// Switching documents drops the selection and every cached answer.
    pub fn open_document(&mut self, document: Document) -> Result<(), ReaderError> {
        let document_id = document.document_id;
        if self.document_id() != Some(document_id) {
            self.selection.reset();
        }
        self.document = Some(document);
        let events = self.loader.open_document(&mut self.cache, &self.backend, document_id)?;
        self.publish(events);
        Ok(())
    }

    pub fn close_document(&mut self) {
        self.document = None;
        self.selection.reset();
        self.loader.close(&mut self.cache);
    }

    pub fn invalidate(&mut self, document_id: DocumentId) {
        let events = self.loader.invalidate(&mut self.cache, document_id);
        self.publish(events);
    }

    /// Invalidate the open document and load it again.
    pub fn reload(&mut self) -> Result<(), ReaderError> {
        let document_id = self.document_id().ok_or(ReaderError::NoDocument)?;
        self.invalidate(document_id);
        let events = self.loader.open_document(&mut self.cache, &self.backend, document_id)?;
        self.publish(events);
        Ok(())
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.document.as_ref().map(|d| d.document_id)
    }

    pub fn load_status(&self) -> &LoadStatus {
        self.cache.status()
    }

    pub fn cache(&self) -> &AnnotationCache {
        &self.cache
    }

    /// Requests and creates still waiting for a reply.
    pub fn outstanding(&self) -> usize {
        self.loader.in_flight_count() + self.gateway.pending()
    }

    // --- Backend replies ---

    /// Apply every reply that has arrived. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.backend.try_recv() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for at least one reply, then drain the rest.
    pub fn poll_timeout(&mut self, timeout: Duration) -> usize {
        match self.backend.evt_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.dispatch(event);
                1 + self.poll()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("backend event channel disconnected");
                0
            }
        }
    }

    fn dispatch(&mut self, event: StoreEvent) {
        let events = match event {
            StoreEvent::VocabNotationCreated { .. } | StoreEvent::GrammarNotationCreated { .. } => {
                self.gateway.handle(&mut self.cache, &mut self.loader, event)
            }
            other => self.loader.handle(&mut self.cache, &self.backend, other),
        };
        self.publish(events);
    }

    fn publish(&mut self, events: Vec<ReaderEvent>) {
        for event in events {
            self.observers.notify(event);
        }
    }

    // --- Selection ---

    pub fn selection(&self) -> &SelectionState {
        self.selection.state()
    }

    pub fn drag_state(&self) -> DragState {
        self.selection.drag_state()
    }

    pub fn selection_snapshot(&self) -> Option<SelectionChange> {
        self.document.as_ref().map(|d| self.selection.snapshot(d))
    }

    pub fn pointer_down(&mut self, hit: Option<TokenRef>, pos: Pos2) {
        let Some(document) = self.document.as_ref() else {
            return;
        };
        let change = self.selection.pointer_down(document, hit, pos);
        self.emit_selection(change);
    }

    pub fn pointer_move(&mut self, pos: Pos2, hit: Option<TokenRef>) {
        self.selection.pointer_move(pos, hit);
    }

    pub fn pointer_up(&mut self, hit: Option<TokenRef>, pos: Pos2, merge: bool) {
        let Some(document) = self.document.as_ref() else {
            return;
        };
        let change = self.selection.pointer_up(document, hit, pos, merge);
        self.emit_selection(change);
    }

    pub fn clear_selection(&mut self) {
        let Some(document) = self.document.as_ref() else {
            return;
        };
        let change = self.selection.clear(document);
        self.emit_selection(change);
    }

    fn emit_selection(&mut self, change: Option<SelectionChange>) {
        if let Some(change) = change {
            debug!(selected = change.selected.len(), "selection changed");
            self.observers.notify(ReaderEvent::SelectionChanged(change));
        }
    }

    // --- Queries ---

    pub fn grammar_for_sentence(&self, sentence_id: SentenceId) -> Vec<&GrammarNotation> {
        self.cache.grammar_by_sentence(sentence_id)
    }

    pub fn vocab_for_sentence(&self, sentence_id: SentenceId) -> Vec<&VocabNotation> {
        self.cache.vocab_by_sentence(sentence_id)
    }

    pub fn grammar_for_token(&self, token: &TokenRef) -> Vec<&GrammarNotation> {
        self.cache.grammar_by_token(token)
    }

    pub fn vocab_for_token(&self, token: &TokenRef) -> Vec<&VocabNotation> {
        self.cache.vocab_by_token(token)
    }

    pub fn resolve_rule_detail(&mut self, rule_id: RuleId) -> Lookup<GrammarRuleDetail> {
        self.loader.resolve_rule_detail(&self.cache, &self.backend, rule_id)
    }

    pub fn resolve_vocab_example(&mut self, key: TokenRef) -> Lookup<VocabExample> {
        self.loader.resolve_vocab_example(&mut self.cache, &self.backend, key)
    }

    // --- Mutations ---

    /// Annotate one token with a vocabulary entry. The token's word group,
    /// if it has one, is recorded with the notation.
    pub fn create_vocab_notation(
        &mut self,
        document_id: DocumentId,
        sentence_id: SentenceId,
        token_position: u32,
        vocab_id: VocabId,
    ) -> Result<(), ReaderError> {
        let document = self.open_document_checked(document_id)?;
        let sentence = document.sentence(sentence_id).ok_or(ReaderError::StaleSentence {
            document_id,
            sentence_id,
        })?;
        let key = TokenRef::new(document_id, sentence_id, token_position);
        let token = locator::resolve(document, &key).ok_or(ReaderError::StaleToken(key))?;
        let word_token = token
            .word_token_id
            .and_then(|id| sentence.word_token(id))
            .map(|w| WordTokenRef {
                word_token_id: w.word_token_id,
                positions: w.positions.clone(),
            });
        let request = NewVocabNotation {
            document_id,
            sentence_id,
            token_position,
            vocab_id,
            word_token,
        };
        let ticket = self.loader.ticket(&self.cache);
        self.gateway.create_vocab_notation(&self.backend, ticket, request)
    }

    pub fn create_grammar_notation(
        &mut self,
        document_id: DocumentId,
        sentence_id: SentenceId,
        rule_id: RuleId,
        marked_positions: Vec<u32>,
    ) -> Result<(), ReaderError> {
        let document = self.open_document_checked(document_id)?;
        if document.sentence(sentence_id).is_none() {
            return Err(ReaderError::StaleSentence {
                document_id,
                sentence_id,
            });
        }
        if marked_positions.is_empty() {
            return Err(ReaderError::EmptySelection);
        }
        if let Some(missing) = marked_positions
            .iter()
            .map(|&p| TokenRef::new(document_id, sentence_id, p))
            .find(|key| locator::resolve(document, key).is_none())
        {
            return Err(ReaderError::StaleToken(missing));
        }
        let request = NewGrammarNotation {
            document_id,
            sentence_id,
            rule_id,
            marked_positions,
        };
        let ticket = self.loader.ticket(&self.cache);
        self.gateway.create_grammar_notation(&self.backend, ticket, request)
    }

    /// Mark the current selection with `rule_id`.
    pub fn create_grammar_notation_for_selection(&mut self, rule_id: RuleId) -> Result<(), ReaderError> {
        let document_id = self.document_id().ok_or(ReaderError::NoDocument)?;
        let state = self.selection.state();
        let sentence_id = state.active_sentence().ok_or(ReaderError::EmptySelection)?;
        let positions: Vec<u32> = state.positions().collect();
        self.create_grammar_notation(document_id, sentence_id, rule_id, positions)
    }

    fn open_document_checked(&self, document_id: DocumentId) -> Result<&Document, ReaderError> {
        let document = self.document.as_ref().ok_or(ReaderError::NoDocument)?;
        if document.document_id != document_id {
            return Err(ReaderError::StaleDocument {
                requested: document_id,
            });
        }
        Ok(document)
    }

    // --- Observers ---

    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.observers.subscribe(subscriber);
    }

    pub fn event_log(&self) -> &EventLog {
        self.observers.log()
    }

    pub fn clear_event_log(&mut self) {
        self.observers.log_mut().clear();
    }
}
