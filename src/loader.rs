//! Bulk notation loading and lazy resolution of explanatory content.
//!
//! Every request carries a [`Ticket`]; opening, closing or invalidating a
//! document bumps the generation so replies for older loads are dropped.
//! At most one request per rule id and per token is ever outstanding.

use crate::backend::{BackendHandle, StoreCmd, StoreEvent, Ticket};
use crate::cache::AnnotationCache;
use crate::config::ReaderConfig;
use crate::error::ReaderError;
use crate::observer::{ReaderEvent, ResolutionTarget};
use crate::store::StoreError;
use crate::types::document::{DocumentId, RuleId, TokenRef, VocabId};
use crate::types::notation::{GrammarRuleDetail, VocabEntry, VocabExample};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of a cache-or-fetch lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Ready(T),
    /// Confirmed: there is nothing to show.
    Absent,
    /// A request is outstanding; ask again after the next poll.
    Pending,
    /// The last attempt failed and the retry backoff has not elapsed.
    Failed,
}

impl<T> Lookup<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Lookup::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Lookup::Pending)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    pub failure_backoff: Duration,
    pub negative_ttl: Option<Duration>,
    pub prefetch_rule_details: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self::from(&ReaderConfig::default())
    }
}

impl From<&ReaderConfig> for LoaderSettings {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            failure_backoff: config.failure_backoff(),
            negative_ttl: config.negative_ttl(),
            prefetch_rule_details: config.prefetch_rule_details,
        }
    }
}

#[derive(Debug, Default)]
pub struct AnnotationLoader {
    settings: LoaderSettings,
    generation: u64,
    rule_in_flight: HashSet<RuleId>,
    /// Outstanding example request per token, by serial. A reply whose
    /// serial is not listed here is ignored.
    example_in_flight: HashMap<TokenRef, u64>,
    next_serial: u64,
    rule_failures: HashMap<RuleId, Instant>,
    example_failures: HashMap<TokenRef, Instant>,
}

impl AnnotationLoader {
    pub fn new(settings: LoaderSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Tag for requests issued against the cache's current document.
    pub fn ticket(&self, cache: &AnnotationCache) -> Option<Ticket> {
        cache.document_id().map(|document_id| Ticket {
            document_id,
            generation: self.generation,
        })
    }

    pub fn is_current(&self, cache: &AnnotationCache, ticket: Ticket) -> bool {
        self.ticket(cache) == Some(ticket)
    }

    pub fn rule_in_flight(&self, rule_id: RuleId) -> bool {
        self.rule_in_flight.contains(&rule_id)
    }

    pub fn example_in_flight(&self, key: &TokenRef) -> bool {
        self.example_in_flight.contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.rule_in_flight.len() + self.example_in_flight.len()
    }

    fn next_generation(&mut self) {
        self.generation += 1;
        self.rule_in_flight.clear();
        self.example_in_flight.clear();
        self.rule_failures.clear();
        self.example_failures.clear();
    }

    /// Start the bulk load for `document_id` unless it is already loading or
    /// loaded. Returns the events to publish.
    pub fn open_document(
        &mut self,
        cache: &mut AnnotationCache,
        backend: &BackendHandle,
        document_id: DocumentId,
    ) -> Result<Vec<ReaderEvent>, ReaderError> {
        if cache.is_initialized_for(document_id) || cache.is_loading_for(document_id) {
            debug!(%document_id, "document already loaded, skipping bulk fetch");
            return Ok(Vec::new());
        }
        self.next_generation();
        cache.begin_load(document_id);
        let ticket = Ticket {
            document_id,
            generation: self.generation,
        };
        info!(%document_id, generation = self.generation, "loading notations");
        if let Err(err) = backend.send(StoreCmd::LoadNotations { ticket }) {
            cache.fail_load(err.to_string());
            return Err(err);
        }
        Ok(vec![ReaderEvent::LoadStarted { document_id }])
    }

    /// Make the next [`open_document`](Self::open_document) refetch.
    pub fn invalidate(&mut self, cache: &mut AnnotationCache, document_id: DocumentId) -> Vec<ReaderEvent> {
        if !cache.invalidate(document_id) {
            return Vec::new();
        }
        self.next_generation();
        info!(%document_id, "annotation cache invalidated");
        vec![ReaderEvent::CacheInvalidated { document_id }]
    }

    pub fn close(&mut self, cache: &mut AnnotationCache) {
        cache.reset();
        self.next_generation();
    }

    pub fn resolve_rule_detail(
        &mut self,
        cache: &AnnotationCache,
        backend: &BackendHandle,
        rule_id: RuleId,
    ) -> Lookup<GrammarRuleDetail> {
        if let Some(detail) = cache.rule_detail(rule_id) {
            return Lookup::Ready(detail.clone());
        }
        let Some(ticket) = self.ticket(cache) else {
            return Lookup::Absent;
        };
        if self.rule_in_flight.contains(&rule_id) {
            return Lookup::Pending;
        }
        if recently_failed(&self.rule_failures, &rule_id, self.settings.failure_backoff) {
            return Lookup::Failed;
        }
        if self.request_rule(backend, ticket, rule_id) {
            Lookup::Pending
        } else {
            Lookup::Failed
        }
    }

    fn request_rule(&mut self, backend: &BackendHandle, ticket: Ticket, rule_id: RuleId) -> bool {
        if !self.rule_in_flight.insert(rule_id) {
            return true;
        }
        if let Err(err) = backend.send(StoreCmd::FetchRuleDetail { ticket, rule_id }) {
            warn!(%rule_id, "rule detail request not sent: {}", err);
            self.rule_in_flight.remove(&rule_id);
            self.rule_failures.insert(rule_id, Instant::now());
            return false;
        }
        true
    }

    /// Resolve the example shown for one token.
    ///
    /// Order: cached answer, then the vocab notation on that exact token,
    /// then a notation whose word group covers it, then the positional
    /// lookup. Notation-driven answers name the entry that was actually
    /// annotated, the positional one may pick a different entry.
    pub fn resolve_vocab_example(
        &mut self,
        cache: &mut AnnotationCache,
        backend: &BackendHandle,
        key: TokenRef,
    ) -> Lookup<VocabExample> {
        if cache.document_id() != Some(key.document_id) {
            debug!(%key, "example lookup for a document that is not open");
            return Lookup::Absent;
        }
        if let Some(slot) = cache.example(&key, self.settings.negative_ttl) {
            return match &slot.example {
                Some(example) => Lookup::Ready(example.clone()),
                None => Lookup::Absent,
            };
        }
        if self.example_in_flight.contains_key(&key) {
            return Lookup::Pending;
        }
        if recently_failed(&self.example_failures, &key, self.settings.failure_backoff) {
            return Lookup::Failed;
        }
        // Without the notations the positional fallback could answer for
        // a token that is in fact annotated.
        if !cache.status().is_initialized() {
            return Lookup::Pending;
        }
        let Some(ticket) = self.ticket(cache) else {
            return Lookup::Absent;
        };

        let annotated = cache.vocab_by_token(&key).first().map(|n| n.vocab_id);
        self.next_serial += 1;
        let serial = self.next_serial;
        let cmd = match annotated {
            Some(vocab_id) => {
                if let Some(entry) = cache.vocab_entry(vocab_id) {
                    let example = example_from_entry(entry, &key);
                    let found = example.is_some();
                    cache.store_example(key, example.clone());
                    debug!(%key, %vocab_id, found, "example resolved from cached entry");
                    return example.map_or(Lookup::Absent, Lookup::Ready);
                }
                StoreCmd::FetchVocabEntry {
                    ticket,
                    key,
                    vocab_id,
                    serial,
                }
            }
            None => StoreCmd::FetchExampleAt { ticket, key, serial },
        };

        self.example_in_flight.insert(key, serial);
        if let Err(err) = backend.send(cmd) {
            warn!(%key, "example request not sent: {}", err);
            self.example_in_flight.remove(&key);
            self.example_failures.insert(key, Instant::now());
            return Lookup::Failed;
        }
        Lookup::Pending
    }

    /// The gateway wrote a definitive answer for `key`; ignore any reply still
    /// on its way and clear the failure backoff.
    pub fn supersede_example(&mut self, key: TokenRef) {
        if let Some(serial) = self.example_in_flight.remove(&key) {
            debug!(%key, serial, "outstanding example request superseded");
        }
        self.example_failures.remove(&key);
    }

    pub fn supersede_rule(&mut self, rule_id: RuleId) {
        self.rule_failures.remove(&rule_id);
    }

    /// Apply one worker reply. Replies for an older ticket are dropped.
    pub fn handle(&mut self, cache: &mut AnnotationCache, backend: &BackendHandle, event: StoreEvent) -> Vec<ReaderEvent> {
        let ticket = event.ticket();
        if !self.is_current(cache, ticket) {
            debug!(document_id = %ticket.document_id, generation = ticket.generation, "dropping stale reply");
            return vec![ReaderEvent::StaleReplyDropped { ticket }];
        }
        match event {
            StoreEvent::NotationsLoaded { ticket, result } => self.on_notations(cache, backend, ticket, result),
            StoreEvent::RuleDetailLoaded { rule_id, result, .. } => self.on_rule_detail(cache, rule_id, result),
            StoreEvent::VocabEntryLoaded {
                key,
                vocab_id,
                serial,
                result,
                ..
            } => {
                if self.take_reply(&key, serial) {
                    self.on_vocab_entry(cache, key, vocab_id, result)
                } else {
                    Vec::new()
                }
            }
            StoreEvent::ExampleAtLoaded { key, serial, result, .. } => {
                if self.take_reply(&key, serial) {
                    self.on_example_at(cache, key, result)
                } else {
                    Vec::new()
                }
            }
            StoreEvent::VocabNotationCreated { .. } | StoreEvent::GrammarNotationCreated { .. } => {
                warn!("creation reply routed to the loader");
                Vec::new()
            }
        }
    }

    /// Clears the in-flight marker if `serial` is the outstanding request
    /// for `key`. False for superseded replies.
    fn take_reply(&mut self, key: &TokenRef, serial: u64) -> bool {
        if self.example_in_flight.get(key) != Some(&serial) {
            debug!(%key, serial, "ignoring superseded example reply");
            return false;
        }
        self.example_in_flight.remove(key);
        true
    }

    fn on_notations(
        &mut self,
        cache: &mut AnnotationCache,
        backend: &BackendHandle,
        ticket: Ticket,
        result: Result<crate::backend::LoadedNotations, StoreError>,
    ) -> Vec<ReaderEvent> {
        let document_id = ticket.document_id;
        let loaded = match result {
            Ok(loaded) => loaded,
            Err(err) => {
                error!(%document_id, "bulk notation load failed: {}", err);
                cache.fail_load(err.to_string());
                return vec![ReaderEvent::LoadFailed {
                    document_id,
                    message: err.to_string(),
                }];
            }
        };

        let rule_ids: BTreeSet<RuleId> = loaded.grammar.iter().map(|n| n.rule_id).collect();
        cache.finish_load(loaded.grammar, loaded.vocab);
        let grammar = cache.grammar_notations().len();
        let vocab = cache.vocab_notations().len();
        info!(%document_id, grammar, vocab, "notations loaded");

        if self.settings.prefetch_rule_details {
            for rule_id in rule_ids {
                if cache.rule_detail(rule_id).is_none() {
                    self.request_rule(backend, ticket, rule_id);
                }
            }
        }
        vec![ReaderEvent::NotationsLoaded {
            document_id,
            grammar,
            vocab,
        }]
    }

    fn on_rule_detail(
        &mut self,
        cache: &mut AnnotationCache,
        rule_id: RuleId,
        result: Result<crate::types::notation::RuleDetailRecord, StoreError>,
    ) -> Vec<ReaderEvent> {
        self.rule_in_flight.remove(&rule_id);
        match result {
            Ok(record) => {
                cache.store_rule_detail(GrammarRuleDetail::from(record));
                self.rule_failures.remove(&rule_id);
                vec![ReaderEvent::RuleDetailResolved { rule_id }]
            }
            Err(err) => {
                warn!(%rule_id, "rule detail fetch failed: {}", err);
                self.rule_failures.insert(rule_id, Instant::now());
                vec![ReaderEvent::ResolutionFailed {
                    target: ResolutionTarget::RuleDetail(rule_id),
                    message: err.to_string(),
                }]
            }
        }
    }

    fn on_vocab_entry(
        &mut self,
        cache: &mut AnnotationCache,
        key: TokenRef,
        vocab_id: VocabId,
        result: Result<VocabEntry, StoreError>,
    ) -> Vec<ReaderEvent> {
        match result {
            Ok(entry) => {
                let example = example_from_entry(&entry, &key);
                cache.store_vocab_entry(entry);
                self.store_example(cache, key, example)
            }
            // The annotated entry is gone: a confirmed negative.
            Err(StoreError::NotFound) => {
                debug!(%key, %vocab_id, "annotated vocab entry no longer exists");
                self.store_example(cache, key, None)
            }
            Err(err) => self.example_failed(key, err),
        }
    }

    fn on_example_at(
        &mut self,
        cache: &mut AnnotationCache,
        key: TokenRef,
        result: Result<Option<crate::types::notation::VocabExampleRecord>, StoreError>,
    ) -> Vec<ReaderEvent> {
        match result {
            Ok(record) => {
                let example = record.as_ref().map(VocabExample::from_record);
                self.store_example(cache, key, example)
            }
            Err(StoreError::NotFound) => self.store_example(cache, key, None),
            Err(err) => self.example_failed(key, err),
        }
    }

    fn store_example(&mut self, cache: &mut AnnotationCache, key: TokenRef, example: Option<VocabExample>) -> Vec<ReaderEvent> {
        let found = example.is_some();
        cache.store_example(key, example);
        self.example_failures.remove(&key);
        vec![ReaderEvent::ExampleResolved { key, found }]
    }

    fn example_failed(&mut self, key: TokenRef, err: StoreError) -> Vec<ReaderEvent> {
        warn!(%key, "example resolution failed: {}", err);
        self.example_failures.insert(key, Instant::now());
        vec![ReaderEvent::ResolutionFailed {
            target: ResolutionTarget::Example(key),
            message: err.to_string(),
        }]
    }
}

/// Pick the entry's example for the token's sentence, else its first one.
pub fn example_from_entry(entry: &VocabEntry, key: &TokenRef) -> Option<VocabExample> {
    entry
        .example_for(key.document_id, key.sentence_id)
        .map(|record| VocabExample::from_entry(entry, record))
}

fn recently_failed<K: std::hash::Hash + Eq>(failures: &HashMap<K, Instant>, key: &K, backoff: Duration) -> bool {
    failures.get(key).is_some_and(|at| at.elapsed() < backoff)
}
