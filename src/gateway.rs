//! The only path by which the reader creates notations.
//!
//! A successful create inserts the notation into the cache and resolves its
//! explanatory content exactly once, on the worker, alongside the create
//! call. A failed create leaves the cache as it was.

use crate::backend::{BackendHandle, StoreCmd, StoreEvent, Ticket};
use crate::cache::AnnotationCache;
use crate::error::ReaderError;
use crate::loader::{example_from_entry, AnnotationLoader};
use crate::observer::{NotationKind, ReaderEvent, ResolutionTarget};
use crate::types::notation::{GrammarRuleDetail, NewGrammarNotation, NewVocabNotation};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct MutationGateway {
    pending: usize,
}

impl MutationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates sent and not yet answered.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn create_vocab_notation(
        &mut self,
        backend: &BackendHandle,
        ticket: Option<Ticket>,
        request: NewVocabNotation,
    ) -> Result<(), ReaderError> {
        let ticket = check_ticket(ticket, request.document_id)?;
        debug!(key = %request.token_ref(), vocab_id = %request.vocab_id, "creating vocab notation");
        backend.send(StoreCmd::CreateVocabNotation { ticket, request })?;
        self.pending += 1;
        Ok(())
    }

    pub fn create_grammar_notation(
        &mut self,
        backend: &BackendHandle,
        ticket: Option<Ticket>,
        request: NewGrammarNotation,
    ) -> Result<(), ReaderError> {
        let ticket = check_ticket(ticket, request.document_id)?;
        debug!(
            sentence_id = %request.sentence_id,
            rule_id = %request.rule_id,
            "creating grammar notation"
        );
        backend.send(StoreCmd::CreateGrammarNotation { ticket, request })?;
        self.pending += 1;
        Ok(())
    }

    /// Apply a create reply. Other events are ignored.
    pub fn handle(
        &mut self,
        cache: &mut AnnotationCache,
        loader: &mut AnnotationLoader,
        event: StoreEvent,
    ) -> Vec<ReaderEvent> {
        let ticket = event.ticket();
        let current = loader.is_current(cache, ticket);
        match event {
            StoreEvent::VocabNotationCreated {
                request,
                result,
                entry,
                ..
            } => {
                self.pending = self.pending.saturating_sub(1);
                let created = match result {
                    Ok(created) => created,
                    Err(err) => {
                        warn!(key = %request.token_ref(), "vocab notation not created: {}", err);
                        return vec![ReaderEvent::MutationFailed {
                            kind: NotationKind::Vocab,
                            message: err.to_string(),
                        }];
                    }
                };
                if !current {
                    // Persisted, but the document has moved on; the next load sees it.
                    return vec![ReaderEvent::StaleReplyDropped { ticket }];
                }

                let key = request.token_ref();
                let (document_id, sentence_id) = (request.document_id, request.sentence_id);
                cache.insert_vocab_notation(request.into_notation(Some(created.notation_id)));
                // Whatever was cached for this token predates the notation.
                cache.forget_example(&key);
                loader.supersede_example(key);
                info!(%key, notation_id = created.notation_id, "vocab notation created");

                let mut events = vec![ReaderEvent::NotationCreated {
                    kind: NotationKind::Vocab,
                    document_id,
                    sentence_id,
                }];
                match entry {
                    Some(Ok(entry)) => {
                        let example = example_from_entry(&entry, &key);
                        let found = example.is_some();
                        cache.store_vocab_entry(entry);
                        cache.store_example(key, example);
                        events.push(ReaderEvent::ExampleResolved { key, found });
                    }
                    Some(Err(err)) => {
                        warn!(%key, "example for new notation not resolved: {}", err);
                        events.push(ReaderEvent::ResolutionFailed {
                            target: ResolutionTarget::Example(key),
                            message: err.to_string(),
                        });
                    }
                    None => {}
                }
                events
            }
            StoreEvent::GrammarNotationCreated {
                request,
                result,
                detail,
                ..
            } => {
                self.pending = self.pending.saturating_sub(1);
                let created = match result {
                    Ok(created) => created,
                    Err(err) => {
                        warn!(rule_id = %request.rule_id, "grammar notation not created: {}", err);
                        return vec![ReaderEvent::MutationFailed {
                            kind: NotationKind::Grammar,
                            message: err.to_string(),
                        }];
                    }
                };
                if !current {
                    return vec![ReaderEvent::StaleReplyDropped { ticket }];
                }

                let rule_id = request.rule_id;
                let (document_id, sentence_id) = (request.document_id, request.sentence_id);
                cache.insert_grammar_notation(request.into_notation(Some(created.notation_id)));
                info!(%rule_id, notation_id = created.notation_id, "grammar notation created");

                let mut events = vec![ReaderEvent::NotationCreated {
                    kind: NotationKind::Grammar,
                    document_id,
                    sentence_id,
                }];
                match detail {
                    Some(Ok(record)) => {
                        cache.store_rule_detail(GrammarRuleDetail::from(record));
                        loader.supersede_rule(rule_id);
                        events.push(ReaderEvent::RuleDetailResolved { rule_id });
                    }
                    Some(Err(err)) => {
                        warn!(%rule_id, "rule detail for new notation not resolved: {}", err);
                        events.push(ReaderEvent::ResolutionFailed {
                            target: ResolutionTarget::RuleDetail(rule_id),
                            message: err.to_string(),
                        });
                    }
                    None => {}
                }
                events
            }
            _ => Vec::new(),
        }
    }
}

fn check_ticket(ticket: Option<Ticket>, requested: crate::types::document::DocumentId) -> Result<Ticket, ReaderError> {
    match ticket {
        None => Err(ReaderError::NoDocument),
        Some(ticket) if ticket.document_id != requested => Err(ReaderError::StaleDocument { requested }),
        Some(ticket) => Ok(ticket),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LoadedNotations;
    use crate::loader::{LoaderSettings, Lookup};
    use crate::store::StoreError;
    use crate::types::document::{DocumentId, RuleId, SentenceId, TokenRef, VocabId};
    use crate::types::notation::{CreatedNotation, RuleDetailRecord, VocabEntry, VocabExampleRecord};
    use crossbeam_channel::{unbounded, Receiver};
    use serde_json::json;
    use std::time::Duration;

    const DOC: DocumentId = DocumentId(4);

    struct Harness {
        cache: AnnotationCache,
        loader: AnnotationLoader,
        gateway: MutationGateway,
        backend: BackendHandle,
        cmd_rx: Receiver<StoreCmd>,
        ticket: Ticket,
    }

    fn harness() -> Harness {
        let mut h = loading_harness();
        h.loader.handle(
            &mut h.cache,
            &h.backend,
            StoreEvent::NotationsLoaded {
                ticket: h.ticket,
                result: Ok(LoadedNotations::default()),
            },
        );
        h
    }

    /// Document opened, bulk load still outstanding.
    fn loading_harness() -> Harness {
        let (cmd_tx, cmd_rx) = unbounded();
        let (_evt_tx, evt_rx) = unbounded();
        let backend = BackendHandle::from_channels(cmd_tx, evt_rx);
        let mut cache = AnnotationCache::new();
        let mut loader = AnnotationLoader::new(LoaderSettings {
            failure_backoff: Duration::ZERO,
            negative_ttl: None,
            prefetch_rule_details: false,
        });
        loader.open_document(&mut cache, &backend, DOC).expect("connected");
        let ticket = match cmd_rx.try_recv() {
            Ok(StoreCmd::LoadNotations { ticket }) => ticket,
            other => panic!("expected load, got {:?}", other),
        };
        Harness {
            cache,
            loader,
            gateway: MutationGateway::new(),
            backend,
            cmd_rx,
            ticket,
        }
    }

    fn vocab_request(position: u32) -> NewVocabNotation {
        NewVocabNotation {
            document_id: DOC,
            sentence_id: SentenceId(2),
            token_position: position,
            vocab_id: VocabId(42),
            word_token: None,
        }
    }

    fn entry() -> VocabEntry {
        VocabEntry {
            vocab_id: VocabId(42),
            body: "correr".to_string(),
            definition: Some("to run".to_string()),
            examples: vec![VocabExampleRecord {
                document_id: DOC,
                sentence_id: SentenceId(2),
                token_position: Some(3),
                context_explanation: json!({"explanation": "Runs, present tense."}),
                original_sentence: Some("Ella corre.".to_string()),
                vocab_id: Some(VocabId(42)),
            }],
        }
    }

    #[test]
    fn create_requires_the_open_document() {
        let mut h = harness();
        let mut request = vocab_request(3);
        request.document_id = DocumentId(99);
        let err = h
            .gateway
            .create_vocab_notation(&h.backend, Some(h.ticket), request)
            .expect_err("other document");
        assert_eq!(err, ReaderError::StaleDocument { requested: DocumentId(99) });

        let err = h
            .gateway
            .create_vocab_notation(&h.backend, None, vocab_request(3))
            .expect_err("nothing open");
        assert_eq!(err, ReaderError::NoDocument);
        assert_eq!(h.cmd_rx.try_iter().count(), 0);
    }

    #[test]
    fn successful_create_caches_notation_and_example() {
        let mut h = harness();
        h.gateway
            .create_vocab_notation(&h.backend, Some(h.ticket), vocab_request(3))
            .expect("sent");
        assert_eq!(h.gateway.pending(), 1);
        assert_eq!(h.cmd_rx.try_iter().count(), 1);

        let events = h.gateway.handle(
            &mut h.cache,
            &mut h.loader,
            StoreEvent::VocabNotationCreated {
                ticket: h.ticket,
                request: vocab_request(3),
                result: Ok(CreatedNotation { notation_id: 11 }),
                entry: Some(Ok(entry())),
            },
        );
        assert_eq!(events.len(), 2);
        assert_eq!(h.gateway.pending(), 0);
        assert_eq!(h.cache.vocab_notations().len(), 1);
        assert_eq!(h.cache.vocab_notations()[0].notation_id, Some(11));

        let key = TokenRef::new(DOC, SentenceId(2), 3);
        let example = h
            .loader
            .resolve_vocab_example(&mut h.cache, &h.backend, key)
            .ready()
            .expect("resolved by the create");
        assert_eq!(example.explanation.text(), "Runs, present tense.");
        assert_eq!(h.cmd_rx.try_iter().count(), 0);
    }

    #[test]
    fn create_replaces_earlier_negative() {
        let mut h = harness();
        let key = TokenRef::new(DOC, SentenceId(2), 3);
        h.cache.store_example(key, None);

        h.gateway.handle(
            &mut h.cache,
            &mut h.loader,
            StoreEvent::VocabNotationCreated {
                ticket: h.ticket,
                request: vocab_request(3),
                result: Ok(CreatedNotation { notation_id: 1 }),
                entry: Some(Err(StoreError::Transport("timeout".to_string()))),
            },
        );
        // The stale negative is gone, so the lookup goes through the new notation.
        let lookup = h.loader.resolve_vocab_example(&mut h.cache, &h.backend, key);
        assert!(lookup.is_pending());
        assert!(matches!(
            h.cmd_rx.try_iter().collect::<Vec<_>>().as_slice(),
            [StoreCmd::FetchVocabEntry { vocab_id: VocabId(42), .. }]
        ));
    }

    #[test]
    fn failed_create_leaves_cache_untouched() {
        let mut h = harness();
        let events = h.gateway.handle(
            &mut h.cache,
            &mut h.loader,
            StoreEvent::GrammarNotationCreated {
                ticket: h.ticket,
                request: NewGrammarNotation {
                    document_id: DOC,
                    sentence_id: SentenceId(1),
                    rule_id: RuleId(5),
                    marked_positions: vec![0, 1],
                },
                result: Err(StoreError::Status {
                    status: 422,
                    url: "notations/grammar".to_string(),
                }),
                detail: None,
            },
        );
        assert!(matches!(
            events.as_slice(),
            [ReaderEvent::MutationFailed {
                kind: NotationKind::Grammar,
                ..
            }]
        ));
        assert!(h.cache.grammar_notations().is_empty());
        assert!(h.cache.rule_detail(RuleId(5)).is_none());
    }

    #[test]
    fn grammar_create_caches_rule_detail() {
        let mut h = harness();
        h.gateway.handle(
            &mut h.cache,
            &mut h.loader,
            StoreEvent::GrammarNotationCreated {
                ticket: h.ticket,
                request: NewGrammarNotation {
                    document_id: DOC,
                    sentence_id: SentenceId(1),
                    rule_id: RuleId(5),
                    marked_positions: vec![1, 0],
                },
                result: Ok(CreatedNotation { notation_id: 3 }),
                detail: Some(Ok(RuleDetailRecord {
                    rule_id: RuleId(5),
                    name: "Ser vs estar".to_string(),
                    explanation: json!("Permanent versus temporary."),
                })),
            },
        );
        assert_eq!(h.cache.grammar_by_sentence(SentenceId(1)).len(), 1);
        let lookup = h.loader.resolve_rule_detail(&h.cache, &h.backend, RuleId(5));
        assert!(matches!(lookup, Lookup::Ready(ref d) if d.name == "Ser vs estar"));
        assert_eq!(h.cmd_rx.try_iter().count(), 0);
    }

    #[test]
    fn create_reply_after_document_switch_is_not_cached() {
        let mut h = harness();
        let old = h.ticket;
        h.loader.invalidate(&mut h.cache, DOC);
        let events = h.gateway.handle(
            &mut h.cache,
            &mut h.loader,
            StoreEvent::VocabNotationCreated {
                ticket: old,
                request: vocab_request(3),
                result: Ok(CreatedNotation { notation_id: 1 }),
                entry: None,
            },
        );
        assert!(matches!(events.as_slice(), [ReaderEvent::StaleReplyDropped { .. }]));
        assert!(h.cache.vocab_notations().is_empty());
    }

    #[test]
    fn create_during_bulk_load_survives_the_load() {
        let mut h = loading_harness();
        h.gateway
            .create_vocab_notation(&h.backend, Some(h.ticket), vocab_request(3))
            .expect("sent");
        h.gateway.handle(
            &mut h.cache,
            &mut h.loader,
            StoreEvent::VocabNotationCreated {
                ticket: h.ticket,
                request: vocab_request(3),
                result: Ok(CreatedNotation { notation_id: 11 }),
                entry: Some(Ok(entry())),
            },
        );
        assert_eq!(h.cache.vocab_notations().len(), 1);

        // The bulk response was read before the create landed.
        h.loader.handle(
            &mut h.cache,
            &h.backend,
            StoreEvent::NotationsLoaded {
                ticket: h.ticket,
                result: Ok(LoadedNotations::default()),
            },
        );
        assert!(h.cache.status().is_initialized());
        assert_eq!(h.cache.vocab_by_sentence(SentenceId(2)).len(), 1);
        let key = TokenRef::new(DOC, SentenceId(2), 3);
        assert_eq!(h.cache.vocab_by_token(&key).len(), 1);
    }
}
