use crossbeam_channel::unbounded;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use weavelang_reader::backend::{spawn_backend, BackendHandle, LoadedNotations, StoreCmd, StoreEvent};
use weavelang_reader::cache::LoadStatus;
use weavelang_reader::observer::{NotationKind, ReaderEvent};
use weavelang_reader::store::{AnnotationStore, FixtureData, FixtureStore};
use weavelang_reader::types::document::{Sentence, Token};
use weavelang_reader::types::notation::{
    GrammarNotation, RuleDetailRecord, VocabEntry, VocabExampleRecord, VocabNotation,
};
use weavelang_reader::{Document, DocumentId, Lookup, ReaderConfig, ReaderSession, RuleId, SentenceId, TokenRef, VocabId};

const DOC: DocumentId = DocumentId(1);

fn document(id: DocumentId) -> Document {
    let sentence = |sentence_id: u64| Sentence {
        sentence_id: SentenceId(sentence_id),
        body: format!("sentence {}", sentence_id),
        tokens: (0..6)
            .map(|position| Token {
                position,
                text: format!("w{}_{}", sentence_id, position),
                selectable: true,
                word_token_id: None,
            })
            .collect(),
        word_tokens: Vec::new(),
    };
    Document {
        document_id: id,
        title: "Test".to_string(),
        sentences: vec![sentence(1), sentence(2)],
    }
}

fn example(sentence: u64, position: Option<u32>, text: &str) -> VocabExampleRecord {
    VocabExampleRecord {
        document_id: DOC,
        sentence_id: SentenceId(sentence),
        token_position: position,
        context_explanation: json!({ "explanation": text }),
        original_sentence: None,
        vocab_id: None,
    }
}

fn fixture() -> FixtureData {
    FixtureData {
        documents: vec![document(DOC)],
        grammar_notations: vec![GrammarNotation {
            notation_id: Some(1),
            document_id: DOC,
            sentence_id: SentenceId(1),
            rule_id: RuleId(5),
            marked_positions: vec![0, 1],
        }],
        vocab_notations: vec![VocabNotation {
            notation_id: Some(2),
            document_id: DOC,
            sentence_id: SentenceId(2),
            token_position: 3,
            vocab_id: VocabId(42),
            word_token: None,
        }],
        rule_details: vec![RuleDetailRecord {
            rule_id: RuleId(5),
            name: "Preterite".to_string(),
            explanation: json!("Completed action in the past."),
        }],
        vocab_entries: vec![
            VocabEntry {
                vocab_id: VocabId(42),
                body: "correr".to_string(),
                definition: None,
                examples: vec![example(9, Some(0), "nine"), example(2, Some(3), "two")],
            },
            VocabEntry {
                vocab_id: VocabId(77),
                body: "casa".to_string(),
                definition: None,
                examples: vec![example(1, Some(2), "house")],
            },
        ],
        positional_examples: vec![example(1, Some(4), "positional")],
    }
}

fn config(prefetch: bool) -> ReaderConfig {
    ReaderConfig {
        worker_threads: 2,
        failure_backoff_ms: 0,
        prefetch_rule_details: prefetch,
        ..ReaderConfig::default()
    }
}

fn start(prefetch: bool) -> (Arc<FixtureStore>, ReaderSession) {
    let store = Arc::new(FixtureStore::new(fixture()));
    let shared: Arc<dyn AnnotationStore> = store.clone();
    let backend = spawn_backend(shared, 2).expect("workers spawn");
    (store, ReaderSession::new(&config(prefetch), backend))
}

/// Poll until nothing is outstanding.
fn settle(session: &mut ReaderSession) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while (session.outstanding() > 0 || session.load_status() == &LoadStatus::Loading) && Instant::now() < deadline {
        session.poll_timeout(Duration::from_millis(20));
    }
    assert_eq!(session.outstanding(), 0, "backend did not answer in time");
}

fn opened(prefetch: bool) -> (Arc<FixtureStore>, ReaderSession) {
    let (store, mut session) = start(prefetch);
    session.open_document(document(DOC)).expect("backend connected");
    settle(&mut session);
    (store, session)
}

fn recorder(session: &mut ReaderSession) -> Rc<RefCell<Vec<ReaderEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    session.subscribe(Box::new(move |event| sink.borrow_mut().push(event.clone())));
    seen
}

#[test]
fn open_loads_notations_once() {
    let (store, mut session) = start(false);
    let seen = recorder(&mut session);
    session.open_document(document(DOC)).expect("connected");
    settle(&mut session);

    assert_eq!(session.load_status(), &LoadStatus::Ready);
    assert_eq!(session.grammar_for_sentence(SentenceId(1)).len(), 1);
    assert_eq!(session.vocab_for_sentence(SentenceId(2)).len(), 1);
    assert!(matches!(seen.borrow()[0], ReaderEvent::LoadStarted { .. }));
    assert!(matches!(seen.borrow()[1], ReaderEvent::NotationsLoaded { grammar: 1, vocab: 1, .. }));

    session.open_document(document(DOC)).expect("connected");
    settle(&mut session);
    assert_eq!(store.calls("grammar_notations"), 1);
    assert_eq!(store.calls("vocab_notations"), 1);
}

#[test]
fn annotated_token_prefers_example_from_its_sentence() {
    let (store, mut session) = opened(false);
    let key = TokenRef::new(DOC, SentenceId(2), 3);

    assert!(session.resolve_vocab_example(key).is_pending());
    settle(&mut session);
    let example = session.resolve_vocab_example(key).ready().expect("resolved");

    assert_eq!(example.sentence_id, SentenceId(2));
    assert_eq!(example.explanation.text(), "two");
    assert_eq!(store.calls("vocab_entry"), 1);
    assert_eq!(store.calls("example_at"), 0);
}

#[test]
fn repeated_lookups_share_one_request() {
    let (store, mut session) = opened(false);
    let key = TokenRef::new(DOC, SentenceId(1), 4);
    for _ in 0..5 {
        assert!(session.resolve_vocab_example(key).is_pending());
    }
    for _ in 0..3 {
        assert!(session.resolve_rule_detail(RuleId(5)).is_pending());
    }
    settle(&mut session);

    assert_eq!(store.calls("example_at"), 1);
    assert_eq!(store.calls("rule_detail"), 1);
    let example = session.resolve_vocab_example(key).ready().expect("positional hit");
    assert_eq!(example.explanation.text(), "positional");
}

#[test]
fn confirmed_absence_is_not_refetched() {
    let (store, mut session) = opened(false);
    let key = TokenRef::new(DOC, SentenceId(1), 2);

    assert!(session.resolve_vocab_example(key).is_pending());
    settle(&mut session);
    assert_eq!(session.resolve_vocab_example(key), Lookup::Absent);
    assert_eq!(session.resolve_vocab_example(key), Lookup::Absent);
    assert_eq!(store.calls("example_at"), 1);
}

#[test]
fn load_prefetches_rule_details() {
    let (store, mut session) = opened(true);
    assert_eq!(store.calls("rule_detail"), 1);
    let detail = session.resolve_rule_detail(RuleId(5)).ready().expect("prefetched");
    assert_eq!(detail.name, "Preterite");
    assert_eq!(detail.explanation.text(), "Completed action in the past.");
}

#[test]
fn created_notation_is_resolved_without_further_requests() {
    let (store, mut session) = opened(false);
    let seen = recorder(&mut session);
    let key = TokenRef::new(DOC, SentenceId(1), 2);

    session
        .create_vocab_notation(DOC, SentenceId(1), 2, VocabId(77))
        .expect("sent");
    settle(&mut session);

    assert_eq!(session.vocab_for_token(&key).len(), 1);
    let example = session.resolve_vocab_example(key).ready().expect("resolved by create");
    assert_eq!(example.explanation.text(), "house");
    assert_eq!(store.calls("vocab_entry"), 1);
    assert_eq!(store.calls("example_at"), 0);
    assert!(seen.borrow().iter().any(|e| matches!(
        e,
        ReaderEvent::NotationCreated {
            kind: NotationKind::Vocab,
            ..
        }
    )));
}

#[test]
fn failed_create_leaves_cache_unchanged() {
    let (_store, mut session) = opened(false);
    let seen = recorder(&mut session);

    session
        .create_vocab_notation(DOC, SentenceId(1), 2, VocabId(999))
        .expect("sent");
    settle(&mut session);

    assert_eq!(session.cache().vocab_notations().len(), 1);
    assert!(session.vocab_for_token(&TokenRef::new(DOC, SentenceId(1), 2)).is_empty());
    assert!(seen
        .borrow()
        .iter()
        .any(|e| matches!(e, ReaderEvent::MutationFailed { .. })));
}

#[test]
fn failed_load_initializes_empty_and_is_not_retried() {
    let (store, mut session) = start(false);
    store.set_offline(true);
    session.open_document(document(DOC)).expect("connected");
    settle(&mut session);

    assert!(matches!(session.load_status(), LoadStatus::Failed(_)));
    assert!(session.cache().grammar_notations().is_empty());
    assert!(session.cache().vocab_notations().is_empty());

    store.set_offline(false);
    session.open_document(document(DOC)).expect("connected");
    settle(&mut session);
    assert_eq!(store.calls("grammar_notations"), 1);

    // An explicit reload does refetch.
    session.reload().expect("connected");
    settle(&mut session);
    assert_eq!(session.load_status(), &LoadStatus::Ready);
    assert_eq!(store.calls("grammar_notations"), 2);
}

#[test]
fn failed_resolution_is_retried() {
    let (store, mut session) = opened(false);
    store.set_offline(true);
    assert!(session.resolve_rule_detail(RuleId(5)).is_pending());
    settle(&mut session);
    assert!(session.cache().rule_detail(RuleId(5)).is_none());

    store.set_offline(false);
    assert!(session.resolve_rule_detail(RuleId(5)).is_pending());
    settle(&mut session);
    assert!(session.resolve_rule_detail(RuleId(5)).ready().is_some());
    assert_eq!(store.calls("rule_detail"), 2);
}

#[test]
fn replies_for_previous_document_are_discarded() {
    let (cmd_tx, cmd_rx) = unbounded();
    let (evt_tx, evt_rx) = unbounded();
    let mut session = ReaderSession::new(&config(false), BackendHandle::from_channels(cmd_tx, evt_rx));
    let seen = recorder(&mut session);

    session.open_document(document(DocumentId(1))).expect("connected");
    let first = match cmd_rx.try_recv() {
        Ok(StoreCmd::LoadNotations { ticket }) => ticket,
        other => panic!("expected load, got {:?}", other),
    };
    session.open_document(document(DocumentId(2))).expect("connected");
    let second = match cmd_rx.try_recv() {
        Ok(StoreCmd::LoadNotations { ticket }) => ticket,
        other => panic!("expected load, got {:?}", other),
    };

    // The first document's notations arrive after the switch.
    evt_tx
        .send(StoreEvent::NotationsLoaded {
            ticket: first,
            result: Ok(LoadedNotations {
                grammar: fixture().grammar_notations,
                vocab: fixture().vocab_notations,
            }),
        })
        .expect("send");
    session.poll();
    assert!(session.cache().is_loading_for(DocumentId(2)));
    assert!(session.cache().grammar_notations().is_empty());
    assert!(seen
        .borrow()
        .iter()
        .any(|e| matches!(e, ReaderEvent::StaleReplyDropped { ticket } if *ticket == first)));

    evt_tx
        .send(StoreEvent::NotationsLoaded {
            ticket: second,
            result: Ok(LoadedNotations::default()),
        })
        .expect("send");
    session.poll();
    assert!(session.cache().is_initialized_for(DocumentId(2)));
}

#[test]
fn late_resolution_after_invalidate_is_discarded() {
    let (cmd_tx, cmd_rx) = unbounded();
    let (evt_tx, evt_rx) = unbounded();
    let mut session = ReaderSession::new(&config(false), BackendHandle::from_channels(cmd_tx, evt_rx));

    session.open_document(document(DOC)).expect("connected");
    let ticket = match cmd_rx.try_recv() {
        Ok(StoreCmd::LoadNotations { ticket }) => ticket,
        other => panic!("expected load, got {:?}", other),
    };
    evt_tx
        .send(StoreEvent::NotationsLoaded {
            ticket,
            result: Ok(LoadedNotations::default()),
        })
        .expect("send");
    session.poll();

    assert!(session.resolve_rule_detail(RuleId(5)).is_pending());
    session.reload().expect("connected");
    evt_tx
        .send(StoreEvent::RuleDetailLoaded {
            ticket,
            rule_id: RuleId(5),
            result: Ok(RuleDetailRecord {
                rule_id: RuleId(5),
                name: "Preterite".to_string(),
                explanation: json!(null),
            }),
        })
        .expect("send");
    session.poll();
    assert!(session.cache().rule_detail(RuleId(5)).is_none());
}
