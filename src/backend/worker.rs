//! Worker threads that run blocking store calls off the UI thread.

use crate::backend::{LoadedNotations, StoreCmd, StoreEvent};
use crate::error::ReaderError;
use crate::store::{AnnotationStore, StoreError};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::io;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Handle for sending commands to, and receiving events from, the workers.
pub struct BackendHandle {
    pub cmd_tx: Sender<StoreCmd>,
    pub evt_rx: Receiver<StoreEvent>,
}

impl BackendHandle {
    /// Build a handle from raw channel ends; tests use this to stand in for
    /// the workers and reply in any order they like.
    pub fn from_channels(cmd_tx: Sender<StoreCmd>, evt_rx: Receiver<StoreEvent>) -> Self {
        Self { cmd_tx, evt_rx }
    }

    pub fn send(&self, cmd: StoreCmd) -> Result<(), ReaderError> {
        self.cmd_tx.send(cmd).map_err(|_| ReaderError::BackendDisconnected)
    }

    /// Next finished reply, if one is waiting.
    pub fn try_recv(&self) -> Option<StoreEvent> {
        match self.evt_rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("backend event channel disconnected");
                None
            }
        }
    }
}

/// Spawn `threads` workers sharing one command queue.
///
/// Workers exit once every command sender has been dropped.
///
/// # Errors
/// Returns the spawn error if a worker thread cannot be created.
pub fn spawn_backend(store: Arc<dyn AnnotationStore>, threads: usize) -> io::Result<BackendHandle> {
    let (cmd_tx, cmd_rx) = unbounded::<StoreCmd>();
    let (evt_tx, evt_rx) = unbounded::<StoreEvent>();

    for index in 0..threads.max(1) {
        let cmd_rx = cmd_rx.clone();
        let evt_tx = evt_tx.clone();
        let store = Arc::clone(&store);
        thread::Builder::new()
            .name(format!("weavelang-store-{}", index))
            .spawn(move || {
                for cmd in cmd_rx.iter() {
                    let event = execute(store.as_ref(), cmd);
                    if evt_tx.send(event).is_err() {
                        debug!("event receiver dropped, worker exiting");
                        break;
                    }
                }
            })?;
    }

    Ok(BackendHandle { cmd_tx, evt_rx })
}

/// Run one command against the store and package the reply.
pub fn execute(store: &dyn AnnotationStore, cmd: StoreCmd) -> StoreEvent {
    match cmd {
        StoreCmd::LoadNotations { ticket } => {
            let result = load_notations(store, ticket.document_id);
            StoreEvent::NotationsLoaded { ticket, result }
        }
        StoreCmd::FetchRuleDetail { ticket, rule_id } => StoreEvent::RuleDetailLoaded {
            ticket,
            rule_id,
            result: store.rule_detail(rule_id),
        },
        StoreCmd::FetchVocabEntry {
            ticket,
            key,
            vocab_id,
            serial,
        } => StoreEvent::VocabEntryLoaded {
            ticket,
            key,
            vocab_id,
            serial,
            result: store.vocab_entry(vocab_id),
        },
        StoreCmd::FetchExampleAt { ticket, key, serial } => StoreEvent::ExampleAtLoaded {
            ticket,
            key,
            serial,
            result: store.example_at(key),
        },
        StoreCmd::CreateVocabNotation { ticket, request } => {
            let result = store.create_vocab_notation(&request);
            let entry = result.is_ok().then(|| store.vocab_entry(request.vocab_id));
            StoreEvent::VocabNotationCreated {
                ticket,
                request,
                result,
                entry,
            }
        }
        StoreCmd::CreateGrammarNotation { ticket, request } => {
            let result = store.create_grammar_notation(&request);
            let detail = result.is_ok().then(|| store.rule_detail(request.rule_id));
            StoreEvent::GrammarNotationCreated {
                ticket,
                request,
                result,
                detail,
            }
        }
    }
}

fn load_notations(
    store: &dyn AnnotationStore,
    document_id: crate::types::document::DocumentId,
) -> Result<LoadedNotations, StoreError> {
    // Both bulk fetches are in flight at once; either failure fails the load.
    let (grammar, vocab) = thread::scope(|scope| {
        let grammar = scope.spawn(|| store.grammar_notations(document_id));
        let vocab = store.vocab_notations(document_id);
        let grammar = grammar
            .join()
            .unwrap_or_else(|_| Err(StoreError::Transport("grammar notation fetch panicked".to_string())));
        (grammar, vocab)
    });
    Ok(LoadedNotations {
        grammar: grammar?,
        vocab: vocab?,
    })
}
