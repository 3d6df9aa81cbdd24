//! Change notifications for the host UI, plus the debug event log.

use crate::backend::Ticket;
use crate::selection::SelectionChange;
use crate::types::document::{DocumentId, RuleId, SentenceId, TokenRef};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotationKind {
    Grammar,
    Vocab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTarget {
    RuleDetail(RuleId),
    Example(TokenRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    SelectionChanged(SelectionChange),
    LoadStarted {
        document_id: DocumentId,
    },
    NotationsLoaded {
        document_id: DocumentId,
        grammar: usize,
        vocab: usize,
    },
    /// Dismissible; the document stays open with no annotations.
    LoadFailed {
        document_id: DocumentId,
        message: String,
    },
    CacheInvalidated {
        document_id: DocumentId,
    },
    RuleDetailResolved {
        rule_id: RuleId,
    },
    ExampleResolved {
        key: TokenRef,
        found: bool,
    },
    /// Not cached; a later lookup retries.
    ResolutionFailed {
        target: ResolutionTarget,
        message: String,
    },
    NotationCreated {
        kind: NotationKind,
        document_id: DocumentId,
        sentence_id: SentenceId,
    },
    MutationFailed {
        kind: NotationKind,
        message: String,
    },
    StaleReplyDropped {
        ticket: Ticket,
    },
}

impl fmt::Display for ReaderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderEvent::SelectionChanged(change) => {
                write!(f, "selection: {} token(s) [{}]", change.selected.len(), change.joined_text(" "))
            }
            ReaderEvent::LoadStarted { document_id } => write!(f, "loading document {}", document_id),
            ReaderEvent::NotationsLoaded {
                document_id,
                grammar,
                vocab,
            } => write!(f, "document {}: {} grammar / {} vocab notations", document_id, grammar, vocab),
            ReaderEvent::LoadFailed { document_id, message } => {
                write!(f, "document {} failed to load: {}", document_id, message)
            }
            ReaderEvent::CacheInvalidated { document_id } => write!(f, "document {} invalidated", document_id),
            ReaderEvent::RuleDetailResolved { rule_id } => write!(f, "rule {} resolved", rule_id),
            ReaderEvent::ExampleResolved { key, found } => {
                write!(f, "example {} {}", key, if *found { "resolved" } else { "absent" })
            }
            ReaderEvent::ResolutionFailed { target, message } => match target {
                ResolutionTarget::RuleDetail(rule_id) => write!(f, "rule {} failed: {}", rule_id, message),
                ResolutionTarget::Example(key) => write!(f, "example {} failed: {}", key, message),
            },
            ReaderEvent::NotationCreated {
                kind,
                document_id,
                sentence_id,
            } => write!(f, "{:?} notation created in {}:{}", kind, document_id, sentence_id),
            ReaderEvent::MutationFailed { kind, message } => {
                write!(f, "{:?} notation not saved: {}", kind, message)
            }
            ReaderEvent::StaleReplyDropped { ticket } => write!(
                f,
                "dropped reply for document {} (generation {})",
                ticket.document_id, ticket.generation
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: Instant,
    pub summary: String,
}

/// Bounded ring buffer of recent events for the debug panel.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn record(&mut self, event: &ReaderEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            at: Instant::now(),
            summary: event.to_string(),
        });
    }

    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub type Subscriber = Box<dyn FnMut(&ReaderEvent)>;

/// Fan-out point for every session mutation.
pub struct Observers {
    subscribers: Vec<Subscriber>,
    log: EventLog,
}

impl Observers {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            log: EventLog::new(log_capacity),
        }
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    pub fn notify(&mut self, event: ReaderEvent) {
        self.log.record(&event);
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut EventLog {
        &mut self.log
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.subscribers.len())
            .field("log", &self.log.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn log_keeps_only_latest_entries() {
        let mut log = EventLog::new(2);
        for id in 1..=3 {
            log.record(&ReaderEvent::LoadStarted {
                document_id: DocumentId(id),
            });
        }
        let summaries: Vec<&str> = log.entries().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries, vec!["loading document 2", "loading document 3"]);
    }

    #[test]
    fn subscribers_see_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::new(8);
        let sink = Rc::clone(&seen);
        observers.subscribe(Box::new(move |event| sink.borrow_mut().push(event.clone())));

        observers.notify(ReaderEvent::LoadStarted { document_id: DocumentId(1) });
        observers.notify(ReaderEvent::CacheInvalidated { document_id: DocumentId(1) });

        assert_eq!(seen.borrow().len(), 2);
        assert!(matches!(seen.borrow()[1], ReaderEvent::CacheInvalidated { .. }));
        assert_eq!(observers.log().len(), 2);
    }

    #[test]
    fn zero_capacity_log_stays_empty() {
        let mut log = EventLog::new(0);
        log.record(&ReaderEvent::LoadStarted { document_id: DocumentId(1) });
        assert!(log.is_empty());
    }
}
