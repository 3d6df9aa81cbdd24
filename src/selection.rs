//! Pointer-driven token selection within a single sentence.
//!
//! A press on a token arms the machine; moving farther than the drag
//! threshold turns the gesture into a range drag, otherwise the release is a
//! click that toggles one token. Selections never span sentences.

use crate::locator::resolve;
use crate::types::document::{Document, DocumentId, Sentence, SentenceId, Token, TokenRef};
use egui::Pos2;
use std::collections::BTreeSet;

pub const DEFAULT_DRAG_THRESHOLD: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Pressed {
        document_id: DocumentId,
        sentence_id: SentenceId,
        anchor: u32,
        origin: Pos2,
    },
    Dragging {
        document_id: DocumentId,
        sentence_id: SentenceId,
        anchor: u32,
        current: u32,
    },
}

/// Active sentence plus the selected positions inside it.
///
/// A non-empty `selected` always comes with `Some(active_sentence)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    active_sentence: Option<SentenceId>,
    selected: BTreeSet<u32>,
}

impl SelectionState {
    pub fn active_sentence(&self) -> Option<SentenceId> {
        self.active_sentence
    }

    pub fn positions(&self) -> impl Iterator<Item = u32> + '_ {
        self.selected.iter().copied()
    }

    pub fn contains(&self, sentence_id: SentenceId, position: u32) -> bool {
        self.active_sentence == Some(sentence_id) && self.selected.contains(&position)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    fn clear(&mut self) {
        self.active_sentence = None;
        self.selected.clear();
    }

    /// Switch to `sentence_id`, dropping positions chosen in another sentence.
    fn focus(&mut self, sentence_id: SentenceId) {
        if self.active_sentence != Some(sentence_id) {
            self.selected.clear();
            self.active_sentence = Some(sentence_id);
        }
    }

    fn settle(&mut self) {
        if self.selected.is_empty() {
            self.active_sentence = None;
        }
    }
}

/// Everything downstream consumers need about the selected span.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionContext {
    pub sentence_id: SentenceId,
    pub sentence_body: String,
    pub tokens: Vec<Token>,
    pub selected_tokens: Vec<Token>,
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionChange {
    pub document_id: DocumentId,
    pub selected: Vec<TokenRef>,
    /// Display text of the selected tokens in position order.
    pub text: Vec<String>,
    pub context: Option<SelectionContext>,
}

impl SelectionChange {
    pub fn joined_text(&self, separator: &str) -> String {
        self.text.join(separator)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SelectionMachine {
    drag: DragState,
    state: SelectionState,
    drag_threshold: f32,
}

impl Default for SelectionMachine {
    fn default() -> Self {
        Self::new(DEFAULT_DRAG_THRESHOLD)
    }
}

impl SelectionMachine {
    pub fn new(drag_threshold: f32) -> Self {
        Self {
            drag: DragState::Idle,
            state: SelectionState::default(),
            drag_threshold,
        }
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn pointer_down(&mut self, document: &Document, hit: Option<TokenRef>, pos: Pos2) -> Option<SelectionChange> {
        self.drag = DragState::Idle;
        let Some(hit) = hit else {
            return self.clear(document);
        };
        // Stale targets never arm the machine. A non-selectable anchor can
        // still start a drag; a click on it is a no-op.
        if resolve(document, &hit).is_some() {
            self.drag = DragState::Pressed {
                document_id: hit.document_id,
                sentence_id: hit.sentence_id,
                anchor: hit.position,
                origin: pos,
            };
        }
        None
    }

    pub fn pointer_move(&mut self, pos: Pos2, hit: Option<TokenRef>) {
        let in_sentence = |document_id: DocumentId, sentence_id: SentenceId| {
            hit.filter(|h| h.document_id == document_id && h.sentence_id == sentence_id)
        };
        self.drag = match self.drag {
            DragState::Idle => DragState::Idle,
            DragState::Pressed {
                document_id,
                sentence_id,
                anchor,
                origin,
            } => {
                let delta = (pos - origin).abs();
                if delta.x > self.drag_threshold || delta.y > self.drag_threshold {
                    DragState::Dragging {
                        document_id,
                        sentence_id,
                        anchor,
                        current: in_sentence(document_id, sentence_id).map_or(anchor, |h| h.position),
                    }
                } else {
                    self.drag
                }
            }
            // Hovering another sentence keeps the last in-sentence position.
            DragState::Dragging {
                document_id,
                sentence_id,
                anchor,
                current,
            } => DragState::Dragging {
                document_id,
                sentence_id,
                anchor,
                current: in_sentence(document_id, sentence_id).map_or(current, |h| h.position),
            },
        };
    }

    /// Finish the gesture. `merge` unions a drag range with the existing set.
    pub fn pointer_up(&mut self, document: &Document, hit: Option<TokenRef>, pos: Pos2, merge: bool) -> Option<SelectionChange> {
        self.pointer_move(pos, hit);
        let finished = std::mem::replace(&mut self.drag, DragState::Idle);
        match finished {
            DragState::Idle => None,
            DragState::Pressed {
                document_id,
                sentence_id,
                anchor,
                ..
            } => self.toggle(document, TokenRef::new(document_id, sentence_id, anchor)),
            DragState::Dragging {
                document_id,
                sentence_id,
                anchor,
                current,
            } => self.select_range(document, document_id, sentence_id, anchor, current, merge),
        }
    }

    /// Click semantics: flip one token, keeping the rest of the sentence's selection.
    pub fn toggle(&mut self, document: &Document, token: TokenRef) -> Option<SelectionChange> {
        let sentence = document_sentence(document, token.document_id, token.sentence_id)?;
        if !sentence.token(token.position).is_some_and(|t| t.selectable) {
            return None;
        }
        self.state.focus(token.sentence_id);
        if !self.state.selected.remove(&token.position) {
            self.state.selected.insert(token.position);
        }
        self.state.settle();
        Some(self.snapshot(document))
    }

    /// Select every selectable token between `anchor` and `current`, inclusive.
    pub fn select_range(
        &mut self,
        document: &Document,
        document_id: DocumentId,
        sentence_id: SentenceId,
        anchor: u32,
        current: u32,
        merge: bool,
    ) -> Option<SelectionChange> {
        let sentence = document_sentence(document, document_id, sentence_id)?;
        let (lo, hi) = (anchor.min(current), anchor.max(current));
        let in_range = sentence
            .tokens
            .iter()
            .filter(|t| t.selectable && (lo..=hi).contains(&t.position))
            .map(|t| t.position);

        if !merge {
            self.state.clear();
        }
        self.state.focus(sentence_id);
        self.state.selected.extend(in_range);
        self.state.settle();
        Some(self.snapshot(document))
    }

    /// Drop the selection and the active sentence. Emits only if something was selected.
    pub fn clear(&mut self, document: &Document) -> Option<SelectionChange> {
        self.drag = DragState::Idle;
        if self.state.is_empty() && self.state.active_sentence.is_none() {
            return None;
        }
        self.state.clear();
        Some(self.snapshot(document))
    }

    /// Forget everything without emitting, used when the document changes.
    pub fn reset(&mut self) {
        self.drag = DragState::Idle;
        self.state.clear();
    }

    pub fn snapshot(&self, document: &Document) -> SelectionChange {
        let sentence = self
            .state
            .active_sentence
            .and_then(|id| document.sentence(id))
            .filter(|_| !self.state.is_empty());
        let Some(sentence) = sentence else {
            return SelectionChange {
                document_id: document.document_id,
                selected: Vec::new(),
                text: Vec::new(),
                context: None,
            };
        };

        let mut selected_tokens: Vec<Token> = sentence
            .tokens
            .iter()
            .filter(|t| self.state.selected.contains(&t.position))
            .cloned()
            .collect();
        selected_tokens.sort_by_key(|t| t.position);
        let positions: Vec<u32> = selected_tokens.iter().map(|t| t.position).collect();

        SelectionChange {
            document_id: document.document_id,
            selected: positions
                .iter()
                .map(|&p| TokenRef::new(document.document_id, sentence.sentence_id, p))
                .collect(),
            text: selected_tokens.iter().map(|t| t.text.clone()).collect(),
            context: Some(SelectionContext {
                sentence_id: sentence.sentence_id,
                sentence_body: sentence.body.clone(),
                tokens: sentence.tokens.clone(),
                selected_tokens,
                positions,
            }),
        }
    }
}

fn document_sentence(document: &Document, document_id: DocumentId, sentence_id: SentenceId) -> Option<&Sentence> {
    if document.document_id != document_id {
        return None;
    }
    document.sentence(sentence_id)
}
