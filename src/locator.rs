//! Token identity helpers.
//!
//! The host records where each token was painted during the last frame; the
//! functions here map screen points to [`TokenRef`]s and stable references
//! back to indices in the loaded [`Document`].

use crate::types::document::{Document, Token, TokenRef};
use egui::{Pos2, Rect};

/// One token as it was laid out on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedToken {
    pub token: TokenRef,
    pub rect: Rect,
    pub selectable: bool,
}

/// Index of a token inside `document.sentences[sentence].tokens[token]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenIndex {
    pub sentence: usize,
    pub token: usize,
}

/// Token layout for the current frame, rebuilt by the host every paint.
#[derive(Debug, Default, Clone)]
pub struct TokenLayout {
    tokens: Vec<RenderedToken>,
}

impl TokenLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    pub fn push(&mut self, token: TokenRef, rect: Rect, selectable: bool) {
        self.tokens.push(RenderedToken { token, rect, selectable });
    }

    pub fn tokens(&self) -> &[RenderedToken] {
        &self.tokens
    }

    pub fn identify(&self, point: Pos2) -> Option<TokenRef> {
        identify(&self.tokens, point)
    }
}

/// The selectable token under `point`, if any.
///
/// Later entries win when rectangles overlap, matching paint order.
pub fn identify(layout: &[RenderedToken], point: Pos2) -> Option<TokenRef> {
    layout
        .iter()
        .rev()
        .find(|r| r.rect.contains(point))
        .filter(|r| r.selectable)
        .map(|r| r.token)
}

/// Find where `(sentence_id, position)` currently lives in `document`.
///
/// Render order and stable ids can diverge after partial reloads, so this
/// searches by id rather than trusting array positions.
pub fn locate_in_document(document: &Document, token: &TokenRef) -> Option<TokenIndex> {
    if document.document_id != token.document_id {
        return None;
    }
    let sentence = document
        .sentences
        .iter()
        .position(|s| s.sentence_id == token.sentence_id)?;
    let index = document.sentences[sentence]
        .tokens
        .iter()
        .position(|t| t.position == token.position)?;
    Some(TokenIndex { sentence, token: index })
}

pub fn resolve<'a>(document: &'a Document, token: &TokenRef) -> Option<&'a Token> {
    let index = locate_in_document(document, token)?;
    document.sentences[index.sentence].tokens.get(index.token)
}

/// Positions covered by the word the token belongs to, or just the token
/// itself when it has no word-token group.
pub fn word_span(document: &Document, token: &TokenRef) -> Option<Vec<u32>> {
    let index = locate_in_document(document, token)?;
    let sentence = &document.sentences[index.sentence];
    let found = &sentence.tokens[index.token];
    let span = found
        .word_token_id
        .and_then(|id| sentence.word_token(id))
        .map(|w| {
            let mut positions = w.positions.clone();
            positions.sort_unstable();
            positions
        })
        .unwrap_or_else(|| vec![found.position]);
    Some(span)
}
