//*** START FILE: src/types/notation.rs ***//
use crate::parsing::explanation::{explanation_from_value, Explanation};
use crate::types::document::{DocumentId, RuleId, SentenceId, TokenRef, VocabId, WordTokenId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GrammarNotation {
    #[serde(default)]
    pub notation_id: Option<u64>,
    pub document_id: DocumentId,
    pub sentence_id: SentenceId,
    pub rule_id: RuleId,
    #[serde(default)]
    pub marked_positions: Vec<u32>,
}

/// Identity under which two grammar notations are the same notation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrammarKey {
    pub document_id: DocumentId,
    pub sentence_id: SentenceId,
    pub rule_id: RuleId,
    pub positions: Vec<u32>,
}

impl GrammarNotation {
    pub fn key(&self) -> GrammarKey {
        let mut positions = self.marked_positions.clone();
        positions.sort_unstable();
        positions.dedup();
        GrammarKey {
            document_id: self.document_id,
            sentence_id: self.sentence_id,
            rule_id: self.rule_id,
            positions,
        }
    }

    pub fn marks(&self, position: u32) -> bool {
        self.marked_positions.contains(&position)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WordTokenRef {
    pub word_token_id: WordTokenId,
    pub positions: Vec<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VocabNotation {
    #[serde(default)]
    pub notation_id: Option<u64>,
    pub document_id: DocumentId,
    pub sentence_id: SentenceId,
    pub token_position: u32,
    pub vocab_id: VocabId,
    #[serde(default)]
    pub word_token: Option<WordTokenRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VocabKey {
    pub document_id: DocumentId,
    pub sentence_id: SentenceId,
    pub vocab_id: VocabId,
    pub token_position: u32,
}

impl VocabNotation {
    pub fn key(&self) -> VocabKey {
        VocabKey {
            document_id: self.document_id,
            sentence_id: self.sentence_id,
            vocab_id: self.vocab_id,
            token_position: self.token_position,
        }
    }

    pub fn token_ref(&self) -> TokenRef {
        TokenRef::new(self.document_id, self.sentence_id, self.token_position)
    }

    /// True when the notation's word-token group covers `position`.
    pub fn word_token_contains(&self, position: u32) -> bool {
        self.word_token
            .as_ref()
            .is_some_and(|w| w.positions.contains(&position))
    }
}

/// Body of `POST notations/vocab`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewVocabNotation {
    pub document_id: DocumentId,
    pub sentence_id: SentenceId,
    pub token_position: u32,
    pub vocab_id: VocabId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_token: Option<WordTokenRef>,
}

impl NewVocabNotation {
    pub fn token_ref(&self) -> TokenRef {
        TokenRef::new(self.document_id, self.sentence_id, self.token_position)
    }

    /// The notation as it will exist once the store has assigned an id.
    pub fn into_notation(self, notation_id: Option<u64>) -> VocabNotation {
        VocabNotation {
            notation_id,
            document_id: self.document_id,
            sentence_id: self.sentence_id,
            token_position: self.token_position,
            vocab_id: self.vocab_id,
            word_token: self.word_token,
        }
    }
}

/// Body of `POST notations/grammar`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewGrammarNotation {
    pub document_id: DocumentId,
    pub sentence_id: SentenceId,
    pub rule_id: RuleId,
    #[serde(default)]
    pub marked_positions: Vec<u32>,
}

impl NewGrammarNotation {
    pub fn into_notation(self, notation_id: Option<u64>) -> GrammarNotation {
        GrammarNotation {
            notation_id,
            document_id: self.document_id,
            sentence_id: self.sentence_id,
            rule_id: self.rule_id,
            marked_positions: self.marked_positions,
        }
    }
}

/// What the store answers to a create call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreatedNotation {
    pub notation_id: u64,
}

// --- Wire payloads ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RuleDetailRecord {
    pub rule_id: RuleId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub explanation: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VocabExampleRecord {
    pub document_id: DocumentId,
    pub sentence_id: SentenceId,
    #[serde(default)]
    pub token_position: Option<u32>,
    #[serde(default)]
    pub context_explanation: Value,
    #[serde(default)]
    pub original_sentence: Option<String>,
    #[serde(default)]
    pub vocab_id: Option<VocabId>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VocabEntry {
    pub vocab_id: VocabId,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub examples: Vec<VocabExampleRecord>,
}

impl VocabEntry {
    /// The example recorded for this sentence, falling back to the first one.
    pub fn example_for(&self, document_id: DocumentId, sentence_id: SentenceId) -> Option<&VocabExampleRecord> {
        self.examples
            .iter()
            .find(|e| e.document_id == document_id && e.sentence_id == sentence_id)
            .or_else(|| self.examples.first())
    }
}

// --- Normalized, cached forms ---

#[derive(Debug, Clone, PartialEq)]
pub struct GrammarRuleDetail {
    pub rule_id: RuleId,
    pub name: String,
    pub explanation: Explanation,
}

impl From<RuleDetailRecord> for GrammarRuleDetail {
    fn from(record: RuleDetailRecord) -> Self {
        Self {
            rule_id: record.rule_id,
            name: record.name,
            explanation: explanation_from_value(&record.explanation),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VocabExample {
    pub vocab_id: Option<VocabId>,
    pub headword: Option<String>,
    pub document_id: DocumentId,
    pub sentence_id: SentenceId,
    pub token_position: Option<u32>,
    pub explanation: Explanation,
    pub original_sentence: Option<String>,
}

impl VocabExample {
    pub fn from_entry(entry: &VocabEntry, record: &VocabExampleRecord) -> Self {
        Self {
            vocab_id: Some(entry.vocab_id),
            headword: Some(entry.body.clone()).filter(|b| !b.is_empty()),
            ..Self::from_record(record)
        }
    }

    pub fn from_record(record: &VocabExampleRecord) -> Self {
        Self {
            vocab_id: record.vocab_id,
            headword: None,
            document_id: record.document_id,
            sentence_id: record.sentence_id,
            token_position: record.token_position,
            explanation: explanation_from_value(&record.context_explanation),
            original_sentence: record.original_sentence.clone(),
        }
    }
}
//*** END FILE: src/types/notation.rs ***//
