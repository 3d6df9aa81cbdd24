//*** START FILE: src/types/document.rs ***//
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(DocumentId);
id_type!(SentenceId);
id_type!(RuleId);
id_type!(VocabId);
id_type!(WordTokenId);

/// Stable identity of one token: (document, sentence, position).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenRef {
    pub document_id: DocumentId,
    pub sentence_id: SentenceId,
    pub position: u32,
}

impl TokenRef {
    pub fn new(document_id: DocumentId, sentence_id: SentenceId, position: u32) -> Self {
        Self { document_id, sentence_id, position }
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.document_id, self.sentence_id, self.position)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Token {
    pub position: u32,
    pub text: String,
    #[serde(default = "default_selectable")]
    pub selectable: bool,
    #[serde(default)]
    pub word_token_id: Option<WordTokenId>,
}

fn default_selectable() -> bool {
    true
}

/// Contiguous token positions that form one lexical word (languages without
/// whitespace segmentation).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WordToken {
    pub word_token_id: WordTokenId,
    pub positions: Vec<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Sentence {
    pub sentence_id: SentenceId,
    pub body: String,
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub word_tokens: Vec<WordToken>,
}

impl Sentence {
    pub fn token(&self, position: u32) -> Option<&Token> {
        self.tokens.iter().find(|t| t.position == position)
    }

    pub fn word_token(&self, id: WordTokenId) -> Option<&WordToken> {
        self.word_tokens.iter().find(|w| w.word_token_id == id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub document_id: DocumentId,
    #[serde(default)]
    pub title: String,
    pub sentences: Vec<Sentence>,
}

impl Document {
    pub fn sentence(&self, sentence_id: SentenceId) -> Option<&Sentence> {
        self.sentences.iter().find(|s| s.sentence_id == sentence_id)
    }
}
//*** END FILE: src/types/document.rs ***//
