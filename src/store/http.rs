use super::{AnnotationStore, StoreError};
use crate::types::document::{DocumentId, RuleId, TokenRef, VocabId};
use crate::types::notation::{
    CreatedNotation, GrammarNotation, NewGrammarNotation, NewVocabNotation, RuleDetailRecord, VocabEntry,
    VocabExampleRecord, VocabNotation,
};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// REST client for the annotation endpoints, rooted at `api_base_url`.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base: Url,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut base =
            Url::parse(base_url).map_err(|e| StoreError::Transport(format!("invalid base url '{}': {}", base_url, e)))?;
        // `Url::join` drops the last segment unless the path ends in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, StoreError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| StoreError::Transport(format!("bad path '{}': {}", path, e)))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn send<T: DeserializeOwned>(&self, url: Url, request: RequestBuilder) -> Result<T, StoreError> {
        debug!(%url, "store request");
        let response = request.send().map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound);
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.json::<T>().map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, StoreError> {
        let url = self.url(path, query)?;
        self.send(url.clone(), self.client.get(url))
    }
}

impl AnnotationStore for HttpStore {
    fn grammar_notations(&self, document_id: DocumentId) -> Result<Vec<GrammarNotation>, StoreError> {
        self.get("notations/grammar", &[("document", document_id.to_string())])
    }

    fn vocab_notations(&self, document_id: DocumentId) -> Result<Vec<VocabNotation>, StoreError> {
        self.get("notations/vocab", &[("document", document_id.to_string())])
    }

    fn rule_detail(&self, rule_id: RuleId) -> Result<RuleDetailRecord, StoreError> {
        self.get(&format!("grammar-rule/{}", rule_id), &[])
    }

    fn vocab_entry(&self, vocab_id: VocabId) -> Result<VocabEntry, StoreError> {
        self.get(&format!("vocab/{}", vocab_id), &[])
    }

    fn example_at(&self, token: TokenRef) -> Result<Option<VocabExampleRecord>, StoreError> {
        let query = [
            ("document", token.document_id.to_string()),
            ("sentence", token.sentence_id.to_string()),
            ("token", token.position.to_string()),
        ];
        match self.get::<Option<VocabExampleRecord>>("vocab-example", &query) {
            Err(StoreError::NotFound) => Ok(None),
            other => other,
        }
    }

    fn create_vocab_notation(&self, request: &NewVocabNotation) -> Result<CreatedNotation, StoreError> {
        let url = self.url("notations/vocab", &[])?;
        self.send(url.clone(), self.client.post(url).json(request))
    }

    fn create_grammar_notation(&self, request: &NewGrammarNotation) -> Result<CreatedNotation, StoreError> {
        let url = self.url("notations/grammar", &[])?;
        self.send(url.clone(), self.client.post(url).json(request))
    }
}
