//! Indexer (§4.9): consumes ContentEvents, tokenizes extracted text, hands a
//! WebDocument to the external full-text store, and upserts the link graph
//! (PageNode + LinkEdges) into the state store.

use crate::bus::ContentEvent;
use crate::dedup::sha256_hex;
use crate::storage::{IngestionStore, SqliteStorage, StorageError};
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("full-text sink error: {0}")]
    Sink(String),
}

/// Token length bounds and cap per §4.9.
const MIN_TOKEN_LEN: usize = 3;
const MAX_TOKEN_LEN: usize = 49;
const MAX_TOKENS_PER_DOC: usize = 1000;

#[derive(Debug, Clone)]
pub struct WebDocument {
    pub url: String,
    pub url_hash: String,
    pub title: String,
    pub meta_description: Option<String>,
    pub content: String,
    pub tokens: Vec<String>,
    pub outbound_links: Vec<String>,
    pub language: String,
    pub content_hash: String,
    pub crawled_at: chrono::DateTime<chrono::Utc>,
    pub size_bytes: usize,
}

/// Contract for the external full-text store (§1 Non-goals: the inverted
/// index itself is out of scope, delegated to a store exposing indexing and
/// BM25 querying). Implementations live outside this crate in production;
/// `InMemorySink` exists for tests.
///
/// Implementations must upsert by `doc.url_hash`: a document already indexed
/// under that hash is never duplicated, and a re-index only refreshes
/// `crawled_at` on the existing entry.
pub trait FullTextSink {
    fn index_document(&mut self, doc: &WebDocument) -> Result<(), IndexError>;
}

#[derive(Default)]
pub struct InMemorySink {
    pub documents: Vec<WebDocument>,
}

impl FullTextSink for InMemorySink {
    fn index_document(&mut self, doc: &WebDocument) -> Result<(), IndexError> {
        if let Some(existing) = self
            .documents
            .iter_mut()
            .find(|existing| existing.url_hash == doc.url_hash)
        {
            existing.crawled_at = doc.crawled_at;
        } else {
            self.documents.push(doc.clone());
        }
        Ok(())
    }
}

/// Standard tokenizer: lowercase, strip non-alphanumerics, remove
/// stopwords, Porter-stem, filter by length, drop pure numerics, cap at
/// `MAX_TOKENS_PER_DOC` distinct tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let stemmer = Stemmer::create(Algorithm::English);
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();

    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() {
            continue;
        }
        let lower = raw.to_lowercase();
        if lower.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if is_stopword(&lower) {
            continue;
        }
        let stemmed = stemmer.stem(&lower).to_string();
        if stemmed.len() < MIN_TOKEN_LEN || stemmed.len() > MAX_TOKEN_LEN {
            continue;
        }
        if seen.insert(stemmed.clone()) {
            tokens.push(stemmed);
            if tokens.len() >= MAX_TOKENS_PER_DOC {
                break;
            }
        }
    }

    tokens
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
    "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

pub struct Indexer<'a, S: FullTextSink> {
    storage: &'a mut SqliteStorage,
    sink: &'a mut S,
}

impl<'a, S: FullTextSink> Indexer<'a, S> {
    pub fn new(storage: &'a mut SqliteStorage, sink: &'a mut S) -> Self {
        Self { storage, sink }
    }

    /// Idempotent by URL hash (§4.9): re-indexing the same URL is a no-op on
    /// the document body, refreshing only `crawled_at` on the sink's
    /// existing entry (see `FullTextSink::index_document`).
    pub fn index(&mut self, event: &ContentEvent) -> Result<(), IndexError> {
        let url_hash = sha256_hex(&event.url);
        let tokens = tokenize(&event.text);
        let doc = WebDocument {
            url: event.url.clone(),
            url_hash: url_hash.clone(),
            title: event.title.clone(),
            meta_description: event.meta_description.clone(),
            content: event.text.clone(),
            tokens,
            outbound_links: event.outbound_links.clone(),
            language: event.language.clone(),
            content_hash: event.content_hash.clone(),
            crawled_at: event.crawled_at,
            size_bytes: event.html_len,
        };
        self.sink.index_document(&doc)?;

        let source_id = self.storage.insert_or_get_page_node(&event.url, &url_hash)?;
        for target_url in &event.outbound_links {
            let target_hash = sha256_hex(target_url);
            let target_id = self.storage.insert_or_get_page_node(target_url, &target_hash)?;
            self.storage.insert_link_edge(source_id, target_id, None)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_stopwords_and_stems() {
        let tokens = tokenize("The running runners ran quickly through the forests");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.iter().any(|t| t.starts_with("run")));
    }

    #[test]
    fn test_tokenize_drops_numerics_and_short_tokens() {
        let tokens = tokenize("42 ab xyz a longenoughword");
        assert!(!tokens.contains(&"42".to_string()));
        assert!(!tokens.contains(&"ab".to_string()));
    }

    #[test]
    fn test_tokenize_respects_cap() {
        let text: String = (0..2000).map(|i| format!("word{} ", i)).collect();
        let tokens = tokenize(&text);
        assert!(tokens.len() <= MAX_TOKENS_PER_DOC);
    }

    fn sample_event() -> ContentEvent {
        ContentEvent {
            url: "https://a.com/".to_string(),
            title: "T".to_string(),
            meta_description: None,
            text: "hello world".to_string(),
            html_len: 100,
            outbound_links: vec!["https://b.com/".to_string()],
            status_code: 200,
            content_type: Some("text/html".to_string()),
            language: "en".to_string(),
            crawled_at: chrono::Utc::now(),
            content_hash: "abc".to_string(),
        }
    }

    #[test]
    fn test_index_writes_document_and_link_graph() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut sink = InMemorySink::default();
        let mut indexer = Indexer::new(&mut storage, &mut sink);
        indexer.index(&sample_event()).unwrap();

        assert_eq!(sink.documents.len(), 1);
        assert!(sink.documents[0].tokens.contains(&"hello".to_string()));

        let edges = storage.all_link_edges().unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_reindex_same_url_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut sink = InMemorySink::default();
        let mut indexer = Indexer::new(&mut storage, &mut sink);

        indexer.index(&sample_event()).unwrap();
        let mut second = sample_event();
        second.crawled_at = second.crawled_at + chrono::Duration::seconds(60);
        indexer.index(&second).unwrap();

        assert_eq!(sink.documents.len(), 1);
        assert_eq!(sink.documents[0].crawled_at, second.crawled_at);
    }
}
