//! Knowledge-base retrieval capability.
//!
//! The knowledge handler only needs ranked `{content, similarity}` pairs.
//! [`InMemoryKnowledgeBase`] scores a document by the share of the query's
//! words it contains, which is enough for a small corpus of help articles on
//! disk. Article length does not dilute the score.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("failed to read knowledge documents from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("knowledge search unavailable: {0}")]
    Unavailable(String),
}

/// A retrieved document with its similarity score in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RetrievedDocument {
    pub source: String,
    pub content: String,
    pub similarity: f32,
}

/// Semantic retrieval over support documentation
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Up to `k` documents, most similar first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, KnowledgeError>;
}

#[derive(Debug, Clone)]
struct Document {
    source: String,
    content: String,
    terms: HashSet<String>,
}

/// Word-overlap retrieval over documents held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryKnowledgeBase {
    documents: Vec<Document>,
    min_similarity: f32,
}

impl InMemoryKnowledgeBase {
    pub fn new(min_similarity: f32) -> Self {
        Self {
            documents: Vec::new(),
            min_similarity,
        }
    }

    pub fn with_document(mut self, source: impl Into<String>, content: impl Into<String>) -> Self {
        self.add_document(source, content);
        self
    }

    pub fn add_document(&mut self, source: impl Into<String>, content: impl Into<String>) {
        let content = content.into();
        self.documents.push(Document {
            source: source.into(),
            terms: terms(&content),
            content,
        });
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Load every `*.md` and `*.txt` file in `dir`; a missing directory gives an empty base
    pub fn load_dir(dir: &Path, min_similarity: f32) -> Result<Self, KnowledgeError> {
        let mut kb = Self::new(min_similarity);
        if !dir.exists() {
            debug!(path = %dir.display(), "knowledge directory missing; starting empty");
            return Ok(kb);
        }

        let io_err = |source| KnowledgeError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("md" | "txt")
                )
            })
            .collect();
        paths.sort();

        for path in paths {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let source = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or_default()
                        .to_string();
                    kb.add_document(source, content);
                }
                Err(e) => warn!("Skipping unreadable knowledge document {:?}: {}", path, e),
            }
        }

        debug!(documents = kb.len(), "loaded knowledge documents");
        Ok(kb)
    }
}

// Words too common in support questions to say anything about the topic
const STOP_WORDS: &[&str] = &[
    "about", "and", "are", "can", "does", "for", "from", "get", "has", "have", "how", "into",
    "need", "not", "please", "that", "the", "this", "what", "when", "where", "who", "why", "with",
    "want", "you", "your",
];

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Fraction of the query's terms found in the document
fn similarity(query: &HashSet<String>, document: &HashSet<String>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    query.intersection(document).count() as f32 / query.len() as f32
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, KnowledgeError> {
        let query_terms = terms(query);

        let mut scored: Vec<RetrievedDocument> = self
            .documents
            .iter()
            .map(|doc| RetrievedDocument {
                source: doc.source.clone(),
                content: doc.content.clone(),
                similarity: similarity(&query_terms, &doc.terms),
            })
            .filter(|doc| doc.similarity > 0.0 && doc.similarity >= self.min_similarity)
            .collect();

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn kb() -> InMemoryKnowledgeBase {
        InMemoryKnowledgeBase::new(0.0)
            .with_document(
                "vpn.md",
                "To connect to the VPN, open the client and sign in with your company account.",
            )
            .with_document(
                "printer.md",
                "Printers on floor three are managed by facilities; add them from settings.",
            )
    }

    #[tokio::test]
    async fn test_search_ranks_relevant_first() {
        let results = kb().search("how do I connect to the vpn", 3).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].source, "vpn.md");
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn test_search_respects_k_and_threshold() {
        let results = kb().search("vpn printers settings company", 1).await.unwrap();
        assert_eq!(results.len(), 1);

        let strict = InMemoryKnowledgeBase::new(0.9).with_document("a.md", "vpn client setup");
        let results = strict.search("vpn password", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_long_article_passes_default_threshold() {
        let article = "Connecting to the VPN from home. Install the company VPN client from the \
            software portal, then open it and choose the Head Office gateway. Sign in with your \
            company account and approve the push notification on your phone. If the connection \
            drops every few minutes, switch from wifi to a wired network, restart the client and \
            make sure your laptop clock is correct. Split tunnelling is disabled, so all traffic \
            goes through the office while connected. Disconnect when you finish working so other \
            staff can use the licence. Contact the helpdesk if the client reports an expired \
            certificate or if your account is locked after several failed attempts.";
        let printers = "Printers on floor three are managed by facilities; add them from settings.";

        let min_similarity = crate::config::Config::default().knowledge.min_similarity;
        let kb = InMemoryKnowledgeBase::new(min_similarity)
            .with_document("printers.md", printers)
            .with_document("vpn-from-home.md", article);

        let results = kb
            .search("How do I connect to the VPN from home?", 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "vpn-from-home.md");
        assert!(results[0].similarity >= min_similarity);
    }

    #[tokio::test]
    async fn test_stop_words_alone_match_nothing() {
        let results = kb().search("how do I get the", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_no_overlap() {
        let results = kb().search("zzz qqq", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_load_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("email.md"), "Email setup guide").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "Wifi password rotation").unwrap();
        std::fs::write(temp_dir.path().join("image.png"), "binary").unwrap();

        let kb = InMemoryKnowledgeBase::load_dir(temp_dir.path(), 0.1).unwrap();
        assert_eq!(kb.len(), 2);
    }

    #[test]
    fn test_load_missing_dir() {
        let kb = InMemoryKnowledgeBase::load_dir(Path::new("/nonexistent/helpdesk-kb"), 0.1)
            .unwrap();
        assert!(kb.is_empty());
    }
}
