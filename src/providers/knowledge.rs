//! In-memory knowledge base retrieval
//!
//! Company policies, FAQs and per-user notes are held in memory and ranked
//! by token overlap with the query. Tags weigh more than body text.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Retriever;
use crate::Result;
use crate::session::{Role, Turn};

/// Tokens shorter than this are ignored when scoring
const MIN_TOKEN_LEN: usize = 3;
const TAG_WEIGHT: usize = 3;
/// Recent user turns folded into the query
const HISTORY_TURNS: usize = 2;

/// Kind of knowledge entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    Policy,
    Faq,
    UserInfo,
}

impl KnowledgeKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Policy => "Company Policy",
            Self::Faq => "FAQ",
            Self::UserInfo => "User Info",
        }
    }
}

/// One knowledge base entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub kind: KnowledgeKind,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: String,
    /// Owner of a `user_info` entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

fn default_category() -> String {
    "general".to_string()
}

/// On-disk knowledge base layout
///
/// ```toml
/// [[entries]]
/// kind = "faq"
/// title = "Refunds"
/// tags = ["refund", "money back"]
/// content = "Q: Can I get a refund?\nA: Within 30 days of purchase."
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct KnowledgeBaseFile {
    #[serde(default)]
    pub entries: Vec<KnowledgeEntry>,
}

/// Retrieves context from an in-memory knowledge base
#[derive(Default)]
pub struct KnowledgeBaseRetriever {
    entries: RwLock<Vec<KnowledgeEntry>>,
}

impl KnowledgeBaseRetriever {
    #[must_use]
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Load a knowledge base from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: KnowledgeBaseFile = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            entries = file.entries.len(),
            "loaded knowledge base"
        );
        Ok(Self::new(file.entries))
    }

    pub fn add(&self, entry: KnowledgeEntry) {
        tracing::debug!(kind = ?entry.kind, title = %entry.title, "adding knowledge entry");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Add a company policy
    pub fn add_policy(&self, title: &str, content: &str, category: &str) {
        self.add(KnowledgeEntry {
            kind: KnowledgeKind::Policy,
            title: title.to_string(),
            category: category.to_string(),
            tags: Vec::new(),
            content: content.to_string(),
            user_id: None,
        });
    }

    /// Add a question and answer pair
    pub fn add_faq(&self, question: &str, answer: &str, category: &str) {
        self.add(KnowledgeEntry {
            kind: KnowledgeKind::Faq,
            title: question.to_string(),
            category: category.to_string(),
            tags: Vec::new(),
            content: format!("Q: {question}\nA: {answer}"),
            user_id: None,
        });
    }

    /// Add a note visible only to one user's queries
    pub fn add_user_info(&self, user_id: &str, information: &str, info_type: &str) {
        self.add(KnowledgeEntry {
            kind: KnowledgeKind::UserInfo,
            title: info_type.to_string(),
            category: info_type.to_string(),
            tags: Vec::new(),
            content: information.to_string(),
            user_id: Some(user_id.to_string()),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank entries of one kind, best first, dropping entries with no overlap
    fn rank<'a>(
        entries: &'a [KnowledgeEntry],
        kind: KnowledgeKind,
        user_id: Option<&str>,
        query: &HashSet<String>,
        limit: usize,
    ) -> Vec<&'a KnowledgeEntry> {
        let mut scored: Vec<(usize, &KnowledgeEntry)> = entries
            .iter()
            .filter(|e| e.kind == kind)
            .filter(|e| kind != KnowledgeKind::UserInfo || e.user_id.as_deref() == user_id)
            .map(|e| (score(e, query), e))
            .filter(|(s, _)| *s > 0)
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, e)| e).collect()
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

fn score(entry: &KnowledgeEntry, query: &HashSet<String>) -> usize {
    let body = tokenize(&format!("{} {}", entry.title, entry.content));
    let tags: HashSet<String> = entry.tags.iter().flat_map(|t| tokenize(t)).collect();

    let body_hits = query.iter().filter(|t| body.contains(*t)).count();
    let tag_hits = query.iter().filter(|t| tags.contains(*t)).count();
    body_hits + tag_hits * TAG_WEIGHT
}

#[async_trait]
impl Retriever for KnowledgeBaseRetriever {
    fn name(&self) -> &'static str {
        "knowledge-base"
    }

    async fn retrieve_context(
        &self,
        query: &str,
        user_id: Option<&str>,
        history: &[Turn],
        max_results: usize,
    ) -> Result<String> {
        let mut tokens = tokenize(query);
        let recent_user = history
            .iter()
            .rev()
            .filter(|t| t.role == Role::User)
            .take(HISTORY_TURNS);
        for turn in recent_user {
            tokens.extend(tokenize(&turn.text));
        }

        if tokens.is_empty() || max_results == 0 {
            return Ok(String::new());
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let per_kind = max_results.min(3);
        let mut selected = Self::rank(&entries, KnowledgeKind::Policy, None, &tokens, per_kind);
        selected.extend(Self::rank(&entries, KnowledgeKind::Faq, None, &tokens, per_kind));
        if let Some(user) = user_id {
            selected.extend(Self::rank(
                &entries,
                KnowledgeKind::UserInfo,
                Some(user),
                &tokens,
                max_results.min(2),
            ));
        }

        let found = selected.len();
        let context = selected
            .into_iter()
            .take(max_results)
            .map(|e| format!("{}: {}", e.kind.label(), e.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        tracing::debug!(found, returned = found.min(max_results), "retrieved knowledge context");
        Ok(context)
    }

    async fn health_check(&self) -> bool {
        !self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> KnowledgeBaseRetriever {
        let kb = KnowledgeBaseRetriever::default();
        kb.add_policy(
            "Refund policy",
            "Refunds are issued within 30 days of purchase.",
            "billing",
        );
        kb.add_policy("Support hours", "Support is available 9am to 5pm.", "general");
        kb.add_faq(
            "How do I reset my password?",
            "Use the forgot password link on the login page.",
            "account",
        );
        kb.add_user_info("user-1", "Premium plan, renews every March.", "plan");
        kb.add_user_info("user-2", "Basic plan, renews monthly.", "plan");
        kb
    }

    #[tokio::test]
    async fn matches_policy_by_content() {
        let kb = sample();
        let context = kb
            .retrieve_context("can I get a refund for my purchase", None, &[], 5)
            .await
            .unwrap();

        assert_eq!(
            context,
            "Company Policy: Refunds are issued within 30 days of purchase."
        );
    }

    #[tokio::test]
    async fn faq_and_policy_sections_are_prefixed_in_order() {
        let kb = sample();
        kb.add_policy("Password rules", "Passwords must be 12 characters.", "security");

        let context = kb
            .retrieve_context("I need to reset my password", None, &[], 5)
            .await
            .unwrap();

        let parts: Vec<_> = context.split("\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("Company Policy: Passwords"));
        assert!(parts[1].starts_with("FAQ: Q: How do I reset my password?"));
    }

    #[tokio::test]
    async fn user_info_is_scoped_to_user() {
        let kb = sample();

        let anonymous = kb.retrieve_context("when does my plan renew", None, &[], 5).await.unwrap();
        assert!(anonymous.is_empty());

        let scoped = kb
            .retrieve_context("when does my plan renew", Some("user-1"), &[], 5)
            .await
            .unwrap();
        assert_eq!(scoped, "User Info: Premium plan, renews every March.");
    }

    #[tokio::test]
    async fn respects_max_results() {
        let kb = KnowledgeBaseRetriever::default();
        for i in 0..5 {
            kb.add_policy(&format!("Billing {i}"), "Billing details.", "billing");
            kb.add_faq(&format!("Billing question {i}"), "Billing answer.", "billing");
        }

        let context = kb.retrieve_context("billing", None, &[], 4).await.unwrap();
        let parts: Vec<_> = context.split("\n\n").collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.iter().filter(|p| p.starts_with("Company Policy")).count(), 3);
    }

    #[tokio::test]
    async fn history_biases_query() {
        let kb = sample();
        let history = vec![Turn::user("I was asking about a refund", 0.9, Utc::now())];

        let context = kb.retrieve_context("how long", None, &history, 5).await.unwrap();
        assert!(context.contains("Refunds are issued"));
    }

    #[tokio::test]
    async fn no_overlap_is_empty_context() {
        let kb = sample();
        let context = kb.retrieve_context("zebra", None, &[], 5).await.unwrap();
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn tags_outrank_body_mentions() {
        let kb = KnowledgeBaseRetriever::new(vec![
            KnowledgeEntry {
                kind: KnowledgeKind::Faq,
                title: "Shipping".to_string(),
                category: "general".to_string(),
                tags: vec![],
                content: "Delivery takes a week, invoices are emailed.".to_string(),
                user_id: None,
            },
            KnowledgeEntry {
                kind: KnowledgeKind::Faq,
                title: "Billing".to_string(),
                category: "billing".to_string(),
                tags: vec!["invoice".to_string(), "invoices".to_string()],
                content: "Download statements from the dashboard.".to_string(),
                user_id: None,
            },
        ]);

        let context = kb.retrieve_context("where are my invoices", None, &[], 1).await.unwrap();
        assert!(context.contains("Download statements"));
    }

    #[test]
    fn parses_toml_file() {
        let file: KnowledgeBaseFile = toml::from_str(
            r#"
            [[entries]]
            kind = "policy"
            title = "Refunds"
            tags = ["refund"]
            content = "Within 30 days."

            [[entries]]
            kind = "user_info"
            user_id = "u1"
            content = "VIP customer."
            "#,
        )
        .unwrap();

        assert_eq!(file.entries.len(), 2);
        assert_eq!(file.entries[0].kind, KnowledgeKind::Policy);
        assert_eq!(file.entries[0].category, "general");
        assert_eq!(file.entries[1].user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn health_reflects_contents() {
        assert!(!KnowledgeBaseRetriever::default().health_check().await);
        assert!(sample().health_check().await);
    }
}
