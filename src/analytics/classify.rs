//! Keyword-based labelling of caller messages

use serde::{Deserialize, Serialize};

/// What the caller is trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BillingInquiry,
    TechnicalSupport,
    AccountAccess,
    ProductInformation,
    Cancellation,
    Complaint,
    Compliment,
    GeneralQuestion,
}

/// Intents in tie-break order
const INTENT_KEYWORDS: [(Intent, &[&str]); 8] = [
    (
        Intent::BillingInquiry,
        &["bill", "charge", "payment", "invoice", "cost", "price", "fee"],
    ),
    (
        Intent::TechnicalSupport,
        &["not working", "error", "problem", "issue", "broken", "fix", "help"],
    ),
    (
        Intent::AccountAccess,
        &["login", "password", "account", "access", "locked", "reset"],
    ),
    (
        Intent::ProductInformation,
        &["what is", "how does", "features", "benefits", "compare"],
    ),
    (
        Intent::Cancellation,
        &["cancel", "unsubscribe", "terminate", "end", "stop"],
    ),
    (
        Intent::Complaint,
        &["angry", "frustrated", "disappointed", "terrible", "awful", "bad"],
    ),
    (
        Intent::Compliment,
        &["great", "excellent", "amazing", "wonderful", "love", "perfect"],
    ),
    (
        Intent::GeneralQuestion,
        &["question", "ask", "wondering", "curious", "information"],
    ),
];

impl Intent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BillingInquiry => "billing_inquiry",
            Self::TechnicalSupport => "technical_support",
            Self::AccountAccess => "account_access",
            Self::ProductInformation => "product_information",
            Self::Cancellation => "cancellation",
            Self::Complaint => "complaint",
            Self::Compliment => "compliment",
            Self::GeneralQuestion => "general_question",
        }
    }
}

/// Broad topic of a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AccountManagement,
    BillingPayment,
    TechnicalIssues,
    ProductFeatures,
    ServiceInquiry,
    Other,
}

const CATEGORY_KEYWORDS: [(Category, &[&str]); 5] = [
    (
        Category::AccountManagement,
        &["account", "profile", "settings", "personal"],
    ),
    (
        Category::BillingPayment,
        &["bill", "payment", "charge", "invoice", "cost"],
    ),
    (
        Category::TechnicalIssues,
        &["error", "problem", "not working", "broken", "issue"],
    ),
    (
        Category::ProductFeatures,
        &["feature", "how to", "what is", "can i", "does it"],
    ),
    (
        Category::ServiceInquiry,
        &["service", "support", "help", "assistance"],
    ),
];

impl Category {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccountManagement => "account_management",
            Self::BillingPayment => "billing_payment",
            Self::TechnicalIssues => "technical_issues",
            Self::ProductFeatures => "product_features",
            Self::ServiceInquiry => "service_inquiry",
            Self::Other => "other",
        }
    }
}

const POSITIVE_WORDS: [&str; 5] = ["thank", "great", "good", "helpful", "perfect"];
const NEGATIVE_WORDS: [&str; 5] = ["bad", "terrible", "awful", "frustrated", "angry"];

/// Label with the most keyword hits; earlier labels win ties
///
/// Keywords match as substrings, so "billing" counts for "bill".
fn best_match<T: Copy>(table: &[(T, &[&str])], message: &str, default: T) -> T {
    let mut best = (default, 0);
    for (label, keywords) in table {
        let score = keywords.iter().filter(|k| message.contains(*k)).count();
        if score > best.1 {
            best = (*label, score);
        }
    }
    best.0
}

/// Classify a lower-cased message by intent
#[must_use]
pub fn classify_intent(message: &str) -> Intent {
    best_match(&INTENT_KEYWORDS, message, Intent::GeneralQuestion)
}

/// Categorize a lower-cased message
#[must_use]
pub fn categorize(message: &str) -> Category {
    best_match(&CATEGORY_KEYWORDS, message, Category::Other)
}

/// Question prefix used to group similar questions
///
/// Punctuation is stripped and the first three words joined; shorter
/// messages have no pattern.
#[must_use]
pub fn question_pattern(message: &str) -> Option<String> {
    let normalized: String = message
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    let words: Vec<&str> = normalized.split_whitespace().take(3).collect();
    (words.len() == 3).then(|| words.join(" "))
}

/// Satisfaction signals in one message, each counted at most once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sentiment {
    pub positive: bool,
    pub negative: bool,
}

#[must_use]
pub fn sentiment(message: &str) -> Sentiment {
    Sentiment {
        positive: POSITIVE_WORDS.iter().any(|w| message.contains(w)),
        negative: NEGATIVE_WORDS.iter().any(|w| message.contains(w)),
    }
}
