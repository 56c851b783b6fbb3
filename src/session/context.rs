//! Bounded per-session conversation window

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role name as used by chat-completion APIs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Transcription confidence, present on user turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Turn {
    /// Create a user turn
    #[must_use]
    pub fn user(text: impl Into<String>, confidence: f32, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp,
            confidence: Some(confidence),
        }
    }

    /// Create an assistant turn
    #[must_use]
    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp,
            confidence: None,
        }
    }
}

/// Ordered log of the most recent turns of a session
///
/// Holds at most `capacity` turns. Pushing past capacity evicts from the
/// front, so the window always holds the newest turns in chronological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextWindow {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl ContextWindow {
    /// Create an empty window holding at most `capacity` turns
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append a turn, evicting the oldest turns beyond capacity
    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    /// Append a user turn followed by the assistant reply
    pub fn push_exchange(
        &mut self,
        user_text: &str,
        reply_text: &str,
        confidence: f32,
        at: DateTime<Utc>,
    ) {
        self.push(Turn::user(user_text, confidence, at));
        self.push(Turn::assistant(reply_text, at));
    }

    /// Maximum number of retained turns
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Iterate turns oldest-first
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Copy of all retained turns, oldest-first
    #[must_use]
    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Copy of the newest `n` turns, oldest-first
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// Mean confidence over user turns that carry one, or 0.0
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_user_confidence(&self) -> f64 {
        let scores: Vec<f64> = self
            .turns
            .iter()
            .filter(|t| t.role == Role::User)
            .filter_map(|t| t.confidence.map(f64::from))
            .collect();

        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(window: &ContextWindow) -> Vec<String> {
        window.iter().map(|t| t.text.clone()).collect()
    }

    #[test]
    fn push_keeps_chronological_order() {
        let mut window = ContextWindow::new(4);
        let now = Utc::now();
        window.push_exchange("q1", "a1", 0.9, now);
        window.push_exchange("q2", "a2", 0.8, now);

        assert_eq!(texts(&window), ["q1", "a1", "q2", "a2"]);
        assert_eq!(window.len(), 4);
    }

    #[test]
    fn truncation_evicts_oldest_first() {
        let mut window = ContextWindow::new(4);
        let now = Utc::now();
        for i in 0..5 {
            window.push_exchange(&format!("q{i}"), &format!("a{i}"), 0.9, now);
            assert!(window.len() <= 4);
        }

        assert_eq!(texts(&window), ["q3", "a3", "q4", "a4"]);
    }

    #[test]
    fn odd_capacity_drops_single_turns() {
        let mut window = ContextWindow::new(3);
        let now = Utc::now();
        window.push_exchange("q1", "a1", 0.9, now);
        window.push_exchange("q2", "a2", 0.9, now);

        assert_eq!(texts(&window), ["a1", "q2", "a2"]);
    }

    #[test]
    fn recent_returns_newest_turns() {
        let mut window = ContextWindow::new(10);
        let now = Utc::now();
        window.push_exchange("q1", "a1", 0.9, now);
        window.push_exchange("q2", "a2", 0.9, now);

        let recent = window.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "q2");
        assert_eq!(recent[1].text, "a2");
        assert_eq!(window.recent(100).len(), 4);
    }

    #[test]
    fn average_confidence_ignores_assistant_turns() {
        let mut window = ContextWindow::new(10);
        let now = Utc::now();
        window.push_exchange("q1", "a1", 0.8, now);
        window.push_exchange("q2", "a2", 1.0, now);

        let avg = window.average_user_confidence();
        assert!((avg - 0.9).abs() < 1e-6, "got {avg}");
    }

    #[test]
    fn average_confidence_empty_is_zero() {
        let window = ContextWindow::new(10);
        assert!(window.average_user_confidence().abs() < f64::EPSILON);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
