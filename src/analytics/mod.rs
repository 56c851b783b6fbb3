//! Call analytics
//!
//! The engine keeps append-only logs of finished calls, the caller messages
//! within them, and pipeline errors. Every report is computed from those logs
//! on demand; there are no running counters.

mod classify;
mod report;

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;

pub use classify::{
    Category, Intent, Sentiment, categorize, classify_intent, question_pattern, sentiment,
};
pub use report::{
    CallAnalytics, CommonQuestions, DailyCalls, DailyDuration, DailyInteractions, ErrorAnalytics,
    ErrorRecord, LabelCount, Overview, Performance, QuestionPattern, Trends,
};

use crate::session::{Role, SessionExport, SessionStatus};

/// Days covered by trend series
const TREND_DAYS: i64 = 30;
const MAX_EXAMPLES: usize = 3;
const RECENT_ERRORS: usize = 10;
/// Satisfaction reported when no message carries a signal
const NEUTRAL_SATISFACTION: f64 = 75.0;

/// One caller message derived from a recorded call
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Lower-cased, trimmed message
    pub text: String,
    pub intent: Intent,
    pub category: Category,
    pub confidence: f32,
}

#[derive(Default)]
struct Logs {
    calls: Vec<SessionExport>,
    interactions: Vec<InteractionRecord>,
    errors: Vec<ErrorRecord>,
}

/// Best-effort analytics over finished calls
#[derive(Default)]
pub struct AnalyticsEngine {
    logs: RwLock<Logs>,
}

impl AnalyticsEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Logs> {
        self.logs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Logs> {
        self.logs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a finished call and the caller messages within it
    pub fn record_call(&self, call: &SessionExport) {
        let interactions: Vec<InteractionRecord> = call
            .turns
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| {
                let text = t.text.trim().to_lowercase();
                InteractionRecord {
                    session_id: call.session_id.clone(),
                    timestamp: t.timestamp,
                    intent: classify_intent(&text),
                    category: categorize(&text),
                    confidence: t.confidence.unwrap_or(1.0),
                    text,
                }
            })
            .collect();

        let count = interactions.len();
        {
            let mut logs = self.write();
            logs.calls.push(call.clone());
            logs.interactions.extend(interactions);
        }

        tracing::info!(
            session = %call.session_id,
            status = %call.status,
            interactions = count,
            "recorded call"
        );
    }

    /// Append to the error log
    pub fn log_error(&self, kind: &str, message: &str, session_id: Option<&str>) {
        self.write().errors.push(ErrorRecord {
            timestamp: Utc::now(),
            kind: kind.to_string(),
            message: message.to_string(),
            session_id: session_id.map(str::to_string),
        });
        tracing::debug!(kind, "logged error");
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.read().calls.len()
    }

    #[must_use]
    pub fn interaction_count(&self) -> usize {
        self.read().interactions.len()
    }

    /// Aggregate call analytics as of now
    #[must_use]
    pub fn call_analytics(&self) -> CallAnalytics {
        self.call_analytics_at(Utc::now())
    }

    /// Aggregate call analytics relative to `now`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn call_analytics_at(&self, now: DateTime<Utc>) -> CallAnalytics {
        let logs = self.read();
        let calls = &logs.calls;
        if calls.is_empty() {
            return CallAnalytics::default();
        }

        let total = calls.len();
        let today = now.date_naive();
        let week_ago = now - Duration::days(7);
        let month_ago = now - Duration::days(30);

        let ended = calls.iter().filter(|c| c.status == SessionStatus::Ended).count();
        let errored = calls.iter().filter(|c| c.status == SessionStatus::Error).count();

        let mut hourly: BTreeMap<u32, usize> = BTreeMap::new();
        for call in calls {
            *hourly.entry(call.started_at.hour()).or_default() += 1;
        }
        // BTreeMap iterates ascending, so the smallest hour wins ties
        let peak_hour = hourly
            .iter()
            .fold((0, 0), |best, (&hour, &count)| {
                if count > best.1 { (hour, count) } else { best }
            })
            .0;

        let overview = Overview {
            total_calls: total,
            calls_today: calls
                .iter()
                .filter(|c| c.started_at.date_naive() == today)
                .count(),
            calls_this_week: calls.iter().filter(|c| c.started_at >= week_ago).count(),
            calls_this_month: calls.iter().filter(|c| c.started_at >= month_ago).count(),
            average_duration: round2(mean(calls.iter().map(|c| c.duration_secs))),
            average_interactions: round2(mean(
                calls.iter().map(|c| c.total_interactions as f64),
            )),
            success_rate: round2(ended as f64 / total as f64 * 100.0),
            peak_hour,
        };

        let by_day = group_by_day(calls);
        let days = trend_days(today);
        let trends = Trends {
            daily_calls: days
                .iter()
                .map(|&date| DailyCalls {
                    date,
                    calls: by_day.get(&date).map_or(0, Vec::len),
                })
                .collect(),
            hourly_distribution: hourly,
            duration_trend: days
                .iter()
                .map(|&date| DailyDuration {
                    date,
                    average_duration: round2(mean(
                        by_day.get(&date).into_iter().flatten().map(|c| c.duration_secs),
                    )),
                })
                .collect(),
            interaction_trend: days
                .iter()
                .map(|&date| DailyInteractions {
                    date,
                    average_interactions: round2(mean(
                        by_day
                            .get(&date)
                            .into_iter()
                            .flatten()
                            .map(|c| c.total_interactions as f64),
                    )),
                })
                .collect(),
        };

        let performance = Performance {
            average_response_time: round2(
                mean(
                    calls
                        .iter()
                        .flat_map(|c| c.response_times_ms.iter())
                        .map(|&ms| ms as f64),
                ) / 1000.0,
            ),
            error_rate: round2(errored as f64 / total as f64 * 100.0),
            user_satisfaction: satisfaction(&logs.interactions),
        };

        CallAnalytics {
            overview,
            trends,
            performance,
        }
    }

    /// Most frequent question patterns with label distributions
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn common_questions(&self, limit: usize) -> CommonQuestions {
        let logs = self.read();
        let interactions = &logs.interactions;
        if interactions.is_empty() {
            return CommonQuestions::default();
        }

        // Insertion-ordered tallies so equal counts keep first-seen order
        let mut patterns: Vec<(String, usize, Vec<String>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in interactions {
            let Some(pattern) = question_pattern(&record.text) else {
                continue;
            };
            let slot = *index.entry(pattern.clone()).or_insert_with(|| {
                patterns.push((pattern, 0, Vec::new()));
                patterns.len() - 1
            });
            let entry = &mut patterns[slot];
            entry.1 += 1;
            if entry.2.len() < MAX_EXAMPLES {
                entry.2.push(record.text.clone());
            }
        }
        patterns.sort_by(|a, b| b.1.cmp(&a.1));

        let total = interactions.len();
        let common_patterns = patterns
            .into_iter()
            .take(limit)
            .map(|(pattern, count, examples)| QuestionPattern {
                pattern,
                count,
                percentage: round2(count as f64 / total as f64 * 100.0),
                examples,
            })
            .collect();

        CommonQuestions {
            common_patterns,
            intent_distribution: distribution(interactions.iter().map(|r| r.intent)),
            category_distribution: distribution(interactions.iter().map(|r| r.category)),
            total_questions: total,
        }
    }

    /// Error counts by kind and the most recent errors
    #[must_use]
    pub fn error_analytics(&self) -> ErrorAnalytics {
        let logs = self.read();

        let mut error_types: BTreeMap<String, usize> = BTreeMap::new();
        for error in &logs.errors {
            *error_types.entry(error.kind.clone()).or_default() += 1;
        }

        let mut recent: Vec<ErrorRecord> = logs.errors.clone();
        // Stable sort, later appends win equal timestamps after the reverse
        recent.reverse();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(RECENT_ERRORS);

        ErrorAnalytics {
            total_errors: logs.errors.len(),
            error_types,
            recent_errors: recent,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean of the values, or 0.0 when there are none
#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0_usize), |(s, n), v| (s + v, n + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn group_by_day(calls: &[SessionExport]) -> HashMap<NaiveDate, Vec<&SessionExport>> {
    let mut days: HashMap<NaiveDate, Vec<&SessionExport>> = HashMap::new();
    for call in calls {
        days.entry(call.started_at.date_naive()).or_default().push(call);
    }
    days
}

/// The last `TREND_DAYS` dates ending at `today`, oldest first
fn trend_days(today: NaiveDate) -> Vec<NaiveDate> {
    (0..TREND_DAYS)
        .rev()
        .map(|offset| today - Duration::days(offset))
        .collect()
}

/// Label counts, most frequent first, ties in first-seen order
fn distribution<T: Copy + PartialEq>(labels: impl Iterator<Item = T>) -> Vec<LabelCount<T>> {
    let mut counts: Vec<LabelCount<T>> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|c| c.label == label) {
            Some(entry) => entry.count += 1,
            None => counts.push(LabelCount { label, count: 1 }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Share of satisfaction signals that are positive, as a percentage
#[allow(clippy::cast_precision_loss)]
fn satisfaction(interactions: &[InteractionRecord]) -> f64 {
    if interactions.is_empty() {
        return 0.0;
    }

    let (positive, negative) = interactions
        .iter()
        .map(|r| sentiment(&r.text))
        .fold((0_usize, 0_usize), |(p, n), s| {
            (p + usize::from(s.positive), n + usize::from(s.negative))
        });

    if positive + negative == 0 {
        return NEUTRAL_SATISFACTION;
    }
    round2(positive as f64 / (positive + negative) as f64 * 100.0)
}
