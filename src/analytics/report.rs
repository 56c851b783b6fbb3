//! Analytics report shapes

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::classify::{Category, Intent};

/// Aggregate call analytics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CallAnalytics {
    pub overview: Overview,
    pub trends: Trends,
    pub performance: Performance,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Overview {
    pub total_calls: usize,
    pub calls_today: usize,
    /// Calls started in the last 7 days
    pub calls_this_week: usize,
    /// Calls started in the last 30 days
    pub calls_this_month: usize,
    /// Seconds
    pub average_duration: f64,
    pub average_interactions: f64,
    /// Percentage of calls that ended normally
    pub success_rate: f64,
    /// UTC hour with the most call starts
    pub peak_hour: u32,
}

/// Per-day series over the last 30 days, oldest first
#[derive(Debug, Clone, Default, Serialize)]
pub struct Trends {
    pub daily_calls: Vec<DailyCalls>,
    /// Call starts per UTC hour, hours without calls omitted
    pub hourly_distribution: BTreeMap<u32, usize>,
    pub duration_trend: Vec<DailyDuration>,
    pub interaction_trend: Vec<DailyInteractions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCalls {
    pub date: NaiveDate,
    pub calls: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyDuration {
    pub date: NaiveDate,
    pub average_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyInteractions {
    pub date: NaiveDate,
    pub average_interactions: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Performance {
    /// Mean measured fragment latency in seconds
    pub average_response_time: f64,
    /// Percentage of calls that ended in error
    pub error_rate: f64,
    /// Estimated satisfaction percentage
    pub user_satisfaction: f64,
}

/// Frequently asked questions report
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommonQuestions {
    pub common_patterns: Vec<QuestionPattern>,
    /// Most frequent first
    pub intent_distribution: Vec<LabelCount<Intent>>,
    /// Most frequent first
    pub category_distribution: Vec<LabelCount<Category>>,
    pub total_questions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionPattern {
    pub pattern: String,
    pub count: usize,
    /// Share of all recorded questions
    pub percentage: f64,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount<T> {
    pub label: T,
    pub count: usize,
}

/// One entry of the error log
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorAnalytics {
    pub total_errors: usize,
    pub error_types: BTreeMap<String, usize>,
    /// Newest first, at most 10
    pub recent_errors: Vec<ErrorRecord>,
}
