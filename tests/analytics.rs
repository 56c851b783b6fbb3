//! Analytics over calls finished through the service

use std::time::Duration;

use beacon_voice::analytics::{Category, Intent};
use beacon_voice::{SessionConfig, SessionStatus};

mod common;
use common::{Behavior, Stub, test_pipeline_config, test_service, test_service_with};

#[test]
fn no_calls_reports_zeroes() {
    let stub = Stub::new(Behavior::default());
    let service = test_service(&stub);

    let analytics = service.call_analytics();
    assert_eq!(analytics.overview.total_calls, 0);
    assert!(analytics.overview.success_rate.abs() < f64::EPSILON);
    assert!(analytics.trends.daily_calls.is_empty());
    assert!(analytics.performance.user_satisfaction.abs() < f64::EPSILON);

    let questions = service.common_questions(10);
    assert_eq!(questions.total_questions, 0);
    assert!(questions.common_patterns.is_empty());

    assert_eq!(service.error_analytics().total_errors, 0);
}

#[tokio::test]
async fn ended_call_feeds_analytics() {
    let stub = Stub::new(Behavior::default());
    let service = test_service(&stub);

    for text in [
        "How much does shipping cost",
        "how much does express shipping cost",
        "I forgot my password",
    ] {
        service.process_fragment("caller-1", text.as_bytes()).await.unwrap();
    }

    // Nothing is recorded until the call ends
    assert_eq!(service.analytics().call_count(), 0);

    let export = service.end_session("caller-1").unwrap();
    assert_eq!(export.status, SessionStatus::Ended);
    assert_eq!(export.total_interactions, 3);
    assert_eq!(export.response_times_ms.len(), 3);

    let analytics = service.call_analytics();
    assert_eq!(analytics.overview.total_calls, 1);
    assert_eq!(analytics.overview.calls_today, 1);
    assert!((analytics.overview.average_interactions - 3.0).abs() < f64::EPSILON);
    assert!((analytics.overview.success_rate - 100.0).abs() < f64::EPSILON);
    assert!(analytics.performance.error_rate.abs() < f64::EPSILON);
    assert_eq!(analytics.trends.daily_calls.len(), 30);
    assert_eq!(analytics.trends.daily_calls.last().unwrap().calls, 1);

    let questions = service.common_questions(10);
    assert_eq!(questions.total_questions, 3);
    let top = &questions.common_patterns[0];
    assert_eq!(top.pattern, "how much does");
    assert_eq!(top.count, 2);
    assert!((top.percentage - 66.67).abs() < f64::EPSILON);
    assert_eq!(
        top.examples,
        ["how much does shipping cost", "how much does express shipping cost"]
    );

    assert_eq!(questions.intent_distribution[0].label, Intent::BillingInquiry);
    assert_eq!(questions.intent_distribution[0].count, 2);
    assert_eq!(
        questions.category_distribution[0].label,
        Category::BillingPayment
    );
    assert_eq!(questions.category_distribution[0].count, 2);
}

#[tokio::test]
async fn aborted_call_counts_against_success_rate() {
    let stub = Stub::new(Behavior::default());
    let service = test_service(&stub);

    service.process_fragment("caller-1", b"hello").await.unwrap();
    service.process_fragment("caller-2", b"hello").await.unwrap();

    service.end_session("caller-1").unwrap();
    let aborted = service.abort_session("caller-2").unwrap();
    assert_eq!(aborted.status, SessionStatus::Error);

    let analytics = service.call_analytics();
    assert_eq!(analytics.overview.total_calls, 2);
    assert!((analytics.overview.success_rate - 50.0).abs() < f64::EPSILON);
    assert!((analytics.performance.error_rate - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn replaced_and_drained_sessions_are_recorded() {
    let stub = Stub::new(Behavior::default());
    let service = test_service(&stub);

    service.create_session("caller-1", Some("user-7")).unwrap();
    // Reconnect replaces the first session
    service.create_session("caller-1", Some("user-7")).unwrap();
    service.create_session("caller-2", None).unwrap();
    assert_eq!(service.analytics().call_count(), 1);

    assert_eq!(service.shutdown(), 2);
    assert_eq!(service.analytics().call_count(), 3);
    assert_eq!(service.sessions().active_count(), 0);
    assert_eq!(service.user_sessions("user-7").len(), 2);
}

#[tokio::test]
async fn capacity_eviction_records_the_oldest_call() {
    let stub = Stub::new(Behavior::default());
    let sessions = SessionConfig {
        max_active: 2,
        ..SessionConfig::default()
    };
    let service = test_service_with(&stub, sessions, test_pipeline_config());

    let first = service.create_session("caller-1", None).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    service.create_session("caller-2", None).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    service.create_session("caller-3", None).unwrap();

    assert_eq!(service.sessions().active_count(), 2);
    assert!(service.sessions().get("caller-1").is_none());
    assert_eq!(service.analytics().call_count(), 1);
    assert_eq!(service.user_sessions("nobody").len(), 0);

    let summary = service.sessions_summary();
    assert_eq!(summary.total_sessions, 3);
    assert_eq!(summary.active_sessions, 2);
    assert_eq!(summary.completed_sessions, 1);
    assert!(service.session_analytics("caller-1").is_some_and(|a| a.session_id == first.id));
}

#[tokio::test]
async fn sweep_records_idle_sessions() {
    let stub = Stub::new(Behavior::default());
    let sessions = SessionConfig {
        idle_timeout: Duration::from_millis(10),
        ..SessionConfig::default()
    };
    let service = test_service_with(&stub, sessions, test_pipeline_config());

    service.create_session("caller-1", None).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(service.sweep_idle(), 1);
    assert_eq!(service.sessions().active_count(), 0);
    assert_eq!(service.analytics().call_count(), 1);
}
