//! Integration tests for PgStore against a real Postgres container.
//! Run with `--features test-utils` (requires Docker).
#![cfg(feature = "test-utils")]

use chrono::{TimeZone, Utc};
use scamwatch_common::{
    CommentAnalysis, EngagementKind, GeoPoint, IncidentContribution, JobStatus, JobUpdate,
    MonetaryLoss, NewComment, RawPost, ReportEnrichment, ReportLocation, ReportQuery,
    ScamCategory,
};
use scamwatch_store::testutil::postgres_container;
use scamwatch_store::{ReportStore, ResetScope};

fn post(id: &str, body: &str) -> RawPost {
    RawPost {
        external_id: id.into(),
        channel: "travel".into(),
        author: "traveller".into(),
        title: format!("Scammed in Bangkok ({id})"),
        body: body.into(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap(),
        score: 42,
        num_comments: 3,
        permalink: format!("/r/travel/comments/{id}/scammed/"),
    }
}

fn comment(id: &str, parent: Option<&str>) -> NewComment {
    NewComment {
        external_id: id.into(),
        parent_external_id: parent.map(str::to_string),
        author: "replier".into(),
        body: "Happened to me too near the Grand Palace".into(),
        score: 3,
        created_at: Utc::now(),
        depth: if parent.is_some() { 1 } else { 0 },
    }
}

fn taxi_enrichment() -> ReportEnrichment {
    ReportEnrichment {
        is_incident: true,
        confidence: 0.92,
        category: Some(ScamCategory::Taxi),
        loss: Some(MonetaryLoss {
            amount: 35.0,
            currency: "USD".into(),
        }),
        warning_signals: vec!["Driver refused the meter".into()],
        prevention_tips: vec!["Use a ride-hailing app".into()],
        summary: Some("Taxi driver overcharged a tourist".into()),
        location: ReportLocation {
            country: Some("Thailand".into()),
            city: Some("Bangkok".into()),
            specific_location: None,
            coordinates: Some(GeoPoint::new(13.7563, 100.5018)),
        },
    }
}

fn bangkok(coordinates: Option<GeoPoint>) -> IncidentContribution {
    IncidentContribution {
        country: "Thailand".into(),
        city: Some("Bangkok".into()),
        category: ScamCategory::Taxi,
        loss_amount: Some(35.0),
        coordinates,
    }
}

#[tokio::test]
async fn post_upsert_is_idempotent() {
    let (_container, store) = postgres_container().await;

    assert!(store.upsert_post(&post("p1", "meter")).await.unwrap());
    assert!(!store.upsert_post(&post("p1", "changed body")).await.unwrap());

    let stored = store.get_report_by_external_id("p1").await.unwrap().unwrap();
    assert_eq!(stored.post.body, "meter");
    assert!(!stored.is_processed);
}

#[tokio::test]
async fn comment_batches_dedupe_per_report() {
    let (_container, store) = postgres_container().await;
    store.upsert_post(&post("p1", "body")).await.unwrap();

    let batch = vec![comment("c1", None), comment("c2", Some("c1"))];
    assert_eq!(store.insert_comments("p1", &batch).await.unwrap(), 2);

    let overlap = vec![comment("c2", Some("c1")), comment("c3", None)];
    assert_eq!(store.insert_comments("p1", &overlap).await.unwrap(), 1);

    assert_eq!(store.insert_comments("unknown", &batch).await.unwrap(), 0);
    assert_eq!(store.unanalyzed_comments(10).await.unwrap().len(), 3);
    assert_eq!(store.comment_count("p1").await.unwrap(), 3);
    assert_eq!(store.comment_count("unknown").await.unwrap(), 0);
}

#[tokio::test]
async fn completion_is_guarded_and_aggregates_once() {
    let (_container, store) = postgres_container().await;
    store.upsert_post(&post("p1", "taxi overcharge")).await.unwrap();
    let id = store.get_report_by_external_id("p1").await.unwrap().unwrap().id;

    let enrichment = taxi_enrichment();
    let contribution = bangkok(Some(GeoPoint::new(13.7563, 100.5018)));
    assert!(store.complete_report(id, &enrichment, Some(&contribution)).await.unwrap());
    assert!(!store.complete_report(id, &enrichment, Some(&contribution)).await.unwrap());

    let report = store.get_report(id).await.unwrap().unwrap();
    assert!(report.is_processed);
    assert_eq!(report.enrichment, enrichment);

    let stat = store
        .location_stat("Thailand", Some("Bangkok"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stat.total_scams, 1);
    assert_eq!(stat.top_categories[0].category, ScamCategory::Taxi);
    assert_eq!(stat.average_loss, 35.0);
    assert!(stat.coordinates.is_some());
}

#[tokio::test]
async fn rollup_keeps_first_coordinates_and_bounded_categories() {
    let (_container, store) = postgres_container().await;

    store
        .record_incident(&bangkok(Some(GeoPoint::new(13.75, 100.50))))
        .await
        .unwrap();
    let categories = [
        ScamCategory::Tour,
        ScamCategory::Shopping,
        ScamCategory::Restaurant,
        ScamCategory::StreetHustle,
        ScamCategory::CurrencyExchange,
        ScamCategory::FakePolice,
    ];
    for category in categories {
        let mut incident = bangkok(Some(GeoPoint::new(0.0, 0.0)));
        incident.category = category;
        store.record_incident(&incident).await.unwrap();
    }

    let stat = store
        .location_stat("Thailand", Some("Bangkok"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stat.total_scams, 7);
    assert!(stat.top_categories.len() <= 5);
    assert_eq!(stat.coordinates, Some(GeoPoint::new(13.75, 100.50)));

    // Country-level row is distinct from the city row.
    assert!(store.location_stat("Thailand", None).await.unwrap().is_none());
}

#[tokio::test]
async fn errors_stall_reports_until_reset() {
    let (_container, store) = postgres_container().await;
    store.upsert_post(&post("p1", "body")).await.unwrap();
    let id = store.get_report_by_external_id("p1").await.unwrap().unwrap().id;

    for _ in 0..3 {
        store.record_processing_error(id, "geocoder unavailable").await.unwrap();
    }
    assert!(store.unprocessed_reports(10, 3).await.unwrap().is_empty());
    assert_eq!(store.stalled_reports(3, 10).await.unwrap().len(), 1);

    let summary = store.report_summary(3).await.unwrap();
    assert_eq!(summary.stalled, 1);
    assert_eq!(summary.unprocessed, 0);

    let reset = store
        .reset_for_reprocessing(&ResetScope::Stalled { max_attempts: 3 })
        .await
        .unwrap();
    assert_eq!(reset, 1);
    let report = store.get_report(id).await.unwrap().unwrap();
    assert_eq!(report.processing_attempts, 0);
    assert!(report.processing_errors.is_empty());
}

#[tokio::test]
async fn job_ledger_transitions() {
    let (_container, store) = postgres_container().await;

    store.update_fetch_job("travel", "scam", &JobUpdate::Started).await.unwrap();
    let job = store
        .update_fetch_job("travel", "scam", &JobUpdate::Completed { posts_inserted: 4 })
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.posts_processed, 4);

    store.update_fetch_job("bali", "scam", &JobUpdate::Started).await.unwrap();
    assert_eq!(store.stop_all_jobs("Manually stopped").await.unwrap(), 1);

    let jobs = store.list_fetch_jobs().await.unwrap();
    assert_eq!(jobs.len(), 2);
    let bali = store.fetch_job("bali", "scam").await.unwrap().unwrap();
    assert_eq!(bali.status, JobStatus::Failed);
    assert_eq!(bali.last_error.as_deref(), Some("Manually stopped"));
}

#[tokio::test]
async fn reads_only_see_processed_reports() {
    let (_container, store) = postgres_container().await;
    store.upsert_post(&post("p1", "The tuk tuk driver took us to a gem shop")).await.unwrap();
    store.upsert_post(&post("p2", "Still waiting for classification")).await.unwrap();
    let id = store.get_report_by_external_id("p1").await.unwrap().unwrap().id;
    store.complete_report(id, &taxi_enrichment(), None).await.unwrap();

    let listed = store
        .list_reports(&ReportQuery {
            country: Some("thailand".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let found = store.search_reports("gem shop", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(store.search_reports("classification", 10).await.unwrap().is_empty());

    let engagement = store
        .record_engagement(id, EngagementKind::Helpful)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(engagement.helpful, 1);

    let comment_id = {
        store.insert_comments("p1", &[comment("c1", None)]).await.unwrap();
        store.unanalyzed_comments(1).await.unwrap()[0].id
    };
    let analysis = CommentAnalysis {
        is_scam_report: false,
        ..Default::default()
    };
    assert!(store.complete_comment(comment_id, &analysis, None).await.unwrap());
    assert!(store.unanalyzed_comments(10).await.unwrap().is_empty());
}
