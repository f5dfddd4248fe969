//! Batch scheduler over a scripted source and the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use scamwatch_common::{JobStatus, JobUpdate};
use scamwatch_pipeline::scheduler::{
    self, BatchCursor, BatchScheduler, BatchSettings, WorkMatrix, STOPPED_REASON,
};
use scamwatch_pipeline::source::SourceClient;
use scamwatch_pipeline::testing::{comment, post, MockSource};
use scamwatch_pipeline::TimeBudget;
use scamwatch_store::{MemoryStore, ReportStore};

fn names(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i}")).collect()
}

fn build(
    source: Arc<MockSource>,
    store: Arc<MemoryStore>,
    channels: usize,
    terms: usize,
) -> BatchScheduler {
    let matrix = WorkMatrix::new(names("c", channels), names("t", terms));
    BatchScheduler::new(matrix, SourceClient::new(source, store.clone()), store)
}

fn settings(batch_size: usize) -> BatchSettings {
    BatchSettings {
        batch_size,
        per_term_limit: 10,
        with_comments: true,
        unit_reserve: Duration::ZERO,
    }
}

fn generous() -> TimeBudget {
    TimeBudget::new(Duration::from_secs(3600))
}

#[tokio::test]
async fn chained_batches_visit_every_unit_exactly_once() {
    for (channels, terms, batch_size) in [(3, 4, 5), (1, 1, 5), (2, 5, 5), (4, 3, 1), (7, 2, 3)] {
        let source = Arc::new(MockSource::new());
        let store = Arc::new(MemoryStore::new());
        let scheduler = build(source.clone(), store, channels, terms);

        let mut batch = 0;
        let mut batches = 0;
        loop {
            let outcome = scheduler
                .run_batch(batch, &settings(batch_size), &generous())
                .await;
            batches += 1;
            assert!(!outcome.stopped_early);
            match outcome.next {
                BatchCursor::Exhausted => break,
                BatchCursor::Next { batch: next } => {
                    assert_eq!(next, batch + 1);
                    batch = next;
                }
                other => panic!("unexpected cursor {other:?}"),
            }
        }

        let calls = source.calls();
        let unique: HashSet<_> = calls.iter().cloned().collect();
        assert_eq!(calls.len(), channels * terms, "matrix {channels}x{terms}");
        assert_eq!(unique.len(), calls.len(), "no unit repeated");
        assert_eq!(batches, (channels * terms).div_ceil(batch_size));
    }
}

#[tokio::test]
async fn failed_unit_does_not_block_the_rest_and_is_recorded() {
    let source = Arc::new(
        MockSource::new()
            .on_search("c0", "t0", vec![post("p1", "c0", "Taxi scam", "body")])
            .throttle("c0", "t1")
            .on_search("c0", "t2", vec![post("p2", "c0", "Gem scam", "body")]),
    );
    let store = Arc::new(MemoryStore::new());
    let scheduler = build(source, store.clone(), 1, 3);

    let outcome = scheduler.run_batch(0, &settings(5), &generous()).await;
    assert_eq!(outcome.units_processed, 3);
    assert_eq!(outcome.units_failed, 1);
    assert_eq!(outcome.posts_inserted, 2);
    assert!(outcome.is_exhausted());

    let failed = store.fetch_job("c0", "t1").await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.last_error.unwrap().contains("Throttled"));

    let done = store.fetch_job("c0", "t2").await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.posts_processed, 1);
    assert!(done.last_fetched_at.is_some());
}

#[tokio::test]
async fn rerunning_a_batch_is_idempotent() {
    let source = Arc::new(MockSource::new().on_search(
        "c0",
        "t0",
        vec![post("p1", "c0", "Scam", "a"), post("p2", "c0", "Scam", "b")],
    ));
    let store = Arc::new(MemoryStore::new());
    let scheduler = build(source, store.clone(), 1, 1);

    let first = scheduler.run_batch(0, &settings(5), &generous()).await;
    let second = scheduler.run_batch(0, &settings(5), &generous()).await;
    assert_eq!(first.posts_inserted, 2);
    assert_eq!(second.posts_fetched, 2);
    assert_eq!(second.posts_inserted, 0);
    assert_eq!(store.report_count(), 2);

    let job = store.fetch_job("c0", "t0").await.unwrap().unwrap();
    assert_eq!(job.posts_processed, 2);
}

#[tokio::test]
async fn exhausted_budget_returns_a_resume_cursor() {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(MemoryStore::new());
    let scheduler = build(source.clone(), store, 2, 4);

    let spent = TimeBudget::new(Duration::ZERO);
    let outcome = scheduler.run_batch(1, &settings(3), &spent).await;
    assert!(outcome.stopped_early);
    assert_eq!(outcome.next, BatchCursor::Resume { batch: 1, index: 3 });
    assert_eq!(outcome.units_processed, 0);
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn first_batch_stopped_early_is_not_exhausted() {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(MemoryStore::new());
    let scheduler = build(source.clone(), store, 1, 3);

    let outcome = scheduler
        .run_batch(0, &settings(5), &TimeBudget::new(Duration::ZERO))
        .await;
    assert!(outcome.stopped_early);
    assert!(!outcome.is_exhausted());
    assert_eq!(outcome.next.batch(), Some(0));
    assert_eq!(outcome.next.resume_index(), Some(0));
}

#[tokio::test]
async fn resumed_batch_skips_units_already_visited() {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(MemoryStore::new());
    let scheduler = build(source.clone(), store, 1, 5);

    let outcome = scheduler.resume_batch(0, 2, &settings(5), &generous()).await;
    assert_eq!(outcome.units_processed, 3);
    assert!(outcome.is_exhausted());
    let terms: Vec<String> = source.calls().into_iter().map(|(_, t)| t).collect();
    assert_eq!(terms, ["t2", "t3", "t4"]);

    let last = scheduler
        .run_all(BatchCursor::Resume { batch: 0, index: 4 }, &settings(5), &generous())
        .await;
    assert!(last.is_exhausted());
    assert_eq!(source.calls().len(), 4);
}

#[tokio::test]
async fn interrupted_search_keeps_partial_posts_and_fails_the_unit() {
    let source = Arc::new(
        MockSource::new()
            .on_search(
                "c0",
                "t0",
                vec![post("p1", "c0", "Taxi scam", "a"), post("p2", "c0", "Taxi scam", "b")],
            )
            .throttle_after("c0", "t0", 1),
    );
    let store = Arc::new(MemoryStore::new());
    let scheduler = build(source, store.clone(), 1, 1);

    let outcome = scheduler.run_batch(0, &settings(5), &generous()).await;
    assert_eq!(outcome.posts_inserted, 1);
    assert_eq!(outcome.units_failed, 1);
    assert_eq!(store.report_count(), 1);

    let job = store.fetch_job("c0", "t0").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.last_error.unwrap().contains("Throttled"));
}

#[tokio::test]
async fn run_all_walks_the_whole_matrix() {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(MemoryStore::new());
    let scheduler = build(source.clone(), store.clone(), 3, 3);

    let last = scheduler
        .run_all(BatchCursor::Next { batch: 0 }, &settings(2), &generous())
        .await;
    assert!(last.is_exhausted());
    assert_eq!(last.batch_number, 4);
    assert_eq!(source.calls().len(), 9);
    assert_eq!(store.list_fetch_jobs().await.unwrap().len(), 9);
}

#[tokio::test]
async fn stored_comments_are_not_fetched_again() {
    let mut with_replies = post("p1", "c0", "Tuk tuk scam", "body");
    with_replies.num_comments = 2;
    let source = Arc::new(
        MockSource::new()
            .on_search("c0", "t0", vec![with_replies])
            .on_comments("p1", vec![comment("k1", "same here"), comment("k2", "me too")]),
    );
    let store = Arc::new(MemoryStore::new());
    let scheduler = build(source, store.clone(), 1, 1);

    let first = scheduler.run_batch(0, &settings(5), &generous()).await;
    assert_eq!(first.comments_inserted, 2);
    let second = scheduler.run_batch(0, &settings(5), &generous()).await;
    assert_eq!(second.comments_inserted, 0);
    assert_eq!(store.comments_for("p1").len(), 2);
}

#[tokio::test]
async fn comment_failure_is_isolated_to_its_post() {
    let mut a = post("pa", "c0", "Scam A", "body");
    a.num_comments = 1;
    let mut b = post("pb", "c0", "Scam B", "body");
    b.num_comments = 1;
    let source = Arc::new(
        MockSource::new()
            .on_search("c0", "t0", vec![a, b])
            .fail_comments("pa")
            .on_comments("pb", vec![comment("kb", "happened to me")]),
    );
    let store = Arc::new(MemoryStore::new());
    let scheduler = build(source, store.clone(), 1, 1);

    let outcome = scheduler.run_batch(0, &settings(5), &generous()).await;
    assert_eq!(outcome.units_failed, 0);
    assert_eq!(outcome.posts_inserted, 2);
    assert_eq!(outcome.comments_inserted, 1);
}

#[tokio::test]
async fn failed_comment_fetch_is_retried_on_a_later_run() {
    let mut replied = post("pa", "c0", "Scam A", "body");
    replied.num_comments = 1;
    let store = Arc::new(MemoryStore::new());

    let failing = Arc::new(
        MockSource::new()
            .on_search("c0", "t0", vec![replied.clone()])
            .fail_comments("pa"),
    );
    let first = build(failing, store.clone(), 1, 1)
        .run_batch(0, &settings(5), &generous())
        .await;
    assert_eq!(first.posts_inserted, 1);
    assert_eq!(first.comments_inserted, 0);

    let healthy = Arc::new(
        MockSource::new()
            .on_search("c0", "t0", vec![replied])
            .on_comments("pa", vec![comment("ka", "happened to me too")]),
    );
    let second = build(healthy, store.clone(), 1, 1)
        .run_batch(0, &settings(5), &generous())
        .await;
    assert_eq!(second.posts_inserted, 0);
    assert_eq!(second.comments_inserted, 1);
    assert_eq!(store.comments_for("pa").len(), 1);
}

#[tokio::test]
async fn stop_all_jobs_fails_only_active_jobs() {
    let store = MemoryStore::new();
    store.update_fetch_job("c0", "t0", &JobUpdate::Started).await.unwrap();
    store
        .update_fetch_job("c0", "t1", &JobUpdate::Completed { posts_inserted: 3 })
        .await
        .unwrap();

    let stopped = scheduler::stop_all_jobs(&store).await.unwrap();
    assert_eq!(stopped, 1);

    let job = store.fetch_job("c0", "t0").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some(STOPPED_REASON));
    let done = store.fetch_job("c0", "t1").await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
}
