mod common;

use chrono::NaiveDate;
use common::{record, FakeMetrics, FakeStore};
use pipeline_snapshot_service::compare::{ComparisonRequest, ComparisonResolver, MatchKind};
use pipeline_snapshot_service::metrics::MetricsRecord;
use pipeline_snapshot_service::storage::store::SnapshotStore;
use pipeline_snapshot_service::types::SnapshotKind;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn request(scope: Option<&str>, kind: SnapshotKind, requested: NaiveDate) -> ComparisonRequest {
    ComparisonRequest {
        scope: scope.map(str::to_string),
        kind,
        requested_date: requested,
    }
}

fn resolver(
    metrics: &FakeMetrics,
    store: &FakeStore,
) -> ComparisonResolver<FakeMetrics, FakeStore> {
    ComparisonResolver::new(metrics.clone(), store.clone())
}

#[tokio::test]
async fn exact_snapshot_wins_over_a_closer_neighbor() {
    let metrics = FakeMetrics::default();
    let store = FakeStore::default();
    let target = date(2025, 6, 11);
    store.seed(None, SnapshotKind::WeeklyPresident, target, record(100));
    store.seed(
        None,
        SnapshotKind::WeeklyPresident,
        date(2025, 6, 10),
        record(50),
    );
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(None, SnapshotKind::WeeklyPresident, target),
            date(2025, 6, 16),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::Exact);
    assert_eq!(result.snapshot_date, Some(target));
    assert_eq!(result.days_difference, Some(0));
    assert_eq!(result.baseline.unwrap().total_opportunities, 100);
}

#[tokio::test]
async fn nearest_snapshot_is_used_when_exact_is_missing() {
    let metrics = FakeMetrics::default();
    let store = FakeStore::default();
    store.seed(
        None,
        SnapshotKind::WeeklyPresident,
        date(2025, 6, 11),
        record(75),
    );
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(None, SnapshotKind::WeeklyPresident, date(2025, 6, 18)),
            date(2025, 6, 23),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::Nearest);
    assert_eq!(result.snapshot_date, Some(date(2025, 6, 11)));
    assert_eq!(result.days_difference, Some(7));
    assert_eq!(result.baseline.unwrap().total_opportunities, 75);
    assert!(result.label.contains("7 days away"));
}

#[tokio::test]
async fn equidistant_candidates_resolve_to_the_earlier_date() {
    let metrics = FakeMetrics::default();
    let store = FakeStore::default();
    store.seed(
        None,
        SnapshotKind::WeeklyPresident,
        date(2025, 6, 8),
        record(1),
    );
    store.seed(
        None,
        SnapshotKind::WeeklyPresident,
        date(2025, 6, 14),
        record(2),
    );
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(None, SnapshotKind::WeeklyPresident, date(2025, 6, 11)),
            date(2025, 6, 16),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::Nearest);
    assert_eq!(result.snapshot_date, Some(date(2025, 6, 8)));
    assert_eq!(result.days_difference, Some(3));
}

#[tokio::test]
async fn kinds_do_not_cross_match() {
    let metrics = FakeMetrics::default();
    let store = FakeStore::default();
    store.seed(
        None,
        SnapshotKind::MonthlyTownhall,
        date(2025, 6, 11),
        record(99),
    );
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(None, SnapshotKind::WeeklyPresident, date(2025, 6, 11)),
            date(2025, 6, 16),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::None);
}

#[tokio::test]
async fn scope_baseline_is_scaled_from_the_global_snapshot_share() {
    let metrics = FakeMetrics::default();
    metrics.set_count(Some("JMO"), 188);
    metrics.set_count(None, 580);
    let store = FakeStore::default();
    let target = date(2025, 6, 11);
    let global = MetricsRecord {
        total_opportunities: 580,
        submitted_count: 58,
        submitted_amount: 1_000_000.0,
        ..MetricsRecord::default()
    };
    store.seed(None, SnapshotKind::WeeklyPresident, target, global);
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(Some("JMO"), SnapshotKind::WeeklyPresident, target),
            date(2025, 6, 16),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::Synthesized);
    assert_eq!(result.snapshot_date, None);
    let baseline = result.baseline.unwrap();
    assert_eq!(baseline.total_opportunities, 188);
    let share: f64 = 188.0 / 580.0;
    assert_eq!(baseline.submitted_count, (58.0 * share).round() as i64);
    assert!((baseline.submitted_amount - 1_000_000.0 * share).abs() < 1e-6);
    assert!(result.label.contains("record share"));
    assert!(result.label.contains("not historical"));
}

#[tokio::test]
async fn historical_window_is_used_without_a_global_snapshot() {
    let metrics = FakeMetrics::default();
    metrics.set_window("JMO", record(5));
    let store = FakeStore::default();
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(Some("JMO"), SnapshotKind::WeeklyPresident, date(2025, 6, 11)),
            date(2025, 6, 16),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::Synthesized);
    assert_eq!(result.baseline.unwrap().total_opportunities, 5);
    assert!(result.label.contains("one period ago"));
}

#[tokio::test]
async fn single_historical_record_is_not_enough_for_the_window_tier() {
    let metrics = FakeMetrics::default();
    metrics.set_window("JMO", record(1));
    metrics.set_scope("JMO", record(40));
    let store = FakeStore::default();
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(Some("JMO"), SnapshotKind::WeeklyPresident, date(2025, 6, 11)),
            date(2025, 6, 16),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::Synthesized);
    assert!(result.label.contains("deterministic adjustment"));
}

#[tokio::test]
async fn deterministic_adjustment_is_stable_and_bounded() {
    let metrics = FakeMetrics::default();
    let current = MetricsRecord {
        total_opportunities: 40,
        submitted_count: 10,
        submitted_amount: 100_000.0,
        ..MetricsRecord::default()
    };
    metrics.set_scope("JMO", current);
    let store = FakeStore::default();
    let resolver = resolver(&metrics, &store);
    let req = request(Some("JMO"), SnapshotKind::WeeklyPresident, date(2025, 6, 11));

    let first = resolver.resolve(&req, date(2025, 6, 16)).await.unwrap();
    let second = resolver.resolve(&req, date(2025, 6, 16)).await.unwrap();

    assert_eq!(first.match_kind, MatchKind::Synthesized);
    let a = first.baseline.unwrap();
    let b = second.baseline.unwrap();
    assert_eq!(a, b);
    assert!(a.total_opportunities >= 1);
    assert!((36..=40).contains(&a.total_opportunities));
    assert!((85_000.0..105_000.0).contains(&a.submitted_amount));
    assert!(first.label.contains("not historical"));
}

#[tokio::test]
async fn global_scope_with_an_empty_store_has_no_baseline() {
    let metrics = FakeMetrics::default();
    metrics.set_global(record(500));
    let store = FakeStore::default();
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(None, SnapshotKind::WeeklyPresident, date(2025, 6, 11)),
            date(2025, 6, 16),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::None);
    assert!(result.baseline.is_none());
    assert!(result.label.contains("no comparison data"));
}

#[tokio::test]
async fn scope_with_no_current_records_has_no_baseline() {
    let metrics = FakeMetrics::default();
    let store = FakeStore::default();
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(Some("ZZZ"), SnapshotKind::WeeklyPresident, date(2025, 6, 11)),
            date(2025, 6, 16),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::None);
    assert!(result.baseline.is_none());
}

#[tokio::test]
async fn available_dates_are_filtered_and_newest_first() {
    let store = FakeStore::default();
    store.seed(None, SnapshotKind::WeeklyPresident, date(2025, 6, 4), record(1));
    store.seed(None, SnapshotKind::WeeklyPresident, date(2025, 6, 18), record(2));
    store.seed(None, SnapshotKind::WeeklyPresident, date(2025, 6, 11), record(3));
    store.seed(None, SnapshotKind::MonthlyTownhall, date(2025, 6, 6), record(4));
    store.seed(
        Some("JMO"),
        SnapshotKind::WeeklyPresident,
        date(2025, 6, 11),
        record(5),
    );

    let global = store
        .available_dates(None, SnapshotKind::WeeklyPresident)
        .await
        .unwrap();
    assert_eq!(
        global,
        vec![date(2025, 6, 18), date(2025, 6, 11), date(2025, 6, 4)]
    );

    let jmo = store
        .available_dates(Some("JMO"), SnapshotKind::WeeklyPresident)
        .await
        .unwrap();
    assert_eq!(jmo, vec![date(2025, 6, 11)]);

    let townhall = store
        .available_dates(None, SnapshotKind::MonthlyTownhall)
        .await
        .unwrap();
    assert_eq!(townhall, vec![date(2025, 6, 6)]);
}

#[tokio::test]
async fn per_scope_snapshot_beats_synthesis() {
    let metrics = FakeMetrics::default();
    metrics.set_count(Some("JMO"), 188);
    metrics.set_count(None, 580);
    let store = FakeStore::default();
    let target = date(2025, 6, 11);
    store.seed(None, SnapshotKind::WeeklyPresident, target, record(580));
    store.seed(Some("JMO"), SnapshotKind::WeeklyPresident, target, record(201));
    let resolver = resolver(&metrics, &store);

    let result = resolver
        .resolve(
            &request(Some("JMO"), SnapshotKind::WeeklyPresident, target),
            date(2025, 6, 16),
        )
        .await
        .unwrap();

    assert_eq!(result.match_kind, MatchKind::Exact);
    assert_eq!(result.baseline.unwrap().total_opportunities, 201);
}
