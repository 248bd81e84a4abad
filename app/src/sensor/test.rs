use super::*;
use crate::error::ErrorKind;
use crate::store::mock::MockStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sensor_core::{AggregateFunction, Quality, TimeRange};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn build_service(store: &Arc<MockStore>) -> Arc<SensorService> {
    SensorService::new(
        store.clone(),
        IngestPolicy::default(),
        QueryPolicy::default(),
    )
}

fn reading(sensor_id: &str, timestamp: Option<DateTime<Utc>>, value: f64) -> IngestReading {
    IngestReading {
        sensor: SensorSpec::new(sensor_id),
        timestamp,
        value,
        quality: None,
    }
}

fn range(from: i64, until: i64) -> TimeRange {
    TimeRange::new(at(from), at(until)).unwrap()
}

#[tokio::test]
async fn test_ingest_registers_and_is_idempotent() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let now = at(1_000);

    // execute
    let first = service
        .ingest()
        .ingest_at(vec![reading("s1", Some(at(100)), 5.0)], now)
        .await
        .unwrap();
    let second = service
        .ingest()
        .ingest_at(vec![reading("s1", Some(at(100)), 5.0)], now)
        .await
        .unwrap();

    // validate
    assert_eq!(
        IngestSummary {
            accepted: 1,
            duplicates: 0,
            rejected: vec![]
        },
        first
    );
    assert_eq!(
        IngestSummary {
            accepted: 0,
            duplicates: 1,
            rejected: vec![]
        },
        second
    );
    assert_eq!(1, store.reading_count().await);
    assert!(service.sensor("s1").await.is_ok());
}

#[tokio::test]
async fn test_duplicates_within_batch() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);

    // execute
    let batch = vec![
        reading("s1", Some(at(100)), 1.0),
        reading("s1", Some(at(100)), 2.0),
        reading("s1", Some(at(200)), 3.0),
    ];
    let summary = service.ingest().ingest_at(batch, at(1_000)).await.unwrap();

    // validate
    assert_eq!(2, summary.accepted);
    assert_eq!(1, summary.duplicates);
    assert_eq!(2, store.reading_count().await);
}

#[tokio::test]
async fn test_clock_skew_boundary() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let now = at(1_000);
    let skew = IngestPolicy::default().clock_skew;

    // execute
    let at_now = service
        .ingest()
        .ingest_at(vec![reading("s1", Some(now), 1.0)], now)
        .await;
    let at_tolerance = service
        .ingest()
        .ingest_at(vec![reading("s1", Some(now + skew), 1.0)], now)
        .await;
    let beyond = service
        .ingest()
        .ingest_at(
            vec![reading("s1", Some(now + skew + Duration::seconds(1)), 1.0)],
            now,
        )
        .await;

    // validate
    assert_eq!(1, at_now.unwrap().accepted);
    assert_eq!(1, at_tolerance.unwrap().accepted);
    let err = beyond.unwrap_err();
    assert_eq!(ErrorKind::Validation, err.kind());
    assert_eq!(2, store.reading_count().await);
}

#[tokio::test]
async fn test_max_age_rejects_stale_readings() {
    // prepare
    let store = MockStore::new();
    let policy = IngestPolicy {
        max_age: Some(Duration::hours(1)),
        ..IngestPolicy::default()
    };
    let service = SensorService::new(store.clone(), policy, QueryPolicy::default());
    let now = at(10_000);

    // execute
    let fresh = service
        .ingest()
        .ingest_at(vec![reading("s1", Some(at(10_000 - 3_600)), 1.0)], now)
        .await;
    let stale = service
        .ingest()
        .ingest_at(vec![reading("s1", Some(at(10_000 - 3_601)), 1.0)], now)
        .await;

    // validate
    assert!(fresh.is_ok());
    assert_eq!(ErrorKind::Validation, stale.unwrap_err().kind());
}

#[tokio::test]
async fn test_missing_timestamp_defaults_to_now() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let now = at(5_000);

    // execute
    service
        .ingest()
        .ingest_at(vec![reading("s1", None, 1.0)], now)
        .await
        .unwrap();

    // validate
    let page = service
        .query()
        .readings("s1", range(0, 6_000), None, None)
        .await
        .unwrap();
    assert_eq!(now, page.readings[0].timestamp);
}

#[tokio::test]
async fn test_invalid_reading_rejects_whole_batch() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);

    // execute
    let batch = vec![
        reading("s1", Some(at(100)), 1.0),
        reading("s1", Some(at(200)), f64::NAN),
        reading("bad id", Some(at(300)), 1.0),
    ];
    let res = service.ingest().ingest_at(batch, at(1_000)).await;

    // validate
    match res {
        Err(ServiceError::Rejected(rejected)) => {
            let indices: Vec<usize> = rejected.iter().map(|r| r.index).collect();
            assert_eq!(vec![1, 2], indices);
        }
        other => panic!("Expected rejected batch, got {:?}", other),
    }
    assert_eq!(0, store.reading_count().await);
    assert_eq!(0, store.sensor_count().await);
}

#[tokio::test]
async fn test_conflicting_metadata_within_batch() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let mut celsius = reading("s1", Some(at(100)), 1.0);
    celsius.sensor.unit = Some("C".to_owned());
    let mut fahrenheit = reading("s1", Some(at(200)), 1.0);
    fahrenheit.sensor.unit = Some("F".to_owned());

    // execute
    let res = service
        .ingest()
        .ingest_at(vec![celsius, fahrenheit], at(1_000))
        .await;

    // validate
    match res {
        Err(ServiceError::Rejected(rejected)) => assert_eq!(1, rejected[0].index),
        other => panic!("Expected rejected batch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_size_limits() {
    // prepare
    let store = MockStore::new();
    let policy = IngestPolicy {
        max_batch_size: 2,
        ..IngestPolicy::default()
    };
    let service = SensorService::new(store.clone(), policy, QueryPolicy::default());
    let batch: Vec<IngestReading> = (1..=3)
        .map(|i| reading("s1", Some(at(i)), 1.0))
        .collect();

    // execute
    let empty = service.ingest().ingest_at(vec![], at(1_000)).await;
    let too_large = service.ingest().ingest_at(batch, at(1_000)).await;

    // validate
    assert_eq!(ErrorKind::Validation, empty.unwrap_err().kind());
    assert_eq!(ErrorKind::Validation, too_large.unwrap_err().kind());
}

#[tokio::test]
async fn test_unit_conflict_on_reregistration() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let spec = SensorSpec {
        unit: Some("C".to_owned()),
        ..SensorSpec::new("s1")
    };
    assert!(service.register(spec).await.unwrap().is_created());

    // execute
    let reregister = service
        .register(SensorSpec {
            unit: Some("F".to_owned()),
            ..SensorSpec::new("s1")
        })
        .await;
    let mut ingest = reading("s1", Some(at(100)), 1.0);
    ingest.sensor.unit = Some("F".to_owned());
    let ingested = service.ingest().ingest_at(vec![ingest], at(1_000)).await;

    // validate
    assert_eq!(ErrorKind::Conflict, reregister.unwrap_err().kind());
    assert_eq!(ErrorKind::Conflict, ingested.unwrap_err().kind());
    assert_eq!(0, store.reading_count().await);
    assert_eq!(Some("C".to_owned()), service.sensor("s1").await.unwrap().unit);
}

#[tokio::test]
async fn test_register_updates_metadata() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    service.register(SensorSpec::new("s1")).await.unwrap();

    // execute
    let upserted = service
        .register(SensorSpec {
            name: Some(" Greenhouse ".to_owned()),
            ..SensorSpec::new("s1")
        })
        .await
        .unwrap();

    // validate
    assert!(!upserted.is_created());
    assert_eq!(Some("Greenhouse".to_owned()), upserted.into_inner().name);
    assert_eq!(1, service.sensors().await.unwrap().len());
}

#[tokio::test]
async fn test_concurrent_ingest_of_same_key() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);

    // execute
    let handles: Vec<_> = [1.0, 2.0]
        .iter()
        .map(|value| {
            let service = service.clone();
            let batch = vec![reading("s1", Some(at(100)), *value)];
            tokio::spawn(async move { service.ingest().ingest_at(batch, at(1_000)).await })
        })
        .collect();
    let mut accepted = 0;
    let mut duplicates = 0;
    for handle in handles {
        let summary = handle.await.unwrap().unwrap();
        accepted += summary.accepted;
        duplicates += summary.duplicates;
    }

    // validate
    assert_eq!(1, accepted);
    assert_eq!(1, duplicates);
    assert_eq!(1, store.reading_count().await);
}

#[tokio::test]
async fn test_pages_are_ordered() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let batch: Vec<IngestReading> = [500, 100, 400, 200, 300]
        .iter()
        .map(|ts| reading("s1", Some(at(*ts)), *ts as f64))
        .collect();
    service.ingest().ingest_at(batch, at(1_000)).await.unwrap();

    // execute
    let mut timestamps = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = service
            .query()
            .readings("s1", range(0, 1_000), Some(2), cursor.as_deref())
            .await
            .unwrap();
        pages += 1;
        timestamps.extend(page.readings.iter().map(|r| r.timestamp.timestamp()));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    // validate
    assert_eq!(3, pages);
    assert_eq!(vec![100, 200, 300, 400, 500], timestamps);
}

#[tokio::test]
async fn test_exact_page_has_no_cursor() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let batch = vec![
        reading("s1", Some(at(100)), 1.0),
        reading("s1", Some(at(200)), 1.0),
    ];
    service.ingest().ingest_at(batch, at(1_000)).await.unwrap();

    // execute
    let page = service
        .query()
        .readings("s1", range(0, 1_000), Some(2), None)
        .await
        .unwrap();

    // validate
    assert_eq!(2, page.readings.len());
    assert_eq!(None, page.next_cursor);
}

#[tokio::test]
async fn test_query_limits_and_unknown_sensor() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    service.register(SensorSpec::new("s1")).await.unwrap();

    // execute
    let zero = service
        .query()
        .readings("s1", range(0, 100), Some(0), None)
        .await;
    let too_large = service
        .query()
        .readings("s1", range(0, 100), Some(1_001), None)
        .await;
    let unknown = service
        .query()
        .readings("nope", range(0, 100), None, None)
        .await;

    // validate
    assert_eq!(ErrorKind::Validation, zero.unwrap_err().kind());
    assert_eq!(ErrorKind::Validation, too_large.unwrap_err().kind());
    assert_eq!(ErrorKind::NotFound, unknown.unwrap_err().kind());
}

#[tokio::test]
async fn test_range_is_half_open() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let batch = vec![
        reading("s1", Some(at(100)), 1.0),
        reading("s1", Some(at(200)), 2.0),
    ];
    service.ingest().ingest_at(batch, at(1_000)).await.unwrap();

    // execute
    let page = service
        .query()
        .readings("s1", range(100, 200), None, None)
        .await
        .unwrap();
    let empty = service
        .query()
        .readings("s1", range(100, 100), None, None)
        .await
        .unwrap();

    // validate
    assert_eq!(1, page.readings.len());
    assert_eq!(at(100), page.readings[0].timestamp);
    assert!(empty.readings.is_empty());
}

#[tokio::test]
async fn test_count_aggregation() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let batch = vec![
        reading("s1", Some(at(100)), 1.0),
        reading("s1", Some(at(200)), 2.0),
        reading("s1", Some(at(300)), 3.0),
    ];
    service.ingest().ingest_at(batch, at(1_000)).await.unwrap();

    // execute
    let buckets = service
        .query()
        .aggregate(
            "s1",
            range(0, 400),
            Duration::seconds(100),
            AggregateFunction::Count,
        )
        .await
        .unwrap();

    // validate
    let starts: Vec<i64> = buckets.iter().map(|b| b.start.timestamp()).collect();
    assert_eq!(vec![100, 200, 300], starts);
    assert!(buckets.iter().all(|b| b.value == 1.0));
}

#[tokio::test]
async fn test_buckets_align_to_epoch() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let batch = vec![
        reading("s1", Some(at(130)), 1.0),
        reading("s1", Some(at(170)), 3.0),
        reading("s1", Some(at(260)), 10.0),
    ];
    service.ingest().ingest_at(batch, at(1_000)).await.unwrap();

    // execute
    let buckets = service
        .query()
        .aggregate(
            "s1",
            range(130, 430),
            Duration::seconds(100),
            AggregateFunction::Avg,
        )
        .await
        .unwrap();

    // validate
    assert_eq!(2, buckets.len());
    assert_eq!(at(100), buckets[0].start);
    assert_eq!(2.0, buckets[0].value);
    assert_eq!(at(200), buckets[1].start);
    assert_eq!(10.0, buckets[1].value);
}

#[tokio::test]
async fn test_aggregation_guards() {
    // prepare
    let store = MockStore::new();
    let policy = QueryPolicy {
        max_buckets: 10,
        ..QueryPolicy::default()
    };
    let service = SensorService::new(store.clone(), IngestPolicy::default(), policy);
    service.register(SensorSpec::new("s1")).await.unwrap();

    // execute
    let too_many = service
        .query()
        .aggregate("s1", range(0, 1_100), Duration::seconds(100), AggregateFunction::Max)
        .await;
    let zero_bucket = service
        .query()
        .aggregate("s1", range(0, 100), Duration::zero(), AggregateFunction::Max)
        .await;
    let at_limit = service
        .query()
        .aggregate("s1", range(0, 1_000), Duration::seconds(100), AggregateFunction::Max)
        .await;

    // validate
    assert_eq!(ErrorKind::Validation, too_many.unwrap_err().kind());
    assert_eq!(ErrorKind::Validation, zero_bucket.unwrap_err().kind());
    assert!(at_limit.unwrap().is_empty());
}

#[tokio::test]
async fn test_default_range() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);

    // execute
    let defaulted = service.query().range(None, None, at(100_000)).unwrap();
    let inverted = service.query().range(Some(at(200)), Some(at(100)), at(100_000));

    // validate
    assert_eq!(at(100_000 - 86_400), defaulted.from());
    assert_eq!(at(100_000), defaulted.until());
    assert_eq!(ErrorKind::Validation, inverted.unwrap_err().kind());
}

#[tokio::test]
async fn test_quality_is_kept() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let mut input = reading("s1", Some(at(100)), 1.0);
    input.quality = Some(Quality::Uncertain);
    service.ingest().ingest_at(vec![input], at(1_000)).await.unwrap();

    // execute
    let page = service
        .query()
        .readings("s1", range(0, 1_000), None, None)
        .await
        .unwrap();

    // validate
    assert_eq!(Some(Quality::Uncertain), page.readings[0].quality);
}

#[tokio::test]
async fn test_check_db() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);

    // execute & validate
    assert_eq!("healthy", service.check_db().await);
    store.set_failing(true);
    assert_eq!("unreachable", service.check_db().await);
    assert_eq!(
        ErrorKind::Storage,
        service.sensors().await.unwrap_err().kind()
    );
}

#[tokio::test]
async fn test_aggregation_guard_on_widest_range() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    service.register(SensorSpec::new("s1")).await.unwrap();
    let widest = TimeRange::new(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC).unwrap();

    // execute
    let res = service
        .query()
        .aggregate("s1", widest, Duration::microseconds(1), AggregateFunction::Avg)
        .await;

    // validate
    assert_eq!(ErrorKind::Validation, res.unwrap_err().kind());
}

#[tokio::test]
async fn test_statistics_follow_requested_order() {
    // prepare
    let store = MockStore::new();
    let service = build_service(&store);
    let batch = vec![
        reading("a", Some(at(100)), 1.0),
        reading("a", Some(at(200)), 5.0),
        reading("b", Some(at(150)), 2.0),
        reading("b", Some(at(900)), 40.0),
        reading("c", Some(at(50)), 3.0),
    ];
    service.ingest().ingest_at(batch, at(1_000)).await.unwrap();
    let requested = vec!["c".to_owned(), "missing".to_owned(), "a".to_owned()];

    // execute
    let picked = service
        .query()
        .statistics(&requested, range(0, 500), AggregateFunction::Sum)
        .await
        .unwrap();
    let all = service
        .query()
        .statistics(&[], range(100, 900), AggregateFunction::Count)
        .await
        .unwrap();

    // validate
    let picked: Vec<(&str, f64)> = picked
        .iter()
        .map(|s| (s.sensor_id.as_str(), s.value))
        .collect();
    assert_eq!(vec![("c", 3.0), ("a", 6.0)], picked);
    let all: Vec<(&str, f64, i64)> = all
        .iter()
        .map(|s| (s.sensor_id.as_str(), s.value, s.count))
        .collect();
    assert_eq!(vec![("a", 2.0, 2), ("b", 1.0, 1)], all);
}

#[tokio::test]
async fn test_statistics_limits() {
    // prepare
    let store = MockStore::new();
    let policy = QueryPolicy {
        max_sensors: 2,
        ..QueryPolicy::default()
    };
    let service = SensorService::new(store.clone(), IngestPolicy::default(), policy);
    let three: Vec<String> = ["a", "b", "c"].iter().map(|id| id.to_string()).collect();

    // execute
    let too_many = service
        .query()
        .statistics(&three, range(0, 100), AggregateFunction::Avg)
        .await;
    let unknown = service
        .query()
        .statistic("nope", range(0, 100), AggregateFunction::Avg)
        .await;

    // validate
    assert_eq!(ErrorKind::Validation, too_many.unwrap_err().kind());
    assert_eq!(ErrorKind::NotFound, unknown.unwrap_err().kind());
}
