use crate::error::DBError;
use chrono::{DateTime, Utc};
use sensor_core::reading::from_micros;
use sensor_core::{AggregateFunction, Bucket, BucketSize, Reading, SensorStatistic, TimeRange};
use sqlx::PgConnection;

#[derive(sqlx::FromRow)]
pub struct ReadingDao {
    pub(crate) sensor_id: String,
    pub(crate) ts: DateTime<Utc>,
    pub(crate) value: f64,
    pub(crate) quality: Option<String>,
}

impl From<ReadingDao> for Reading {
    fn from(val: ReadingDao) -> Self {
        Reading {
            sensor_id: val.sensor_id,
            timestamp: val.ts,
            value: val.value,
            // the column is constrained to the known flags
            quality: val.quality.and_then(|q| q.parse().ok()),
        }
    }
}

/// Returns false if the (sensor, timestamp) pair is already stored
pub async fn insert(conn: &mut PgConnection, reading: &Reading) -> Result<bool, DBError> {
    let result = sql_stmnt!(
        r#"INSERT INTO readings (sensor_id, ts, value, quality)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sensor_id, ts) DO NOTHING"#,
        reading.sensor_id.as_str(),
        reading.timestamp,
        reading.value,
        reading.quality.map(|q| q.as_str())
    )
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// READ readings of `range`, ascending, strictly after `after`
pub async fn get(
    conn: &mut PgConnection,
    sensor_id: &str,
    range: &TimeRange,
    after: Option<DateTime<Utc>>,
    limit: Option<i64>,
) -> Result<Vec<ReadingDao>, DBError> {
    Ok(sql_stmnt!(
        ReadingDao,
        r#"SELECT sensor_id, ts, value, quality
            FROM readings
            WHERE sensor_id = $1
            AND ts >= $2 AND ts < $3
            AND ($4::timestamptz IS NULL OR ts > $4)
            ORDER BY ts ASC
            LIMIT $5"#,
        sensor_id,
        range.from(),
        range.until(),
        after,
        limit
    )
    .fetch_all(conn)
    .await?)
}

#[derive(sqlx::FromRow)]
pub struct BucketDao {
    pub(crate) start_micros: i64,
    pub(crate) value: Option<f64>,
}

impl BucketDao {
    pub fn into_bucket(self) -> Option<Bucket> {
        Some(Bucket {
            start: from_micros(self.start_micros)?,
            value: self.value?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct StatisticDao {
    pub(crate) sensor_id: String,
    pub(crate) value: Option<f64>,
    pub(crate) count: i64,
}

impl StatisticDao {
    pub fn into_statistic(self) -> Option<SensorStatistic> {
        Some(SensorStatistic {
            sensor_id: self.sensor_id,
            value: self.value?,
            count: self.count,
        })
    }
}

/// Only ever one of these fixed names is spliced into a statement
fn sql_function(function: AggregateFunction) -> &'static str {
    match function {
        AggregateFunction::Min => "min",
        AggregateFunction::Max => "max",
        AggregateFunction::Avg => "avg",
        AggregateFunction::Count => "count",
        AggregateFunction::Sum => "sum",
    }
}

/// Buckets start at multiples of `size` since the epoch, in microseconds.
/// Groups without readings do not exist, so empty buckets are never returned.
pub async fn aggregate(
    conn: &mut PgConnection,
    sensor_id: &str,
    range: &TimeRange,
    size: BucketSize,
    function: AggregateFunction,
) -> Result<Vec<BucketDao>, DBError> {
    let stmt = format!(
        r#"SELECT floor(micros::numeric / $2::bigint)::bigint * $2::bigint AS start_micros,
                {}(value)::float8 AS value
            FROM (
                SELECT EXTRACT(EPOCH FROM date_trunc('second', ts))::bigint * 1000000
                    + EXTRACT(MICROSECONDS FROM ts)::bigint % 1000000 AS micros,
                    value
                FROM readings
                WHERE sensor_id = $1
                AND ts >= $3 AND ts < $4
            ) AS aligned
            GROUP BY 1
            ORDER BY 1 ASC"#,
        sql_function(function)
    );
    Ok(sql_stmnt!(
        BucketDao,
        &stmt,
        sensor_id,
        size.micros(),
        range.from(),
        range.until()
    )
    .fetch_all(conn)
    .await?)
}

/// One row per sensor with readings in `range`, an empty `sensor_ids` matches all
pub async fn summarize(
    conn: &mut PgConnection,
    sensor_ids: &[String],
    range: &TimeRange,
    function: AggregateFunction,
) -> Result<Vec<StatisticDao>, DBError> {
    let stmt = format!(
        r#"SELECT sensor_id, {}(value)::float8 AS value, count(*) AS count
            FROM readings
            WHERE (cardinality($1::text[]) = 0 OR sensor_id = ANY($1))
            AND ts >= $2 AND ts < $3
            GROUP BY sensor_id
            ORDER BY sensor_id ASC"#,
        sql_function(function)
    );
    Ok(sql_stmnt!(StatisticDao, &stmt, sensor_ids, range.from(), range.until())
        .fetch_all(conn)
        .await?)
}
