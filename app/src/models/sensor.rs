use crate::error::DBError;
use chrono::{DateTime, Utc};
use sensor_core::{Sensor, SensorSpec, Upserted};
use sqlx::PgConnection;

#[derive(sqlx::FromRow, Debug)]
pub struct SensorDao {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
    pub(crate) unit: Option<String>,
    pub(crate) location: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

impl SensorDao {
    fn is_covering(&self, spec: &SensorSpec) -> bool {
        covers(&self.name, &spec.name)
            && covers(&self.unit, &spec.unit)
            && covers(&self.location, &spec.location)
    }
}

fn covers(stored: &Option<String>, requested: &Option<String>) -> bool {
    requested.is_none() || stored == requested
}

impl From<SensorDao> for Sensor {
    fn from(val: SensorDao) -> Self {
        Sensor {
            id: val.id,
            name: val.name,
            unit: val.unit,
            location: val.location,
            created_at: val.created_at,
        }
    }
}

/// Find-or-create
///
/// An existing row gets the provided name and location, the unit may only
/// be set once.
pub async fn upsert(
    conn: &mut PgConnection,
    spec: &SensorSpec,
) -> Result<Upserted<SensorDao>, DBError> {
    let created = sql_stmnt!(
        SensorDao,
        r#"INSERT INTO sensors (id, name, unit, location) VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, name, unit, location, created_at"#,
        &spec.id,
        spec.name.as_deref(),
        spec.unit.as_deref(),
        spec.location.as_deref()
    )
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(dao) = created {
        return Ok(Upserted::Created(dao));
    }

    let current = sql_stmnt!(
        SensorDao,
        "SELECT id, name, unit, location, created_at FROM sensors WHERE id = $1 FOR UPDATE",
        &spec.id
    )
    .fetch_one(&mut *conn)
    .await?;

    if let (Some(stored), Some(requested)) = (&current.unit, &spec.unit) {
        if stored != requested {
            return Err(DBError::UnitConflict {
                id: spec.id.clone(),
                stored: stored.clone(),
                requested: requested.clone(),
            });
        }
    }
    if current.is_covering(spec) {
        return Ok(Upserted::Existing(current));
    }

    let updated = sql_stmnt!(
        SensorDao,
        r#"UPDATE sensors
            SET name = COALESCE($2, name), unit = COALESCE($3, unit), location = COALESCE($4, location)
            WHERE id = $1
            RETURNING id, name, unit, location, created_at"#,
        &spec.id,
        spec.name.as_deref(),
        spec.unit.as_deref(),
        spec.location.as_deref()
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(Upserted::Existing(updated))
}

pub async fn get(conn: &mut PgConnection, sensor_id: &str) -> Result<SensorDao, DBError> {
    sql_stmnt!(
        SensorDao,
        "SELECT id, name, unit, location, created_at FROM sensors WHERE id = $1",
        sensor_id
    )
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| DBError::SensorNotFound(sensor_id.to_owned()))
}

/// READ sensors
pub async fn read(conn: &mut PgConnection) -> Result<Vec<SensorDao>, DBError> {
    Ok(sql_stmnt!(
        SensorDao,
        "SELECT id, name, unit, location, created_at FROM sensors ORDER BY id ASC"
    )
    .fetch_all(conn)
    .await?)
}

pub async fn exists(conn: &mut PgConnection, sensor_id: &str) -> Result<bool, DBError> {
    let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM sensors WHERE id = $1")
        .bind(sensor_id)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}
