use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A named source of readings, as persisted by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Sensor {
    pub id: String,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registration request for a sensor
///
/// Every metadata field is optional, a reading for an unseen sensor
/// registers it with whatever it carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSpec {
    pub id: String,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub location: Option<String>,
}

impl SensorSpec {
    pub fn new(id: impl Into<String>) -> Self {
        SensorSpec {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Folds the metadata of `other` into `self`
    ///
    /// Fails with the name of the first field on which both sides carry
    /// different values.
    pub fn merge(&mut self, other: &SensorSpec) -> Result<(), &'static str> {
        merge_field(&mut self.name, &other.name, "name")?;
        merge_field(&mut self.unit, &other.unit, "unit")?;
        merge_field(&mut self.location, &other.location, "location")?;
        Ok(())
    }
}

fn merge_field(
    target: &mut Option<String>,
    other: &Option<String>,
    field: &'static str,
) -> Result<(), &'static str> {
    match (target.as_ref(), other) {
        (Some(current), Some(incoming)) if current != incoming => Err(field),
        (None, Some(incoming)) => {
            *target = Some(incoming.clone());
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Outcome of a find-or-create
#[derive(Debug, Clone, PartialEq)]
pub enum Upserted<T> {
    Created(T),
    Existing(T),
}

impl<T> Upserted<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Upserted::Created(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Upserted::Created(inner) | Upserted::Existing(inner) => inner,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Upserted::Created(inner) | Upserted::Existing(inner) => inner,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_merge_fills_missing_fields() {
        // prepare
        let mut spec = SensorSpec::new("s1");
        let other = SensorSpec {
            id: "s1".to_owned(),
            name: Some("Greenhouse".to_owned()),
            unit: Some("C".to_owned()),
            location: None,
        };

        // execute
        let res = spec.merge(&other);

        // validate
        assert!(res.is_ok());
        assert_eq!(Some("Greenhouse".to_owned()), spec.name);
        assert_eq!(Some("C".to_owned()), spec.unit);
        assert_eq!(None, spec.location);
    }

    #[test]
    fn test_merge_detects_conflicting_unit() {
        let mut spec = SensorSpec {
            unit: Some("C".to_owned()),
            ..SensorSpec::new("s1")
        };
        let other = SensorSpec {
            unit: Some("F".to_owned()),
            ..SensorSpec::new("s1")
        };

        assert_eq!(Err("unit"), spec.merge(&other));
    }

    #[test]
    fn test_upserted_accessors() {
        let created = Upserted::Created(1);
        let existing = Upserted::Existing(2);

        assert!(created.is_created());
        assert!(!existing.is_created());
        assert_eq!(&1, created.get());
        assert_eq!(2, existing.into_inner());
    }
}
