pub mod aggregate;
pub mod error;
pub mod range;
pub mod reading;
pub mod sensor;

pub use aggregate::{AggregateFunction, Aggregator, Bucket, BucketSize, SensorStatistic};
pub use range::TimeRange;
pub use reading::{Quality, Reading};
pub use sensor::{Sensor, SensorSpec, Upserted};

pub static CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
