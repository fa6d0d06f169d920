/// All instance record primary keys are BIGSERIAL on the Postgres side.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
