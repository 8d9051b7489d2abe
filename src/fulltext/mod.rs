//! Full-text index record store. The indexing backend itself is external;
//! this layer only removes stale index rows when attribute values are
//! replaced, keyed by owning type and property name.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::manager::DatabaseError;

/// Index property name for one attribute value row.
pub fn attribute_value_property(value_id: i64) -> String {
    format!("attribute_value_{}", value_id)
}

#[async_trait]
pub trait RecordPropertyIndex: Send + Sync {
    /// Delete all index rows for the given owning type and property names.
    /// Returns the number of rows removed.
    async fn delete_properties(
        &self,
        object_type: &str,
        properties: &[String],
    ) -> Result<u64, DatabaseError>;
}

/// Postgres-backed index store over the `record_properties` table.
pub struct PgRecordPropertyIndex {
    pool: PgPool,
}

impl PgRecordPropertyIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordPropertyIndex for PgRecordPropertyIndex {
    async fn delete_properties(
        &self,
        object_type: &str,
        properties: &[String],
    ) -> Result<u64, DatabaseError> {
        if properties.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM record_properties
             WHERE object_type = $1 AND property = ANY($2)",
        )
        .bind(object_type)
        .bind(properties)
        .execute(&self.pool)
        .await?;
        tracing::debug!(
            "Deleted {} index rows for {} ({} properties)",
            result.rows_affected(),
            object_type,
            properties.len()
        );
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_names_follow_value_ids() {
        assert_eq!(attribute_value_property(42), "attribute_value_42");
    }
}
