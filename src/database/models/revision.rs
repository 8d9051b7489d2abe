use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Audit trail entry for a resource. Attribute values link to their
/// revisions so history views can render without per-row queries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Revision {
    pub id: i64,
    pub resource_type: String,
    pub resource_id: i64,
    pub action: String,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
