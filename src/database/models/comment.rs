use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Comment on a commentable record. Only loaded here to batch-prefetch
/// alongside attribute data and to fulfill comment requirements on dropdown
/// attributes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub commentable_type: String,
    pub commentable_id: i64,
    pub description: Option<String>,
    /// Definition id of the attribute this comment fulfills, when the
    /// comment was left against a specific custom attribute.
    pub custom_attribute_definition_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
