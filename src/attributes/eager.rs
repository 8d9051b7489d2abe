//! Batched prefetch of attribute data for a page of records. One query per
//! association (definitions, values, value revisions, comments for
//! commentable models) instead of one per row.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::attributes::attributable::AttributableRecord;
use crate::attributes::store::{DefinitionStore, ValueStore};
use crate::database::manager::DatabaseError;
use crate::database::models::comment::Comment;
use crate::database::models::definition::CustomAttributeDefinition;
use crate::database::models::value::{CustomAttributeValue, RequirementSet};
use crate::database::models::revision::Revision;
use crate::registry::ModelInfo;

/// Prefetched attribute data, keyed by record id where instance-scoped.
#[derive(Debug, Default)]
pub struct Preload {
    pub definitions: Vec<CustomAttributeDefinition>,
    pub values_by_record: HashMap<i64, Vec<CustomAttributeValue>>,
    pub revisions_by_value: HashMap<i64, Vec<Revision>>,
    pub comments_by_record: HashMap<i64, Vec<Comment>>,
}

pub async fn preload(
    pool: &PgPool,
    model: &ModelInfo,
    record_ids: &[i64],
) -> Result<Preload, DatabaseError> {
    if record_ids.is_empty() {
        return Ok(Preload::default());
    }

    let definitions = DefinitionStore::new(pool.clone()).for_instances(model, record_ids).await?;
    let values = ValueStore::new(pool.clone()).for_records(&model.type_name, record_ids).await?;

    let value_ids: Vec<i64> = values.iter().filter_map(|v| v.id).collect();
    let mut revisions_by_value: HashMap<i64, Vec<Revision>> = HashMap::new();
    if !value_ids.is_empty() {
        let revisions = sqlx::query_as::<_, Revision>(
            "SELECT id, resource_type, resource_id, action, content, created_at
             FROM revisions
             WHERE resource_type = 'CustomAttributeValue' AND resource_id = ANY($1)
             ORDER BY id",
        )
        .bind(&value_ids)
        .fetch_all(pool)
        .await?;
        for revision in revisions {
            revisions_by_value.entry(revision.resource_id).or_default().push(revision);
        }
    }

    let mut comments_by_record: HashMap<i64, Vec<Comment>> = HashMap::new();
    if model.commentable {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT id, commentable_type, commentable_id, description,
                    custom_attribute_definition_id, created_at, updated_at
             FROM comments
             WHERE commentable_type = $1 AND commentable_id = ANY($2)
             ORDER BY id",
        )
        .bind(&model.type_name)
        .bind(record_ids)
        .fetch_all(pool)
        .await?;
        for comment in comments {
            comments_by_record.entry(comment.commentable_id).or_default().push(comment);
        }
    }

    let mut values_by_record: HashMap<i64, Vec<CustomAttributeValue>> = HashMap::new();
    for value in values {
        if let Some(record_id) = value.attributable_id {
            values_by_record.entry(record_id).or_default().push(value);
        }
    }

    Ok(Preload {
        definitions,
        values_by_record,
        revisions_by_value,
        comments_by_record,
    })
}

/// Assemble one record's overlay from prefetched data: its applicable
/// definitions (globals plus its own), its values, and comment-based
/// requirement fulfillment. Evidence fulfillment is resolved by the host
/// application, which owns the evidence linkage.
pub fn build_record(model: &ModelInfo, record_id: i64, preload: &Preload) -> AttributableRecord {
    let mut record = AttributableRecord::new(model.clone(), Some(record_id));

    record.set_definitions(
        preload
            .definitions
            .iter()
            .filter(|def| def.definition_id.is_none() || def.definition_id == Some(record_id))
            .cloned()
            .collect(),
    );
    record.set_loaded_values(
        preload.values_by_record.get(&record_id).cloned().unwrap_or_default(),
    );

    if let Some(comments) = preload.comments_by_record.get(&record_id) {
        for comment in comments {
            if let Some(definition_id) = comment.custom_attribute_definition_id {
                record.set_fulfillment(
                    definition_id,
                    RequirementSet { comment: true, evidence: false },
                );
            }
        }
    }

    record
}
