//! Persistence for definitions and values. The in-memory reconciliation
//! lives on `AttributableRecord`; everything here is explicit SQL against
//! the attribute tables.

use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::attributes::attributable::AttributableRecord;
use crate::attributes::error::AttributeError;
use crate::database::manager::DatabaseError;
use crate::database::models::definition::{
    CustomAttributeDefinition, DefinitionPayload, FieldType,
};
use crate::database::models::value::{CustomAttributeValue, ValueError};
use crate::registry::ModelInfo;

const DEFINITION_COLUMNS: &str = "id, definition_type, definition_id, title, attribute_type, \
     mandatory, helptext, placeholder, multi_choice_options, multi_choice_mandatory, \
     created_at, updated_at";

const VALUE_COLUMNS: &str = "id, attributable_type, attributable_id, custom_attribute_id, \
     attribute_value, attribute_object_id, created_at, updated_at";

pub struct DefinitionStore {
    pool: PgPool,
}

impl DefinitionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All definitions applicable to a record type: its own definition type
    /// plus any extra sources the registry lists (template inheritance).
    pub async fn for_type(
        &self,
        model: &ModelInfo,
    ) -> Result<Vec<CustomAttributeDefinition>, DatabaseError> {
        let sources: Vec<String> =
            model.definition_sources().iter().map(|s| s.to_string()).collect();
        let definitions = sqlx::query_as::<_, CustomAttributeDefinition>(&format!(
            "SELECT {} FROM custom_attribute_definitions
             WHERE definition_type = ANY($1)
             ORDER BY id",
            DEFINITION_COLUMNS
        ))
        .bind(&sources)
        .fetch_all(&self.pool)
        .await?;
        Ok(definitions)
    }

    /// Definitions applicable to one record instance: globals (null owning
    /// id) plus the instance's own rows. Read path only; writes go through
    /// `insert_definition`/`process_definitions`.
    pub async fn for_instance(
        &self,
        model: &ModelInfo,
        record_id: Option<i64>,
    ) -> Result<Vec<CustomAttributeDefinition>, DatabaseError> {
        let sources: Vec<String> =
            model.definition_sources().iter().map(|s| s.to_string()).collect();
        let definitions = sqlx::query_as::<_, CustomAttributeDefinition>(&format!(
            "SELECT {} FROM custom_attribute_definitions
             WHERE definition_type = ANY($1)
               AND (definition_id IS NULL OR definition_id = $2)
             ORDER BY id",
            DEFINITION_COLUMNS
        ))
        .bind(&sources)
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(definitions)
    }

    /// Batched variant of `for_instance` for eager loading: globals plus the
    /// rows owned by any of the given records.
    pub async fn for_instances(
        &self,
        model: &ModelInfo,
        record_ids: &[i64],
    ) -> Result<Vec<CustomAttributeDefinition>, DatabaseError> {
        let sources: Vec<String> =
            model.definition_sources().iter().map(|s| s.to_string()).collect();
        let definitions = sqlx::query_as::<_, CustomAttributeDefinition>(&format!(
            "SELECT {} FROM custom_attribute_definitions
             WHERE definition_type = ANY($1)
               AND (definition_id IS NULL OR definition_id = ANY($2))
             ORDER BY id",
            DEFINITION_COLUMNS
        ))
        .bind(&sources)
        .bind(record_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(definitions)
    }

    /// Definitions referenced by a set of ids, fetched directly from the
    /// table (used by revision logging to freeze names).
    pub async fn load_for_values(
        &self,
        definition_type: &str,
        definition_ids: &[i64],
    ) -> Result<Vec<CustomAttributeDefinition>, DatabaseError> {
        if definition_ids.is_empty() {
            return Ok(Vec::new());
        }
        let definitions = sqlx::query_as::<_, CustomAttributeDefinition>(&format!(
            "SELECT {} FROM custom_attribute_definitions
             WHERE definition_type = $1 AND id = ANY($2)
             ORDER BY id",
            DEFINITION_COLUMNS
        ))
        .bind(definition_type)
        .bind(definition_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(definitions)
    }

    /// Insert a new definition from a client payload, stamping the owning
    /// type name. The field-type tag must belong to the closed set.
    pub async fn insert_definition(
        &self,
        model: &ModelInfo,
        payload: &DefinitionPayload,
    ) -> Result<CustomAttributeDefinition, AttributeError> {
        FieldType::from_tag(&payload.attribute_type).map_err(ValueError::from)?;

        let definition = sqlx::query_as::<_, CustomAttributeDefinition>(&format!(
            "INSERT INTO custom_attribute_definitions
             (definition_type, definition_id, title, attribute_type, mandatory,
              helptext, placeholder, multi_choice_options, multi_choice_mandatory,
              created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now())
             RETURNING {}",
            DEFINITION_COLUMNS
        ))
        .bind(&model.definition_type)
        .bind(payload.definition_id)
        .bind(&payload.title)
        .bind(&payload.attribute_type)
        .bind(payload.mandatory)
        .bind(&payload.helptext)
        .bind(&payload.placeholder)
        .bind(&payload.multi_choice_options)
        .bind(&payload.multi_choice_mandatory)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(definition)
    }

    /// Delete the definitions owned by one record instance. The predicate
    /// requires a concrete owning id, so global rows (null `definition_id`)
    /// are never touched.
    pub async fn delete_owned(
        &self,
        model: &ModelInfo,
        record_id: i64,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM custom_attribute_definitions
             WHERE definition_type = $1 AND definition_id = $2",
        )
        .bind(&model.definition_type)
        .bind(record_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Destructive replace-all of a record's own definitions, in the order
    /// supplied (order becomes display/evaluation order downstream).
    /// Only applies to models registered with per-object definitions.
    ///
    /// The delete runs as its own committed statement before the inserts to
    /// satisfy referential-integrity ordering; this is not atomic with any
    /// enclosing transaction, and a failure between the two halves leaves
    /// the record with no definitions.
    pub async fn process_definitions(
        &self,
        record: &AttributableRecord,
        payloads: &[DefinitionPayload],
    ) -> Result<(), AttributeError> {
        if !record.model().per_object_definitions {
            return Ok(());
        }

        if let Some(record_id) = record.id() {
            let deleted = self.delete_owned(record.model(), record_id).await?;
            tracing::debug!(
                "Replaced {} definitions for {} {}",
                deleted,
                record.type_name(),
                record_id
            );
        }

        for payload in payloads {
            if payload.pending_delete {
                continue;
            }
            self.insert_definition(record.model(), payload).await?;
        }
        Ok(())
    }
}

pub struct ValueStore {
    pool: PgPool,
}

impl ValueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn for_record(
        &self,
        type_name: &str,
        record_id: i64,
    ) -> Result<Vec<CustomAttributeValue>, DatabaseError> {
        let values = sqlx::query_as::<_, CustomAttributeValue>(&format!(
            "SELECT {} FROM custom_attribute_values
             WHERE attributable_type = $1 AND attributable_id = $2
             ORDER BY id",
            VALUE_COLUMNS
        ))
        .bind(type_name)
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(values)
    }

    /// Batched load for a set of record ids (eager loading).
    pub async fn for_records(
        &self,
        type_name: &str,
        record_ids: &[i64],
    ) -> Result<Vec<CustomAttributeValue>, DatabaseError> {
        if record_ids.is_empty() {
            return Ok(Vec::new());
        }
        let values = sqlx::query_as::<_, CustomAttributeValue>(&format!(
            "SELECT {} FROM custom_attribute_values
             WHERE attributable_type = $1 AND attributable_id = ANY($2)
             ORDER BY id",
            VALUE_COLUMNS
        ))
        .bind(type_name)
        .bind(record_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(values)
    }

    pub async fn delete_ids(&self, value_ids: &[i64]) -> Result<u64, DatabaseError> {
        if value_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM custom_attribute_values WHERE id = ANY($1)")
            .bind(value_ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Cascade deletion of a record's values. Values whose definition no
    /// longer exists are left alone: deleting those alongside an unrelated
    /// record would cross-delete shared data.
    pub async fn delete_for_record(
        &self,
        type_name: &str,
        record_id: i64,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM custom_attribute_values
             WHERE attributable_type = $1 AND attributable_id = $2
               AND custom_attribute_id IN (SELECT id FROM custom_attribute_definitions)",
        )
        .bind(type_name)
        .bind(record_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Persist the record's working set: insert unpersisted values, update
    /// the rest in place (values are superseded, not versioned).
    pub async fn save_record_values(
        &self,
        record: &mut AttributableRecord,
    ) -> Result<(), DatabaseError> {
        for value in record.values_mut() {
            match value.id {
                None => {
                    let saved = sqlx::query_as::<_, CustomAttributeValue>(&format!(
                        "INSERT INTO custom_attribute_values
                         (attributable_type, attributable_id, custom_attribute_id,
                          attribute_value, attribute_object_id, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, now(), now())
                         RETURNING {}",
                        VALUE_COLUMNS
                    ))
                    .bind(&value.attributable_type)
                    .bind(value.attributable_id)
                    .bind(value.custom_attribute_id)
                    .bind(&value.attribute_value)
                    .bind(value.attribute_object_id)
                    .fetch_one(&self.pool)
                    .await?;
                    *value = saved;
                }
                Some(id) => {
                    sqlx::query(
                        "UPDATE custom_attribute_values
                         SET attribute_value = $1, attribute_object_id = $2, updated_at = now()
                         WHERE id = $3",
                    )
                    .bind(&value.attribute_value)
                    .bind(value.attribute_object_id)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                }
            }
        }
        Ok(())
    }
}

/// Load one record's attribute overlay: applicable definitions plus the
/// stored working set.
pub async fn load_record(
    pool: &PgPool,
    model: ModelInfo,
    record_id: i64,
) -> Result<AttributableRecord, AttributeError> {
    let definitions =
        DefinitionStore::new(pool.clone()).for_instance(&model, Some(record_id)).await?;
    let values =
        ValueStore::new(pool.clone()).for_record(&model.type_name, record_id).await?;

    let mut record = AttributableRecord::new(model, Some(record_id));
    record.set_definitions(definitions);
    record.set_loaded_values(values);
    Ok(record)
}

/// Cascade deletion when the owning record is removed: owned values (but
/// never definition-less orphans) and owned definitions (but never globals).
pub async fn cascade_delete(
    pool: &PgPool,
    record: &AttributableRecord,
) -> Result<(), DatabaseError> {
    let Some(record_id) = record.id() else {
        return Ok(());
    };
    ValueStore::new(pool.clone()).delete_for_record(record.type_name(), record_id).await?;
    DefinitionStore::new(pool.clone()).delete_owned(record.model(), record_id).await?;
    Ok(())
}

/// Snapshot log representation for revision trails. Re-fetches the
/// referenced definitions from the table rather than trusting the loaded
/// relation, so deleted or renamed definitions are frozen as they are now.
pub async fn log_json(
    pool: &PgPool,
    record: &AttributableRecord,
    base: Map<String, Value>,
) -> Result<Value, AttributeError> {
    if record.values().is_empty() {
        return Ok(record.log_json_with(base, &[]));
    }
    let definitions = DefinitionStore::new(pool.clone())
        .load_for_values(record.definition_type(), &record.referenced_definition_ids())
        .await?;
    Ok(record.log_json_with(base, &definitions))
}
