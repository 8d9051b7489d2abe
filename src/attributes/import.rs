//! Legacy attribute import path. Bulk/import workflows post a flat
//! `{definition_id: value}` map; stored values are replaced wholesale and a
//! change notification is emitted per attribute. Superseded by the value
//! setter whenever the new wire format is detected.
//!
//! The work is split into a pure planning step and an applying step. The
//! plan's change detection reads the chronologically latest prior value per
//! definition; it is not transactional with the delete-then-reconstruct
//! sequence, so concurrent imports against the same record can race.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::attributes::attributable::AttributableRecord;
use crate::attributes::error::AttributeError;
use crate::attributes::store::{DefinitionStore, ValueStore};
use crate::attributes::wire::{value_to_string, WireValue};
use crate::config;
use crate::database::models::definition::{CustomAttributeDefinition, DefinitionPayload};
use crate::database::models::value::{CustomAttributeValue, ValueError};
use crate::fulltext::{attribute_value_property, RecordPropertyIndex};
use crate::signals::{ChangeOperation, CustomAttributeChange, SignalBus};

/// Writable attribute portion of an import/update request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRequest {
    pub custom_attribute_values: Option<Vec<WireValue>>,
    pub custom_attribute_definitions: Option<Vec<DefinitionPayload>>,
    /// Legacy shape: `{"<definition_id>": <value>, ...}`. Ordered map so
    /// import order is deterministic.
    pub custom_attributes: Option<BTreeMap<String, Value>>,
}

impl ImportRequest {
    /// The new value API short-circuits this path entirely: a value entry
    /// carrying the `attribute_value` key (even as an explicit null) means
    /// the client posted full objects, not stubs, and the legacy map must be
    /// ignored.
    pub fn uses_value_api(&self) -> bool {
        self.custom_attribute_values
            .as_ref()
            .and_then(|values| values.first())
            .map(|first| first.attribute_value.is_some())
            .unwrap_or(false)
    }
}

/// Everything the apply step needs, computed without touching the database.
#[derive(Debug, Default)]
pub struct ImportPlan {
    pub delete_value_ids: Vec<i64>,
    pub fulltext_properties: Vec<String>,
    pub new_values: Vec<CustomAttributeValue>,
    pub notifications: Vec<CustomAttributeChange>,
}

/// Plan the replace-all import of a legacy attribute map.
pub fn plan_import(
    record: &AttributableRecord,
    current_values: &[CustomAttributeValue],
    definitions: &HashMap<i64, CustomAttributeDefinition>,
    attributes: &BTreeMap<String, Value>,
) -> Result<ImportPlan, AttributeError> {
    // Chronologically last prior value per definition; imports can have
    // written several rows for the same definition.
    let mut last_values: HashMap<i64, (DateTime<Utc>, Option<String>)> = HashMap::new();
    for value in current_values {
        let entry = last_values
            .entry(value.custom_attribute_id)
            .or_insert((value.created_at, value.attribute_value.clone()));
        if value.created_at > entry.0 {
            *entry = (value.created_at, value.attribute_value.clone());
        }
    }

    let delete_value_ids: Vec<i64> = current_values.iter().filter_map(|v| v.id).collect();
    let fulltext_properties: Vec<String> =
        delete_value_ids.iter().map(|id| attribute_value_property(*id)).collect();

    let mut plan = ImportPlan {
        delete_value_ids,
        fulltext_properties,
        ..Default::default()
    };

    for (key, raw) in attributes {
        let custom_attribute_id: i64 = key
            .parse()
            .map_err(|_| AttributeError::InvalidDefinitionId(key.clone()))?;
        let definition = definitions
            .get(&custom_attribute_id)
            .ok_or(AttributeError::DefinitionNotFound(custom_attribute_id))?;

        let incoming = value_to_string(raw);
        let mut new_value =
            CustomAttributeValue::new(custom_attribute_id, incoming.clone(), None);
        new_value.attributable_type = Some(record.type_name().to_string());
        new_value.attributable_id = record.id();

        let mut object_type = record.type_name().to_string();
        let mut object_id = record.id();

        if definition.field_type().map_err(ValueError::from)?.is_map() {
            // Map-typed imports encode the reference as "Type:id"
            let encoded = incoming.clone().unwrap_or_default();
            let parts: Vec<&str> = encoded.split(':').collect();
            let (mapped_type, mapped_id) = match parts.as_slice() {
                [mapped_type, mapped_id] => (
                    mapped_type.to_string(),
                    mapped_id
                        .parse::<i64>()
                        .map_err(|_| AttributeError::MalformedMapValue(encoded.clone()))?,
                ),
                _ => return Err(AttributeError::MalformedMapValue(encoded)),
            };
            new_value.attribute_value = Some(mapped_type.clone());
            new_value.attribute_object_id = Some(mapped_id);
            object_type = mapped_type;
            object_id = Some(mapped_id);
        }

        // Change detection compares the raw incoming value against the last
        // stored one; equal values emit nothing.
        let notification = match last_values.get(&custom_attribute_id) {
            Some((_, previous)) if *previous == incoming => None,
            Some((_, previous)) => Some(CustomAttributeChange {
                object_type,
                object_id,
                operation: ChangeOperation::Update,
                value: new_value.clone(),
                old: previous.clone(),
                service: record.type_name().to_string(),
            }),
            None => Some(CustomAttributeChange {
                object_type,
                object_id,
                operation: ChangeOperation::Insert,
                value: new_value.clone(),
                old: None,
                service: record.type_name().to_string(),
            }),
        };

        plan.new_values.push(new_value);
        plan.notifications.extend(notification);
    }

    Ok(plan)
}

/// Applies legacy imports: plans against the stored state, replaces the
/// index rows and value rows, rebuilds the working set, and dispatches
/// change notifications.
pub struct LegacyImporter<'a> {
    pool: &'a PgPool,
    index: &'a dyn RecordPropertyIndex,
    bus: &'a SignalBus,
}

impl<'a> LegacyImporter<'a> {
    pub fn new(pool: &'a PgPool, index: &'a dyn RecordPropertyIndex, bus: &'a SignalBus) -> Self {
        Self { pool, index, bus }
    }

    pub async fn custom_attributes(
        &self,
        record: &mut AttributableRecord,
        src: &ImportRequest,
    ) -> Result<(), AttributeError> {
        if src.uses_value_api() {
            return Ok(());
        }

        if let Some(payloads) = &src.custom_attribute_definitions {
            DefinitionStore::new(self.pool.clone()).process_definitions(record, payloads).await?;
        }

        let Some(attributes) = &src.custom_attributes else {
            return Ok(());
        };
        if attributes.is_empty() {
            return Ok(());
        }

        let threshold = config::config().attributes.import_warn_threshold;
        if attributes.len() > threshold {
            tracing::warn!(
                "Legacy import touches {} attributes on {} (threshold {})",
                attributes.len(),
                record.type_name(),
                threshold
            );
        }

        let value_store = ValueStore::new(self.pool.clone());
        let current_values = match record.id() {
            Some(record_id) => value_store.for_record(record.type_name(), record_id).await?,
            None => Vec::new(),
        };

        let definitions: HashMap<i64, CustomAttributeDefinition> =
            DefinitionStore::new(self.pool.clone())
                .for_type(record.model())
                .await?
                .into_iter()
                .map(|def| (def.id, def))
                .collect();

        let plan = plan_import(record, &current_values, &definitions, attributes)?;

        // Stale index rows first, then the value rows themselves
        self.index.delete_properties(record.type_name(), &plan.fulltext_properties).await?;
        value_store.delete_ids(&plan.delete_value_ids).await?;

        record.drop_values_by_id(&plan.delete_value_ids);
        for value in plan.new_values {
            record.attach_value(value);
        }

        if config::config().attributes.dispatch_signals {
            self.bus.dispatch_all(&plan.notifications).await;
        }
        Ok(())
    }
}
