use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::attributes::error::AttributeError;
use crate::attributes::wire::ValueInput;
use crate::database::models::definition::{CustomAttributeDefinition, FieldType};
use crate::database::models::value::{CustomAttributeValue, RequirementSet};
use crate::registry::ModelInfo;
use crate::utils::{convert_date_format, DATE_FORMAT_DB, DATE_FORMAT_WIRE};

/// In-memory custom attribute overlay for one record instance: the model
/// metadata, the definitions that apply to it, and the live working set of
/// values. Persistence goes through the stores; this type owns the
/// reconciliation semantics.
///
/// Invariant: at most one value per definition id in the working set. The
/// bulk setter reconciles incoming data against that key.
#[derive(Debug, Clone)]
pub struct AttributableRecord {
    model: ModelInfo,
    id: Option<i64>,
    definitions: Vec<CustomAttributeDefinition>,
    values: Vec<CustomAttributeValue>,
    /// Requirement fulfillment per definition id, derived from linked
    /// comments/evidence by the loading layer.
    fulfillments: HashMap<i64, RequirementSet>,
}

impl AttributableRecord {
    pub fn new(model: ModelInfo, id: Option<i64>) -> Self {
        Self {
            model,
            id,
            definitions: Vec::new(),
            values: Vec::new(),
            fulfillments: HashMap::new(),
        }
    }

    pub fn model(&self) -> &ModelInfo {
        &self.model
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.model.type_name
    }

    pub fn definition_type(&self) -> &str {
        &self.model.definition_type
    }

    pub fn definitions(&self) -> &[CustomAttributeDefinition] {
        &self.definitions
    }

    pub fn values(&self) -> &[CustomAttributeValue] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [CustomAttributeValue] {
        &mut self.values
    }

    /// Replace the loaded definition set (read path only; definition writes
    /// go through `DefinitionStore`).
    pub fn set_definitions(&mut self, definitions: Vec<CustomAttributeDefinition>) {
        self.definitions = definitions;
    }

    /// Replace the loaded working set of values.
    pub fn set_loaded_values(&mut self, values: Vec<CustomAttributeValue>) {
        self.values = values;
    }

    pub fn set_fulfillment(&mut self, custom_attribute_id: i64, fulfilled: RequirementSet) {
        self.fulfillments.insert(custom_attribute_id, fulfilled);
    }

    /// Drop persisted values whose rows have been deleted out from under the
    /// working set (legacy import replace-all).
    pub(crate) fn drop_values_by_id(&mut self, value_ids: &[i64]) {
        self.values.retain(|value| value.id.map(|id| !value_ids.contains(&id)).unwrap_or(true));
    }

    /// Attach a constructed value to this record. Stamps the owning identity
    /// onto the value and adds it to the working set; a later store save is
    /// what persists it.
    pub fn attach_value(&mut self, mut value: CustomAttributeValue) {
        value.attributable_type = Some(self.model.type_name.clone());
        value.attributable_id = self.id;
        self.values.push(value);
    }

    /// Bulk value setter. Accepts either typed value rows (back-end callers)
    /// or wire mappings (JSON layer); a batch must be homogeneous in shape.
    /// Empty input is a no-op. Reconciles against the working set by
    /// definition id: overwrite when present, attach when new.
    pub fn set_values(&mut self, inputs: Vec<ValueInput>) -> Result<(), AttributeError> {
        let Some(first) = inputs.first() else {
            return Ok(());
        };
        let wire_batch = first.is_wire();
        if inputs.iter().any(|input| input.is_wire() != wire_batch) {
            return Err(AttributeError::MixedValueInput);
        }

        for input in inputs {
            match input {
                ValueInput::Typed(value) => self.apply_typed(value),
                ValueInput::Wire(wire) => self.apply_wire(wire)?,
            }
        }
        Ok(())
    }

    fn position_for(&self, custom_attribute_id: i64) -> Option<usize> {
        self.values.iter().position(|v| v.custom_attribute_id == custom_attribute_id)
    }

    fn apply_typed(&mut self, value: CustomAttributeValue) {
        match self.position_for(value.custom_attribute_id) {
            Some(index) => {
                let existing = &mut self.values[index];
                existing.attribute_value = value.attribute_value;
                existing.attribute_object_id = value.attribute_object_id;
            }
            None => {
                self.attach_value(value);
            }
        }
    }

    fn apply_wire(&mut self, wire: crate::attributes::wire::WireValue) -> Result<(), AttributeError> {
        let object_id = wire.object_id();

        let Some(custom_attribute_id) = wire.custom_attribute_id else {
            if wire.href.is_some() {
                // Known client-shape mismatch: the front-end posted a stub
                // where a full value belongs. Dropped, not rejected.
                tracing::info!("Ignoring post/put of custom attribute stubs.");
                return Ok(());
            }
            return Err(AttributeError::BadValueInput);
        };

        match self.position_for(custom_attribute_id) {
            Some(index) => {
                let mut attribute_value = wire.value_string();
                if self.date_definition_ids().contains(&custom_attribute_id) {
                    if let Some(raw) = attribute_value {
                        attribute_value = Some(
                            convert_date_format(&raw, DATE_FORMAT_WIRE, DATE_FORMAT_DB).ok_or(
                                AttributeError::InvalidDate { custom_attribute_id, value: raw },
                            )?,
                        );
                    }
                }
                let owner_type = self.model.type_name.clone();
                let owner_id = self.id;
                let existing = &mut self.values[index];
                existing.attributable_type = Some(owner_type);
                existing.attributable_id = owner_id;
                existing.attribute_value = attribute_value;
                existing.attribute_object_id = object_id;
            }
            None => {
                self.attach_value(CustomAttributeValue::new(
                    custom_attribute_id,
                    wire.value_string(),
                    object_id,
                ));
            }
        }
        Ok(())
    }

    fn date_definition_ids(&self) -> HashSet<i64> {
        self.definitions
            .iter()
            .filter(|def| matches!(def.field_type(), Ok(FieldType::Date)))
            .map(|def| def.id)
            .collect()
    }

    /// Resolve each value's definition by id and run the value's own
    /// validation.
    pub fn validate_custom_attributes(&self) -> Result<(), AttributeError> {
        let map: HashMap<i64, &CustomAttributeDefinition> =
            self.definitions.iter().map(|def| (def.id, def)).collect();
        for value in &self.values {
            let definition = map
                .get(&value.custom_attribute_id)
                .ok_or(AttributeError::DefinitionNotFound(value.custom_attribute_id))?;
            value.validate(definition)?;
        }
        Ok(())
    }

    /// True if any mandatory definition lacks a non-empty value, or any
    /// value reports its own preconditions failure.
    pub fn preconditions_failed(&self) -> bool {
        let values_map: HashMap<i64, &CustomAttributeValue> =
            self.values.iter().map(|v| (v.custom_attribute_id, v)).collect();

        for definition in &self.definitions {
            if definition.mandatory {
                match values_map.get(&definition.id) {
                    Some(value) if value.has_value() => {}
                    _ => return true,
                }
            }
        }

        let definitions_map: HashMap<i64, &CustomAttributeDefinition> =
            self.definitions.iter().map(|def| (def.id, def)).collect();
        self.values.iter().any(|value| {
            definitions_map
                .get(&value.custom_attribute_id)
                .map(|def| {
                    let fulfilled = self
                        .fulfillments
                        .get(&value.custom_attribute_id)
                        .copied()
                        .unwrap_or_default();
                    value.preconditions_failed(def, fulfilled)
                })
                .unwrap_or(false)
        })
    }

    /// Snapshot representation layered over a base log map. The definitions
    /// are supplied by the caller from a direct table query, not from the
    /// possibly-stale loaded relation, so that field names are frozen as
    /// they were at log time. Both keys are always present.
    pub fn log_json_with(
        &self,
        mut base: Map<String, Value>,
        definitions: &[CustomAttributeDefinition],
    ) -> Value {
        if self.values.is_empty() {
            base.insert("custom_attributes".to_string(), Value::Array(Vec::new()));
            base.insert("custom_attribute_definitions".to_string(), Value::Array(Vec::new()));
        } else {
            base.insert(
                "custom_attributes".to_string(),
                Value::Array(self.values.iter().map(CustomAttributeValue::log_json).collect()),
            );
            base.insert(
                "custom_attribute_definitions".to_string(),
                Value::Array(
                    definitions.iter().map(CustomAttributeDefinition::log_json).collect(),
                ),
            );
        }
        Value::Object(base)
    }

    /// Definition ids referenced by the working set, for the log-time
    /// definition re-fetch.
    pub fn referenced_definition_ids(&self) -> Vec<i64> {
        self.values.iter().map(|v| v.custom_attribute_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::wire::WireValue;
    use chrono::Utc;
    use serde_json::json;

    fn model() -> ModelInfo {
        ModelInfo::new("Control")
    }

    fn definition(id: i64, attribute_type: &str, mandatory: bool) -> CustomAttributeDefinition {
        CustomAttributeDefinition {
            id,
            definition_type: "control".to_string(),
            definition_id: None,
            title: format!("Field {}", id),
            attribute_type: attribute_type.to_string(),
            mandatory,
            helptext: None,
            placeholder: None,
            multi_choice_options: None,
            multi_choice_mandatory: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn wire(value: Value) -> ValueInput {
        ValueInput::Wire(serde_json::from_value::<WireValue>(value).unwrap())
    }

    fn record_with(defs: Vec<CustomAttributeDefinition>) -> AttributableRecord {
        let mut record = AttributableRecord::new(model(), Some(1));
        record.set_definitions(defs);
        record
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut record = record_with(vec![]);
        record.set_values(Vec::new()).unwrap();
        assert!(record.values().is_empty());
    }

    #[test]
    fn mixed_batches_rejected() {
        let mut record = record_with(vec![definition(5, "Text", false)]);
        let err = record
            .set_values(vec![
                ValueInput::Typed(CustomAttributeValue::new(5, Some("a".into()), None)),
                wire(json!({"custom_attribute_id": 5, "attribute_value": "b"})),
            ])
            .unwrap_err();
        assert!(matches!(err, AttributeError::MixedValueInput));
    }

    #[test]
    fn repeated_upserts_keep_last_value() {
        let mut record = record_with(vec![definition(5, "Text", false)]);
        for value in ["first", "second", "third"] {
            record
                .set_values(vec![wire(json!({
                    "custom_attribute_id": 5,
                    "attribute_value": value
                }))])
                .unwrap();
        }
        assert_eq!(record.values().len(), 1);
        assert_eq!(record.values()[0].attribute_value.as_deref(), Some("third"));
    }

    #[test]
    fn attached_values_carry_owner_identity() {
        let mut record = record_with(vec![definition(5, "Text", false)]);
        record
            .set_values(vec![wire(json!({"custom_attribute_id": 5, "attribute_value": "x"}))])
            .unwrap();
        let value = &record.values()[0];
        assert_eq!(value.attributable_type.as_deref(), Some("Control"));
        assert_eq!(value.attributable_id, Some(1));
    }

    #[test]
    fn typed_values_overwrite_in_place() {
        let mut record = record_with(vec![definition(5, "Text", false)]);
        record.attach_value(CustomAttributeValue::new(5, Some("old".into()), Some(1)));
        record
            .set_values(vec![ValueInput::Typed(CustomAttributeValue::new(
                5,
                Some("new".into()),
                Some(2),
            ))])
            .unwrap();
        assert_eq!(record.values().len(), 1);
        assert_eq!(record.values()[0].attribute_value.as_deref(), Some("new"));
        assert_eq!(record.values()[0].attribute_object_id, Some(2));
    }

    #[test]
    fn stub_payload_is_dropped_silently() {
        let mut record = record_with(vec![]);
        record.set_values(vec![wire(json!({"href": "/api/x/5"}))]).unwrap();
        assert!(record.values().is_empty());
    }

    #[test]
    fn bad_payload_is_rejected() {
        let mut record = record_with(vec![]);
        let err = record.set_values(vec![wire(json!({"attribute_value": "x"}))]).unwrap_err();
        assert!(matches!(err, AttributeError::BadValueInput));
    }

    #[test]
    fn wire_dates_convert_on_overwrite() {
        let mut record = record_with(vec![definition(5, "Date", false)]);
        record.attach_value(CustomAttributeValue::new(5, Some("2023-06-01".into()), None));
        record
            .set_values(vec![wire(json!({
                "custom_attribute_id": 5,
                "attribute_value": "01/31/2024"
            }))])
            .unwrap();
        assert_eq!(record.values()[0].attribute_value.as_deref(), Some("2024-01-31"));
    }

    #[test]
    fn storage_format_dates_pass_through() {
        let mut record = record_with(vec![definition(5, "Date", false)]);
        record.attach_value(CustomAttributeValue::new(5, None, None));
        record
            .set_values(vec![wire(json!({
                "custom_attribute_id": 5,
                "attribute_value": "2024-01-01"
            }))])
            .unwrap();
        assert_eq!(record.values()[0].attribute_value.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn unparseable_wire_date_is_an_error() {
        let mut record = record_with(vec![definition(5, "Date", false)]);
        record.attach_value(CustomAttributeValue::new(5, None, None));
        let err = record
            .set_values(vec![wire(json!({
                "custom_attribute_id": 5,
                "attribute_value": "soon"
            }))])
            .unwrap_err();
        assert!(matches!(err, AttributeError::InvalidDate { .. }));
    }

    #[test]
    fn preconditions_fail_on_missing_mandatory() {
        let mut record = record_with(vec![definition(5, "Text", true)]);
        assert!(record.preconditions_failed());

        record.attach_value(CustomAttributeValue::new(5, Some(String::new()), None));
        assert!(record.preconditions_failed());

        record.set_loaded_values(vec![CustomAttributeValue::new(5, Some("done".into()), None)]);
        assert!(!record.preconditions_failed());
    }

    #[test]
    fn preconditions_fail_on_value_requirements() {
        let mut dropdown = definition(5, "Dropdown", false);
        dropdown.multi_choice_options = Some("minor,major".to_string());
        dropdown.multi_choice_mandatory = Some("0,2".to_string());
        let mut record = record_with(vec![dropdown]);
        record.attach_value(CustomAttributeValue::new(5, Some("major".into()), None));
        assert!(record.preconditions_failed());

        record.set_fulfillment(5, RequirementSet { comment: false, evidence: true });
        assert!(!record.preconditions_failed());
    }

    #[test]
    fn validation_resolves_definitions_by_id() {
        let mut record = record_with(vec![definition(5, "Date", false)]);
        record.attach_value(CustomAttributeValue::new(5, Some("2024-01-01".into()), None));
        assert!(record.validate_custom_attributes().is_ok());

        record.attach_value(CustomAttributeValue::new(9, Some("x".into()), None));
        assert!(matches!(
            record.validate_custom_attributes(),
            Err(AttributeError::DefinitionNotFound(9))
        ));
    }

    #[test]
    fn log_json_emits_empty_sequences_without_values() {
        let record = record_with(vec![]);
        let logged = record.log_json_with(Map::new(), &[]);
        assert_eq!(logged["custom_attributes"], json!([]));
        assert_eq!(logged["custom_attribute_definitions"], json!([]));
    }

    #[test]
    fn log_json_freezes_supplied_definitions() {
        let mut record = record_with(vec![definition(5, "Date", false)]);
        record.attach_value(CustomAttributeValue::new(5, Some("2024-01-01".into()), None));

        // Snapshot uses the definitions handed in, not the loaded relation
        let mut frozen = definition(5, "Date", false);
        frozen.title = "Original title".to_string();
        let logged = record.log_json_with(Map::new(), &[frozen]);

        assert_eq!(logged["custom_attributes"][0]["attribute_value"], "2024-01-01");
        assert_eq!(logged["custom_attribute_definitions"][0]["title"], "Original title");
    }
}
