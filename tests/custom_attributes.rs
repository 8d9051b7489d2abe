//! End-to-end exercises of the custom attribute surface through the public
//! API, using in-memory records only.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use grc_attributes::attributes::import::{plan_import, ImportRequest};
use grc_attributes::attributes::{AttributableRecord, AttributeError, ValueInput, WireValue};
use grc_attributes::database::models::definition::CustomAttributeDefinition;
use grc_attributes::database::models::value::{CustomAttributeValue, RequirementSet};
use grc_attributes::registry::{ModelInfo, ModelRegistry};
use grc_attributes::signals::{
    ChangeOperation, CustomAttributeChange, CustomAttributeListener, SignalBus, SignalError,
};

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

fn wire(payload: Value) -> ValueInput {
    ValueInput::Wire(serde_json::from_value::<WireValue>(payload).unwrap())
}

fn control_record(defs: Vec<CustomAttributeDefinition>) -> AttributableRecord {
    let mut record = AttributableRecord::new(ModelInfo::new("Control"), Some(1));
    record.set_definitions(defs);
    record
}

#[test]
fn wire_roundtrip_sets_validates_and_logs() -> anyhow::Result<()> {
    let defs = vec![definition(5, "Text", true), definition(6, "Date", false)];
    let mut record = control_record(defs.clone());

    record.set_values(vec![
        wire(json!({"custom_attribute_id": 5, "attribute_value": "answer"})),
        wire(json!({"custom_attribute_id": 6, "attribute_value": "2024-01-01"})),
    ])?;

    record.validate_custom_attributes()?;
    assert!(!record.preconditions_failed());

    let logged = record.log_json_with(Map::new(), &defs);
    assert_eq!(logged["custom_attributes"].as_array().unwrap().len(), 2);
    assert_eq!(
        logged["custom_attribute_definitions"].as_array().unwrap().len(),
        2
    );
    Ok(())
}

#[test]
fn repeated_wire_posts_converge_to_one_value_per_definition() {
    let mut record = control_record(vec![definition(5, "Text", false)]);

    for value in ["a", "b", "c"] {
        record
            .set_values(vec![wire(
                json!({"custom_attribute_id": 5, "attribute_value": value}),
            )])
            .unwrap();
    }

    assert_eq!(record.values().len(), 1);
    assert_eq!(record.values()[0].attribute_value.as_deref(), Some("c"));
    assert_eq!(record.values()[0].attributable_type.as_deref(), Some("Control"));
}

#[test]
fn stub_batches_leave_the_record_untouched() {
    let mut record = control_record(vec![]);

    record
        .set_values(vec![
            wire(json!({"href": "/api/custom_attribute_values/11"})),
            wire(json!({"href": "/api/custom_attribute_values/12"})),
        ])
        .unwrap();
    assert!(record.values().is_empty());

    let err = record
        .set_values(vec![wire(json!({"attribute_value": "no id, no href"}))])
        .unwrap_err();
    assert!(matches!(err, AttributeError::BadValueInput));
}

#[test]
fn dropdown_requirements_resolve_through_fulfillment() {
    let mut dropdown = definition(9, "Dropdown", false);
    dropdown.multi_choice_options = Some("low,high".to_string());
    dropdown.multi_choice_mandatory = Some("0,3".to_string());
    let mut record = control_record(vec![dropdown]);

    record
        .set_values(vec![wire(
            json!({"custom_attribute_id": 9, "attribute_value": "high"}),
        )])
        .unwrap();
    assert!(record.preconditions_failed());

    record.set_fulfillment(9, RequirementSet { comment: true, evidence: false });
    assert!(record.preconditions_failed());

    record.set_fulfillment(9, RequirementSet { comment: true, evidence: true });
    assert!(!record.preconditions_failed());
}

struct Recorder {
    seen: Arc<Mutex<Vec<(ChangeOperation, Option<String>)>>>,
}

#[async_trait]
impl CustomAttributeListener for Recorder {
    fn name(&self) -> &'static str {
        "Recorder"
    }

    async fn on_change(&self, change: &CustomAttributeChange) -> Result<(), SignalError> {
        self.seen
            .lock()
            .unwrap()
            .push((change.operation, change.old.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn legacy_plan_drives_signal_dispatch() {
    let record = control_record(vec![definition(7, "Text", false)]);

    let mut prior = CustomAttributeValue::new(7, Some("before".to_string()), None);
    prior.id = Some(40);

    let definitions: HashMap<i64, CustomAttributeDefinition> =
        [(7, definition(7, "Text", false))].into_iter().collect();
    let attributes: BTreeMap<String, Value> =
        [("7".to_string(), json!("after"))].into_iter().collect();

    let plan = plan_import(&record, &[prior], &definitions, &attributes).unwrap();
    assert_eq!(plan.delete_value_ids, vec![40]);
    assert_eq!(plan.fulltext_properties, vec!["attribute_value_40".to_string()]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut bus = SignalBus::new();
    bus.register(Box::new(Recorder { seen: seen.clone() }));
    bus.dispatch_all(&plan.notifications).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, ChangeOperation::Update);
    assert_eq!(seen[0].1.as_deref(), Some("before"));
}

#[test]
fn value_api_bodies_bypass_the_legacy_map() -> anyhow::Result<()> {
    let src: ImportRequest = serde_json::from_value(json!({
        "custom_attribute_values": [
            {"custom_attribute_id": 5, "attribute_value": "present"}
        ],
        "custom_attributes": {"7": "stale"}
    }))?;
    assert!(src.uses_value_api());
    Ok(())
}

#[test]
fn registry_resolves_definition_sources() {
    let mut registry = ModelRegistry::new();
    registry.register(
        ModelInfo::new("Assessment").with_extra_definition_source("assessment_template"),
    );
    registry.register(ModelInfo::new("RiskAssessment"));

    let assessment = registry.get("Assessment").unwrap();
    assert_eq!(assessment.definition_type, "assessment");
    assert_eq!(
        assessment.definition_sources(),
        vec!["assessment", "assessment_template"]
    );

    let risk = registry.get("RiskAssessment").unwrap();
    assert_eq!(risk.definition_type, "risk_assessment");
}
