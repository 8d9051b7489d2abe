use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::database::models::definition::{CustomAttributeDefinition, FieldType};
use crate::utils::DATE_FORMAT_DB;

/// Requirement flag: the chosen dropdown option demands a linked comment.
pub const REQUIREMENT_COMMENT: u8 = 1;
/// Requirement flag: the chosen dropdown option demands linked evidence.
pub const REQUIREMENT_EVIDENCE: u8 = 2;

/// Which per-value requirements have been fulfilled by linked objects.
/// Populated by the layer that loads comments/evidence for a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequirementSet {
    pub comment: bool,
    pub evidence: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("Mandatory attribute '{0}' has no value")]
    MissingMandatory(String),
    #[error("Invalid date value '{value}' for attribute '{title}'")]
    InvalidDate { title: String, value: String },
    #[error("Value '{value}' is not a valid option for attribute '{title}'")]
    NotInOptions { title: String, value: String },
    #[error("Invalid checkbox value '{value}' for attribute '{title}'")]
    InvalidCheckbox { title: String, value: String },
    #[error("Attribute '{0}' requires a mapped object reference")]
    MissingReference(String),
    #[error(transparent)]
    UnknownFieldType(#[from] crate::database::models::definition::UnknownFieldType),
}

/// One field's value on one record instance. `id` is None until the row has
/// been persisted; `attributable_*` are None until the value is attached to
/// its owning record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomAttributeValue {
    pub id: Option<i64>,
    pub attributable_type: Option<String>,
    pub attributable_id: Option<i64>,
    pub custom_attribute_id: i64,
    pub attribute_value: Option<String>,
    pub attribute_object_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomAttributeValue {
    /// Construct an unattached value. Attachment to the owning record is a
    /// separate, explicit step (`AttributableRecord::attach_value`).
    pub fn new(
        custom_attribute_id: i64,
        attribute_value: Option<String>,
        attribute_object_id: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            attributable_type: None,
            attributable_id: None,
            custom_attribute_id,
            attribute_value,
            attribute_object_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn has_value(&self) -> bool {
        self.attribute_value.as_deref().map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Validate the stored value against its definition.
    pub fn validate(&self, definition: &CustomAttributeDefinition) -> Result<(), ValueError> {
        let field_type = definition.field_type()?;

        if !self.has_value() {
            if definition.mandatory {
                return Err(ValueError::MissingMandatory(definition.title.clone()));
            }
            return Ok(());
        }
        let value = self.attribute_value.as_deref().unwrap_or_default();

        match field_type {
            FieldType::Text | FieldType::RichText => Ok(()),
            FieldType::Date => {
                NaiveDate::parse_from_str(value, DATE_FORMAT_DB).map(|_| ()).map_err(|_| {
                    ValueError::InvalidDate {
                        title: definition.title.clone(),
                        value: value.to_string(),
                    }
                })
            }
            FieldType::Checkbox => match value {
                "0" | "1" => Ok(()),
                other => Err(ValueError::InvalidCheckbox {
                    title: definition.title.clone(),
                    value: other.to_string(),
                }),
            },
            FieldType::Dropdown => {
                if definition.options().contains(&value) {
                    Ok(())
                } else {
                    Err(ValueError::NotInOptions {
                        title: definition.title.clone(),
                        value: value.to_string(),
                    })
                }
            }
            FieldType::Map(_) => {
                if self.attribute_object_id.is_some() {
                    Ok(())
                } else {
                    Err(ValueError::MissingReference(definition.title.clone()))
                }
            }
        }
    }

    /// True when the chosen dropdown option demands a comment or evidence
    /// that has not been linked yet.
    pub fn preconditions_failed(
        &self,
        definition: &CustomAttributeDefinition,
        fulfilled: RequirementSet,
    ) -> bool {
        let Some(value) = self.attribute_value.as_deref() else {
            return false;
        };
        let requirements = definition.option_requirements(value);
        (requirements & REQUIREMENT_COMMENT != 0 && !fulfilled.comment)
            || (requirements & REQUIREMENT_EVIDENCE != 0 && !fulfilled.evidence)
    }

    /// Snapshot serialization used by revision logging.
    pub fn log_json(&self) -> Value {
        json!({
            "id": self.id,
            "attributable_type": self.attributable_type,
            "attributable_id": self.attributable_id,
            "custom_attribute_id": self.custom_attribute_id,
            "attribute_value": self.attribute_value,
            "attribute_object_id": self.attribute_object_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(attribute_type: &str, mandatory: bool) -> CustomAttributeDefinition {
        CustomAttributeDefinition {
            id: 7,
            definition_type: "control".to_string(),
            definition_id: None,
            title: "Field".to_string(),
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

    #[test]
    fn mandatory_empty_value_fails() {
        let value = CustomAttributeValue::new(7, None, None);
        let err = value.validate(&definition("Text", true)).unwrap_err();
        assert!(matches!(err, ValueError::MissingMandatory(_)));
    }

    #[test]
    fn optional_empty_value_is_fine() {
        let value = CustomAttributeValue::new(7, Some(String::new()), None);
        assert!(value.validate(&definition("Date", false)).is_ok());
    }

    #[test]
    fn date_must_match_storage_format() {
        let good = CustomAttributeValue::new(7, Some("2024-01-01".to_string()), None);
        assert!(good.validate(&definition("Date", false)).is_ok());

        let bad = CustomAttributeValue::new(7, Some("01/01/2024".to_string()), None);
        assert!(matches!(
            bad.validate(&definition("Date", false)),
            Err(ValueError::InvalidDate { .. })
        ));
    }

    #[test]
    fn dropdown_value_must_be_an_option() {
        let mut def = definition("Dropdown", false);
        def.multi_choice_options = Some("yes,no".to_string());

        let good = CustomAttributeValue::new(7, Some("yes".to_string()), None);
        assert!(good.validate(&def).is_ok());

        let bad = CustomAttributeValue::new(7, Some("maybe".to_string()), None);
        assert!(matches!(bad.validate(&def), Err(ValueError::NotInOptions { .. })));
    }

    #[test]
    fn map_value_requires_reference() {
        let def = definition("Map:Person", false);
        let unmapped = CustomAttributeValue::new(7, Some("Person".to_string()), None);
        assert!(matches!(unmapped.validate(&def), Err(ValueError::MissingReference(_))));

        let mapped = CustomAttributeValue::new(7, Some("Person".to_string()), Some(12));
        assert!(mapped.validate(&def).is_ok());
    }

    #[test]
    fn preconditions_follow_option_requirements() {
        let mut def = definition("Dropdown", false);
        def.multi_choice_options = Some("minor,major".to_string());
        def.multi_choice_mandatory = Some("0,3".to_string());

        let value = CustomAttributeValue::new(7, Some("major".to_string()), None);
        assert!(value.preconditions_failed(&def, RequirementSet::default()));
        assert!(value.preconditions_failed(&def, RequirementSet { comment: true, evidence: false }));
        assert!(!value.preconditions_failed(&def, RequirementSet { comment: true, evidence: true }));

        let benign = CustomAttributeValue::new(7, Some("minor".to_string()), None);
        assert!(!benign.preconditions_failed(&def, RequirementSet::default()));
    }
}
