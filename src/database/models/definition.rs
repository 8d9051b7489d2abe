use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

/// Closed set of field-type tags a definition may carry. The legacy string
/// tags are the wire and storage representation; anything else is rejected
/// when the tag is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Text,
    RichText,
    Date,
    Checkbox,
    Dropdown,
    /// Reference to another record type, e.g. "Map:Person".
    Map(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown custom attribute field type: {0}")]
pub struct UnknownFieldType(pub String);

impl FieldType {
    pub fn from_tag(tag: &str) -> Result<Self, UnknownFieldType> {
        match tag {
            "Text" => Ok(FieldType::Text),
            "Rich Text" => Ok(FieldType::RichText),
            "Date" => Ok(FieldType::Date),
            "Checkbox" => Ok(FieldType::Checkbox),
            "Dropdown" => Ok(FieldType::Dropdown),
            other => match other.strip_prefix("Map:") {
                Some(target) if !target.is_empty() => Ok(FieldType::Map(target.to_string())),
                _ => Err(UnknownFieldType(other.to_string())),
            },
        }
    }

    pub fn as_tag(&self) -> String {
        match self {
            FieldType::Text => "Text".to_string(),
            FieldType::RichText => "Rich Text".to_string(),
            FieldType::Date => "Date".to_string(),
            FieldType::Checkbox => "Checkbox".to_string(),
            FieldType::Dropdown => "Dropdown".to_string(),
            FieldType::Map(target) => format!("Map:{}", target),
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, FieldType::Map(_))
    }
}

/// One runtime-defined field for a record type. Rows with a null
/// `definition_id` are global definitions shared by every instance of the
/// type; rows with a concrete id belong to a single record instance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomAttributeDefinition {
    pub id: i64,
    pub definition_type: String,
    pub definition_id: Option<i64>,
    pub title: String,
    pub attribute_type: String,
    pub mandatory: bool,
    pub helptext: Option<String>,
    pub placeholder: Option<String>,
    pub multi_choice_options: Option<String>,
    pub multi_choice_mandatory: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomAttributeDefinition {
    pub fn field_type(&self) -> Result<FieldType, UnknownFieldType> {
        FieldType::from_tag(&self.attribute_type)
    }

    pub fn is_global(&self) -> bool {
        self.definition_id.is_none()
    }

    /// Dropdown options as a list, empty for non-dropdown definitions.
    pub fn options(&self) -> Vec<&str> {
        self.multi_choice_options
            .as_deref()
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Requirement bitmask for a chosen dropdown option, aligned positionally
    /// with `multi_choice_options`. 1 = comment required, 2 = evidence
    /// required. Zero when the option carries no requirements.
    pub fn option_requirements(&self, chosen: &str) -> u8 {
        let Some(position) = self.options().iter().position(|opt| *opt == chosen) else {
            return 0;
        };
        self.multi_choice_mandatory
            .as_deref()
            .and_then(|raw| raw.split(',').nth(position))
            .and_then(|flag| flag.trim().parse::<u8>().ok())
            .unwrap_or(0)
    }

    /// Snapshot serialization used by revision logging. Field names are
    /// frozen as they are at log time.
    pub fn log_json(&self) -> Value {
        json!({
            "id": self.id,
            "definition_type": self.definition_type,
            "definition_id": self.definition_id,
            "title": self.title,
            "attribute_type": self.attribute_type,
            "mandatory": self.mandatory,
            "helptext": self.helptext,
            "placeholder": self.placeholder,
            "multi_choice_options": self.multi_choice_options,
            "multi_choice_mandatory": self.multi_choice_mandatory,
        })
    }
}

/// Client payload for creating a definition. Only these fields are creatable;
/// `definition_type` is always stamped server-side from the owning record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionPayload {
    pub title: String,
    pub attribute_type: String,
    #[serde(default)]
    pub mandatory: bool,
    pub helptext: Option<String>,
    pub placeholder: Option<String>,
    pub multi_choice_options: Option<String>,
    pub multi_choice_mandatory: Option<String>,
    pub definition_id: Option<i64>,
    #[serde(rename = "_pending_delete", default)]
    pub pending_delete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dropdown(options: &str, mandatory: Option<&str>) -> CustomAttributeDefinition {
        CustomAttributeDefinition {
            id: 1,
            definition_type: "control".to_string(),
            definition_id: None,
            title: "Severity".to_string(),
            attribute_type: "Dropdown".to_string(),
            mandatory: false,
            helptext: None,
            placeholder: None,
            multi_choice_options: Some(options.to_string()),
            multi_choice_mandatory: mandatory.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn field_type_tags_round_trip() {
        for tag in ["Text", "Rich Text", "Date", "Checkbox", "Dropdown", "Map:Person"] {
            assert_eq!(FieldType::from_tag(tag).unwrap().as_tag(), tag);
        }
    }

    #[test]
    fn unknown_tags_rejected() {
        assert!(FieldType::from_tag("Timeline").is_err());
        assert!(FieldType::from_tag("Map:").is_err());
    }

    #[test]
    fn option_requirements_align_with_options() {
        let def = dropdown("low, medium, high", Some("0,1,3"));
        assert_eq!(def.option_requirements("low"), 0);
        assert_eq!(def.option_requirements("medium"), 1);
        assert_eq!(def.option_requirements("high"), 3);
        assert_eq!(def.option_requirements("unknown"), 0);
    }

    #[test]
    fn options_empty_without_choices() {
        let mut def = dropdown("", None);
        def.multi_choice_options = None;
        assert!(def.options().is_empty());
        assert_eq!(def.option_requirements("anything"), 0);
    }
}
