//! Wire shapes for custom attribute values. The front-end posts either full
//! value mappings or bare stub references; the back-end hands over typed
//! value rows. Both converge on one setter after normalization to
//! `ValueInput`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::models::value::CustomAttributeValue;

/// Stub reference to another record, `{"id": 5, "type": "Person"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStub {
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub object_type: Option<String>,
}

/// JSON mapping for one custom attribute value as posted by clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireValue {
    pub custom_attribute_id: Option<i64>,
    /// None only when the key is absent; an explicit JSON null is kept as
    /// `Some(Value::Null)`. Key presence decides whether the legacy import
    /// path is bypassed.
    #[serde(default, deserialize_with = "present_value")]
    pub attribute_value: Option<Value>,
    pub attribute_object_id: Option<i64>,
    pub attribute_object: Option<ObjectStub>,
    /// Present on stub references only; a payload carrying just `href` is a
    /// known client-shape mismatch and is dropped, not rejected.
    pub href: Option<String>,
}

impl WireValue {
    /// Reference id, deriving from the nested object stub when the flat id
    /// is absent. `attribute_object` may be explicitly null.
    pub fn object_id(&self) -> Option<i64> {
        self.attribute_object_id
            .or_else(|| self.attribute_object.as_ref().and_then(|stub| stub.id))
    }

    /// Attribute value normalized to its stored string form.
    pub fn value_string(&self) -> Option<String> {
        self.attribute_value.as_ref().and_then(value_to_string)
    }

    pub fn is_stub(&self) -> bool {
        self.custom_attribute_id.is_none() && self.href.is_some()
    }
}

/// Deserializer that keeps an explicit null as `Some(Value::Null)`; only a
/// missing key becomes None (via the field default).
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Normalize a JSON scalar to the stored string form of an attribute value.
/// Booleans become checkbox flags; null becomes no value.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        other => Some(other.to_string()),
    }
}

/// Input accepted by the bulk value setter: typed rows from back-end code,
/// or wire mappings from the JSON layer. A single batch must be homogeneous.
#[derive(Debug, Clone)]
pub enum ValueInput {
    Typed(CustomAttributeValue),
    Wire(WireValue),
}

impl ValueInput {
    pub fn is_wire(&self) -> bool {
        matches!(self, ValueInput::Wire(_))
    }
}

impl From<CustomAttributeValue> for ValueInput {
    fn from(value: CustomAttributeValue) -> Self {
        ValueInput::Typed(value)
    }
}

impl From<WireValue> for ValueInput {
    fn from(value: WireValue) -> Self {
        ValueInput::Wire(value)
    }
}
