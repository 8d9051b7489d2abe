use thiserror::Error;

use crate::database::manager::DatabaseError;
use crate::database::models::value::ValueError;

/// Errors from the custom attribute subsystem.
#[derive(Debug, Error)]
pub enum AttributeError {
    /// A wire mapping carried neither a definition id nor a stub reference.
    #[error("Bad custom attribute value inserted")]
    BadValueInput,

    /// A single batch mixed typed rows and wire mappings.
    #[error("Custom attribute batch mixes typed values and wire mappings")]
    MixedValueInput,

    #[error("Invalid date value for custom attribute {custom_attribute_id}: {value}")]
    InvalidDate { custom_attribute_id: i64, value: String },

    /// A legacy Map: import value was not splittable into "Type:id".
    #[error("Malformed mapped attribute value: {0}")]
    MalformedMapValue(String),

    #[error("Invalid custom attribute definition id: {0}")]
    InvalidDefinitionId(String),

    #[error("Custom attribute definition not found: {0}")]
    DefinitionNotFound(i64),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
