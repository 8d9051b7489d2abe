//! Field lists consumed by the enclosing serialization layer. These mirror
//! the reflection data every attributable record type contributes to the
//! JSON builder: which attribute fields are readable, writable, rendered as
//! links, or accepted as raw data.

/// Fields published on every attributable record.
pub const PUBLISH_ATTRS: &[&str] = &[
    "custom_attribute_values",
    "custom_attribute_definitions",
    "preconditions_failed",
];

/// Fields writable on every attributable record.
pub const UPDATE_ATTRS: &[&str] = &["custom_attribute_values", "custom_attributes"];

/// Published fields rendered as links rather than inlined.
pub const INCLUDE_LINKS: &[&str] = &["custom_attribute_values", "custom_attribute_definitions"];

/// Writable fields whose raw JSON is passed through to the setter untouched.
pub const UPDATE_RAW: &[&str] = &["custom_attribute_values"];

/// Fields a client may supply when creating a definition; everything else on
/// the row (`id`, `definition_type`, timestamps) is stamped server-side.
pub const DEFINITION_CREATE_ATTRS: &[&str] = &[
    "title",
    "attribute_type",
    "mandatory",
    "helptext",
    "placeholder",
    "multi_choice_options",
    "multi_choice_mandatory",
    "definition_id",
];
