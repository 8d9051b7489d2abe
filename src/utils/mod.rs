use chrono::NaiveDate;

/// Convert a CamelCase model type name to its snake_case definition type,
/// e.g. "AssessmentTemplate" -> "assessment_template".
pub fn underscore_from_camelcase(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Date format used by the JSON wire representation.
pub const DATE_FORMAT_WIRE: &str = "%m/%d/%Y";
/// Date format used for database storage.
pub const DATE_FORMAT_DB: &str = "%Y-%m-%d";

/// Convert a date string between two formats.
///
/// Lenient on input: a value already in the target format is passed through
/// unchanged, so repeated conversion of the same payload is idempotent.
/// Returns None when the value parses in neither format.
pub fn convert_date_format(value: &str, from: &str, to: &str) -> Option<String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, from) {
        return Some(date.format(to).to_string());
    }
    // Already in the target format
    NaiveDate::parse_from_str(value, to).map(|_| value.to_string()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camelcase_to_snake() {
        assert_eq!(underscore_from_camelcase("Assessment"), "assessment");
        assert_eq!(underscore_from_camelcase("AssessmentTemplate"), "assessment_template");
        assert_eq!(underscore_from_camelcase("Policy"), "policy");
    }

    #[test]
    fn wire_date_to_db() {
        assert_eq!(
            convert_date_format("01/31/2024", DATE_FORMAT_WIRE, DATE_FORMAT_DB),
            Some("2024-01-31".to_string())
        );
    }

    #[test]
    fn iso_date_passes_through() {
        // Clients already sending storage format keep it untouched
        assert_eq!(
            convert_date_format("2024-01-01", DATE_FORMAT_WIRE, DATE_FORMAT_DB),
            Some("2024-01-01".to_string())
        );
    }

    #[test]
    fn garbage_date_is_none() {
        assert_eq!(convert_date_format("soon", DATE_FORMAT_WIRE, DATE_FORMAT_DB), None);
    }
}
