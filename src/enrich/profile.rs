//! Lenient extraction of the profile tuple from an enrichment response.

use crate::error::Result;
use crate::models::ProfileData;
use serde_json::Value;

/// Parses the response body as a generic JSON object and pulls the profile
/// fields out of `persons[0]`. A missing or empty `persons` array yields an
/// empty profile without error; only malformed JSON is an `Err`.
pub fn parse_profile(body: &str) -> Result<ProfileData> {
    let data: Value = serde_json::from_str(body)?;
    let mut profile = ProfileData::default();

    let Some(person) = data
        .get("persons")
        .and_then(Value::as_array)
        .and_then(|persons| persons.first())
        .and_then(Value::as_object)
    else {
        return Ok(profile);
    };

    if let Some(value) = person.get("displayName").and_then(Value::as_str) {
        profile.display_name = value.to_string();
    }
    if let Some(value) = person.get("linkedInUrl").and_then(Value::as_str) {
        profile.linkedin_url = value.to_string();
    }
    if let Some(value) = person.get("location").and_then(Value::as_str) {
        profile.location = value.to_string();
    }
    // connectionCount arrives as a string or a number depending on the
    // response shape; numbers are stringified.
    match person.get("connectionCount") {
        Some(Value::String(value)) => profile.connection_count = value.clone(),
        Some(Value::Number(value)) => {
            profile.connection_count = match value.as_i64() {
                Some(n) => n.to_string(),
                None => value.to_string(),
            };
        }
        _ => {}
    }

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_fields_from_persons_zero() {
        let body = r#"{
            "persons": [{
                "displayName": "A",
                "linkedInUrl": "B",
                "location": "C",
                "connectionCount": "500+"
            }]
        }"#;
        let profile = parse_profile(body).unwrap();
        assert_eq!(profile.display_name, "A");
        assert_eq!(profile.linkedin_url, "B");
        assert_eq!(profile.location, "C");
        assert_eq!(profile.connection_count, "500+");
        assert!(profile.has_identity());
    }

    #[test]
    fn numeric_connection_count_is_stringified() {
        let body = r#"{"persons": [{"displayName": "A", "connectionCount": 42}]}"#;
        let profile = parse_profile(body).unwrap();
        assert_eq!(profile.connection_count, "42");
    }

    #[test]
    fn missing_fields_stay_empty() {
        let body = r#"{"persons": [{"displayName": "A"}]}"#;
        let profile = parse_profile(body).unwrap();
        assert_eq!(profile.display_name, "A");
        assert_eq!(profile.linkedin_url, "");
        assert_eq!(profile.location, "");
        assert_eq!(profile.connection_count, "");
    }

    #[test]
    fn empty_or_missing_persons_is_not_an_error() {
        assert_eq!(parse_profile("{}").unwrap(), ProfileData::default());
        assert_eq!(
            parse_profile(r#"{"persons": []}"#).unwrap(),
            ProfileData::default()
        );
        assert_eq!(
            parse_profile(r#"{"persons": "not-an-array"}"#).unwrap(),
            ProfileData::default()
        );
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_profile("not json").is_err());
        assert!(parse_profile("").is_err());
    }

    #[test]
    fn only_the_first_person_counts() {
        let body = r#"{"persons": [{"displayName": "First"}, {"displayName": "Second"}]}"#;
        assert_eq!(parse_profile(body).unwrap().display_name, "First");
    }
}
