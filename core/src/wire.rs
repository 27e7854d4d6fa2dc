//! Serde helpers for provider payloads.

use serde::{Deserialize, Deserializer};

/// Accept an identifier sent either as a JSON string or as a number.
///
/// Payment providers are inconsistent about this: the same ID arrives as
/// `"123"` in one payload and `123` in another.
///
/// # Errors
///
/// Anything other than a string or an unsigned integer.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(deserialize_with = "string_or_number")]
        id: String,
    }

    #[test]
    fn test_accepts_strings_and_numbers() {
        let text: Holder = serde_json::from_str(r#"{"id":"pay-1"}"#).unwrap();
        let number: Holder = serde_json::from_str(r#"{"id":98765}"#).unwrap();
        assert_eq!(text.id, "pay-1");
        assert_eq!(number.id, "98765");
    }

    #[test]
    fn test_rejects_other_shapes() {
        assert!(serde_json::from_str::<Holder>(r#"{"id":true}"#).is_err());
        assert!(serde_json::from_str::<Holder>(r#"{"id":-4}"#).is_err());
    }
}
