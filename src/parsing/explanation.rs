//*** START FILE: src/parsing/explanation.rs ***//
//! Explanation payload parsing.
//!
//! The store hands explanations back either as a JSON object or as a string.
//! Exactly one shape is understood: an object whose `explanation` field is a
//! string, optionally encoded inside a string. Every other payload is kept
//! verbatim as plain text.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Explanation {
    /// `{"explanation": "...", ...}`; remaining string fields are kept as notes.
    Structured {
        text: String,
        notes: Vec<(String, String)>,
    },
    Plain(String),
}

impl Explanation {
    pub fn text(&self) -> &str {
        match self {
            Explanation::Structured { text, .. } => text,
            Explanation::Plain(text) => text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty()
    }
}

impl Default for Explanation {
    fn default() -> Self {
        Explanation::Plain(String::new())
    }
}

pub fn parse_explanation(raw: &str) -> Explanation {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            if let Some(structured) = structured_from_map(&map) {
                return structured;
            }
        }
    }
    Explanation::Plain(raw.to_string())
}

pub fn explanation_from_value(value: &Value) -> Explanation {
    match value {
        Value::Null => Explanation::default(),
        Value::String(raw) => parse_explanation(raw),
        Value::Object(map) => {
            structured_from_map(map).unwrap_or_else(|| Explanation::Plain(value.to_string()))
        }
        other => Explanation::Plain(other.to_string()),
    }
}

fn structured_from_map(map: &Map<String, Value>) -> Option<Explanation> {
    let text = map.get("explanation")?.as_str()?.to_string();
    let notes = map
        .iter()
        .filter(|(key, _)| key.as_str() != "explanation")
        .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
        .collect();
    Some(Explanation::Structured { text, notes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_with_explanation_field_is_structured() {
        let parsed = parse_explanation(r#"{"explanation": "Past tense of ir.", "title": "fue"}"#);
        assert_eq!(
            parsed,
            Explanation::Structured {
                text: "Past tense of ir.".to_string(),
                notes: vec![("title".to_string(), "fue".to_string())],
            }
        );
    }

    #[test]
    fn loose_text_stays_plain() {
        let raw = "Used for habitual actions in the past.";
        assert_eq!(parse_explanation(raw), Explanation::Plain(raw.to_string()));
    }

    #[test]
    fn json_without_explanation_field_is_opaque() {
        let raw = r#"{"meaning": "to go"}"#;
        assert_eq!(parse_explanation(raw), Explanation::Plain(raw.to_string()));
    }

    #[test]
    fn broken_json_is_opaque() {
        let raw = r#"{"explanation": "unterminated"#;
        assert_eq!(parse_explanation(raw).text(), raw);
    }

    #[test]
    fn value_forms() {
        assert!(explanation_from_value(&Value::Null).is_empty());
        assert_eq!(
            explanation_from_value(&json!({"explanation": "x"})).text(),
            "x"
        );
        assert_eq!(
            explanation_from_value(&json!("{\"explanation\": \"y\"}")).text(),
            "y"
        );
        assert_eq!(explanation_from_value(&json!(12)), Explanation::Plain("12".to_string()));
        // A non-string explanation field is not the understood shape.
        let odd = json!({"explanation": ["a", "b"]});
        assert_eq!(explanation_from_value(&odd), Explanation::Plain(odd.to_string()));
    }
}
//*** END FILE: src/parsing/explanation.rs ***//
